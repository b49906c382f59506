//! Metadata-store backend selection for test runs
//!
//! A run enables a backend through test properties: an enabling flag, a
//! mode name and an authoritative flag. Each mode maps to exactly one store
//! implementation; `dynamo-local` additionally swaps in the client factory
//! for the local DynamoDB double.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use tracing::debug;

use crate::config::{self, resolve, resolve_bool, OverrideSource, StructuredConfig};
use crate::error::{Result, TestKitError};
use crate::keys::{
    DEFAULT_METADATASTORE_AUTHORITATIVE, FS_S3A_BUCKET_PREFIX, FS_S3A_PREFIX,
    METADATASTORE_AUTHORITATIVE, S3GUARD_DDB_CLIENT_FACTORY_IMPL, S3GUARD_DDB_TABLE_CREATE_KEY,
    S3_METADATA_STORE_IMPL, TEST_S3GUARD_AUTHORITATIVE, TEST_S3GUARD_ENABLED,
    TEST_S3GUARD_IMPLEMENTATION,
};

pub const NULL_METADATA_STORE: &str = "org.apache.hadoop.fs.s3a.s3guard.NullMetadataStore";
pub const LOCAL_METADATA_STORE: &str = "org.apache.hadoop.fs.s3a.s3guard.LocalMetadataStore";
pub const DYNAMO_METADATA_STORE: &str = "org.apache.hadoop.fs.s3a.s3guard.DynamoDBMetadataStore";

/// Client factory pointing the Dynamo store at a local double
pub const DYNAMO_LOCAL_CLIENT_FACTORY: &str =
    "org.apache.hadoop.fs.s3a.s3guard.DynamoDBLocalClientFactory";

/// Mode used when the run names none
pub const DEFAULT_BACKEND_MODE: &str = "local";

/// Backend mode named by a test run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendMode {
    /// In-process store, not coherent across processes
    Local,
    /// Dynamo store against a local emulator
    DynamoLocal,
    /// Dynamo store against the live service
    Dynamo,
    /// Null store
    #[serde(rename = "none")]
    Null,
}

impl BackendMode {
    pub const ALL: [BackendMode; 4] = [
        BackendMode::Local,
        BackendMode::DynamoLocal,
        BackendMode::Dynamo,
        BackendMode::Null,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BackendMode::Local => "local",
            BackendMode::DynamoLocal => "dynamo-local",
            BackendMode::Dynamo => "dynamo",
            BackendMode::Null => "none",
        }
    }
}

impl fmt::Display for BackendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackendMode {
    type Err = TestKitError;

    fn from_str(s: &str) -> Result<Self> {
        BackendMode::ALL
            .into_iter()
            .find(|mode| mode.name() == s)
            .ok_or_else(|| {
                let known: Vec<_> = BackendMode::ALL.iter().map(|m| m.name()).collect();
                TestKitError::Configuration(format!(
                    "Unknown metadata store backend: \"{}\" (expected one of {})",
                    s,
                    known.join(", ")
                ))
            })
    }
}

/// Store implementation activated for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataStoreImpl {
    Null,
    Local,
    Dynamo,
}

impl MetadataStoreImpl {
    pub fn class_name(self) -> &'static str {
        match self {
            MetadataStoreImpl::Null => NULL_METADATA_STORE,
            MetadataStoreImpl::Local => LOCAL_METADATA_STORE,
            MetadataStoreImpl::Dynamo => DYNAMO_METADATA_STORE,
        }
    }
}

/// Resolved backend configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    /// `None` when the backend is disabled for the run
    pub mode: Option<BackendMode>,
    pub store: MetadataStoreImpl,
    pub authoritative: bool,
    /// Client factory override; only set for [`BackendMode::DynamoLocal`]
    pub client_factory: Option<&'static str>,
}

impl BackendConfig {
    pub fn disabled() -> Self {
        Self {
            mode: None,
            store: MetadataStoreImpl::Null,
            authoritative: DEFAULT_METADATASTORE_AUTHORITATIVE,
            client_factory: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.mode.is_some()
    }

    /// Write the backend options into `conf`; a disabled backend writes nothing
    pub fn apply_to(&self, conf: &mut StructuredConfig) {
        if !self.is_enabled() {
            return;
        }
        conf.set_bool(METADATASTORE_AUTHORITATIVE, self.authoritative);
        conf.set(S3_METADATA_STORE_IMPL, self.store.class_name());
        conf.set_bool(S3GUARD_DDB_TABLE_CREATE_KEY, true);
        if let Some(factory) = self.client_factory {
            conf.set(S3GUARD_DDB_CLIENT_FACTORY_IMPL, factory);
        }
    }
}

/// Map the run's backend settings to a [`BackendConfig`].
///
/// When `enabled` is false the mode name is ignored entirely, even if it is
/// not a known mode. Otherwise an unknown name is a configuration error.
pub fn resolve_mode(enabled: bool, mode_name: &str, authoritative: bool) -> Result<BackendConfig> {
    if !enabled {
        return Ok(BackendConfig::disabled());
    }

    let mode: BackendMode = mode_name.parse()?;
    let (store, client_factory) = match mode {
        BackendMode::Local => (MetadataStoreImpl::Local, None),
        BackendMode::DynamoLocal => (MetadataStoreImpl::Dynamo, Some(DYNAMO_LOCAL_CLIENT_FACTORY)),
        BackendMode::Dynamo => (MetadataStoreImpl::Dynamo, None),
        BackendMode::Null => (MetadataStoreImpl::Null, None),
    };

    Ok(BackendConfig {
        mode: Some(mode),
        store,
        authoritative,
        client_factory,
    })
}

fn backend_enabled(conf: &StructuredConfig, overrides: &OverrideSource) -> Result<bool> {
    resolve_bool(
        overrides,
        None,
        TEST_S3GUARD_ENABLED,
        conf.get_bool(TEST_S3GUARD_ENABLED, false),
    )
}

/// Enable the backend named by the run's test properties, patching `conf`.
///
/// Each property defaults to the value already in `conf`. Nothing is
/// written when the backend is disabled or the mode name is unknown.
pub fn maybe_enable_backend(
    conf: &mut StructuredConfig,
    overrides: &OverrideSource,
) -> Result<BackendConfig> {
    if !backend_enabled(conf, overrides)? {
        return Ok(BackendConfig::disabled());
    }

    let authoritative = resolve_bool(
        overrides,
        None,
        TEST_S3GUARD_AUTHORITATIVE,
        conf.get_bool(TEST_S3GUARD_AUTHORITATIVE, true),
    )?;
    let mode_name = resolve(
        overrides,
        None,
        TEST_S3GUARD_IMPLEMENTATION,
        conf.get_trimmed(TEST_S3GUARD_IMPLEMENTATION)
            .unwrap_or(DEFAULT_BACKEND_MODE),
    );

    let backend = resolve_mode(true, &mode_name, authoritative)?;
    debug!(
        authoritative,
        implementation = backend.store.class_name(),
        "enabling metadata store backend"
    );
    backend.apply_to(conf);
    Ok(backend)
}

/// Skip unless the backend state of this run matches `should_be_enabled`.
///
/// Checks both the test property and the store actually configured for the
/// test bucket, after per-bucket options have been applied.
pub fn assume_backend_state(
    conf: &StructuredConfig,
    overrides: &OverrideSource,
    should_be_enabled: bool,
) -> Result<()> {
    let is_enabled = backend_enabled(conf, overrides)?;
    config::assume(
        &format!(
            "Unexpected metadata store test state: should_be_enabled={} and is_enabled={}",
            should_be_enabled, is_enabled
        ),
        should_be_enabled == is_enabled,
    )?;

    let endpoint = config::require_test_endpoint(conf)?;
    let view = bucket_view(conf, &endpoint.bucket);
    let using_null = view
        .get_trimmed(S3_METADATA_STORE_IMPL)
        .unwrap_or(NULL_METADATA_STORE)
        == NULL_METADATA_STORE;
    config::assume(
        &format!(
            "Unexpected metadata store test state: should_be_enabled={} but using_null_impl={}",
            should_be_enabled, using_null
        ),
        should_be_enabled != using_null,
    )
}

/// Copy of `conf` with `fs.s3a.bucket.<bucket>.*` options promoted to `fs.s3a.*`
pub fn bucket_view(conf: &StructuredConfig, bucket: &str) -> StructuredConfig {
    let prefix = format!("{}{}.", FS_S3A_BUCKET_PREFIX, bucket);
    let mut view = conf.clone();
    for (key, value) in conf.iter() {
        if let Some(option) = key.strip_prefix(&prefix) {
            view.set(format!("{}{}", FS_S3A_PREFIX, option), value);
        }
    }
    view
}

/// True if a metadata store is configured and allowed to be authoritative
pub fn is_metadata_store_authoritative(conf: Option<&StructuredConfig>) -> bool {
    conf.map(|c| c.get_bool(METADATASTORE_AUTHORITATIVE, DEFAULT_METADATASTORE_AUTHORITATIVE))
        .unwrap_or(DEFAULT_METADATASTORE_AUTHORITATIVE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::assert_option_equals;
    use crate::error::ErrorKind;
    use crate::keys::TEST_FS_S3A_NAME;

    #[test]
    fn test_disabled_ignores_mode_name() {
        for name in ["local", "dynamo", "bogus", ""] {
            let backend = resolve_mode(false, name, true).unwrap();
            assert_eq!(backend, BackendConfig::disabled());
            assert!(!backend.is_enabled());
        }
    }

    #[test]
    fn test_unknown_mode_is_configuration_error() {
        let err = resolve_mode(true, "bogus", false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("\"bogus\""));
    }

    #[test]
    fn test_each_mode_maps_independently() {
        let local = resolve_mode(true, "local", true).unwrap();
        assert_eq!(local.store, MetadataStoreImpl::Local);
        assert_eq!(local.client_factory, None);
        assert!(local.authoritative);

        let emulated = resolve_mode(true, "dynamo-local", false).unwrap();
        assert_eq!(emulated.mode, Some(BackendMode::DynamoLocal));
        assert_eq!(emulated.store, MetadataStoreImpl::Dynamo);
        assert_eq!(emulated.client_factory, Some(DYNAMO_LOCAL_CLIENT_FACTORY));
        assert!(!emulated.authoritative);

        let live = resolve_mode(true, "dynamo", false).unwrap();
        assert_eq!(live.store, MetadataStoreImpl::Dynamo);
        assert_eq!(live.client_factory, None);

        let null = resolve_mode(true, "none", false).unwrap();
        assert_eq!(null.mode, Some(BackendMode::Null));
        assert_eq!(null.store.class_name(), NULL_METADATA_STORE);
    }

    #[test]
    fn test_mode_names_round_trip() {
        for mode in BackendMode::ALL {
            assert_eq!(mode.name().parse::<BackendMode>().unwrap(), mode);
        }
        let from_yaml: BackendMode = serde_yaml::from_str("dynamo-local").unwrap();
        assert_eq!(from_yaml, BackendMode::DynamoLocal);
    }

    #[test]
    fn test_maybe_enable_disabled_writes_nothing() {
        let mut conf = StructuredConfig::new();
        let backend = maybe_enable_backend(&mut conf, &OverrideSource::new()).unwrap();
        assert!(!backend.is_enabled());
        assert_eq!(conf, StructuredConfig::new());
    }

    #[test]
    fn test_maybe_enable_from_overrides() {
        let mut conf = StructuredConfig::new();
        let overrides = OverrideSource::new()
            .with(TEST_S3GUARD_ENABLED, "true")
            .with(TEST_S3GUARD_IMPLEMENTATION, "dynamo-local")
            .with(TEST_S3GUARD_AUTHORITATIVE, "false");
        let backend = maybe_enable_backend(&mut conf, &overrides).unwrap();

        assert_eq!(backend.mode, Some(BackendMode::DynamoLocal));
        assert_option_equals(&conf, S3_METADATA_STORE_IMPL, Some(DYNAMO_METADATA_STORE)).unwrap();
        assert_option_equals(&conf, METADATASTORE_AUTHORITATIVE, Some("false")).unwrap();
        assert_option_equals(&conf, S3GUARD_DDB_TABLE_CREATE_KEY, Some("true")).unwrap();
        assert_option_equals(
            &conf,
            S3GUARD_DDB_CLIENT_FACTORY_IMPL,
            Some(DYNAMO_LOCAL_CLIENT_FACTORY),
        )
        .unwrap();
        assert!(!is_metadata_store_authoritative(Some(&conf)));
    }

    #[test]
    fn test_maybe_enable_defaults_from_config() {
        let mut conf = StructuredConfig::new();
        conf.set_bool(TEST_S3GUARD_ENABLED, true);
        let backend = maybe_enable_backend(&mut conf, &OverrideSource::new()).unwrap();

        assert_eq!(backend.mode, Some(BackendMode::Local));
        assert!(backend.authoritative);
        assert_option_equals(&conf, S3_METADATA_STORE_IMPL, Some(LOCAL_METADATA_STORE)).unwrap();
        assert_option_equals(&conf, S3GUARD_DDB_CLIENT_FACTORY_IMPL, None).unwrap();
        assert!(is_metadata_store_authoritative(Some(&conf)));
    }

    #[test]
    fn test_unset_override_keeps_config_value() {
        let mut conf = StructuredConfig::new();
        conf.set_bool(TEST_S3GUARD_ENABLED, true);
        conf.set(TEST_S3GUARD_IMPLEMENTATION, "dynamo");
        let overrides = OverrideSource::new().with(TEST_S3GUARD_IMPLEMENTATION, "unset");
        let backend = maybe_enable_backend(&mut conf, &overrides).unwrap();
        assert_eq!(backend.mode, Some(BackendMode::Dynamo));
    }

    #[test]
    fn test_override_disables_backend() {
        let mut conf = StructuredConfig::new();
        conf.set_bool(TEST_S3GUARD_ENABLED, true);
        let overrides = OverrideSource::new().with(TEST_S3GUARD_ENABLED, "false");
        let backend = maybe_enable_backend(&mut conf, &overrides).unwrap();
        assert!(!backend.is_enabled());
        assert!(!conf.contains(S3_METADATA_STORE_IMPL));
    }

    #[test]
    fn test_maybe_enable_unknown_mode_aborts() {
        let mut conf = StructuredConfig::new();
        let overrides = OverrideSource::new()
            .with(TEST_S3GUARD_ENABLED, "true")
            .with(TEST_S3GUARD_IMPLEMENTATION, "cassandra");
        let err = maybe_enable_backend(&mut conf, &overrides).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(!conf.contains(S3_METADATA_STORE_IMPL));
        assert!(!conf.contains(METADATASTORE_AUTHORITATIVE));
    }

    #[test]
    fn test_assume_backend_state() {
        let mut conf = StructuredConfig::new();
        conf.set(TEST_FS_S3A_NAME, "s3a://landsat");
        let overrides = OverrideSource::new();

        assert!(assume_backend_state(&conf, &overrides, false).is_ok());
        assert!(assume_backend_state(&conf, &overrides, true)
            .unwrap_err()
            .is_assumption());

        let enabled = OverrideSource::new().with(TEST_S3GUARD_ENABLED, "true");
        maybe_enable_backend(&mut conf, &enabled).unwrap();
        assert!(assume_backend_state(&conf, &enabled, true).is_ok());
    }

    #[test]
    fn test_bucket_option_selects_null_store() {
        let mut conf = StructuredConfig::new();
        conf.set(TEST_FS_S3A_NAME, "s3a://landsat");
        let enabled = OverrideSource::new().with(TEST_S3GUARD_ENABLED, "true");
        maybe_enable_backend(&mut conf, &enabled).unwrap();
        config::set_bucket_option(&mut conf, "landsat", S3_METADATA_STORE_IMPL, NULL_METADATA_STORE);

        let view = bucket_view(&conf, "landsat");
        assert_eq!(view.get(S3_METADATA_STORE_IMPL), Some(NULL_METADATA_STORE));
        assert!(assume_backend_state(&conf, &enabled, true)
            .unwrap_err()
            .is_assumption());
    }

    #[test]
    fn test_authoritative_default() {
        assert!(!is_metadata_store_authoritative(None));
        assert!(!is_metadata_store_authoritative(Some(&StructuredConfig::new())));
    }
}
