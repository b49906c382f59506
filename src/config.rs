//! Layered test-property resolution
//!
//! A test property is resolved from three layers:
//!
//! 1. the [`OverrideSource`], injected per test run;
//! 2. the [`StructuredConfig`] (if any), trimmed on read;
//! 3. the hard default supplied by the caller.
//!
//! An override only wins when it is non-empty and not the reserved
//! [`UNSET_PROPERTY`] sentinel. This lets a build pass every property
//! through unconditionally and still fall back to the configuration files.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde_yaml::Value;
use tracing::{debug, warn};

use crate::backend;
use crate::env;
use crate::error::{Result, TestKitError};
use crate::keys::{
    DISABLE_FS_CACHE, FS_S3A_BUCKET_PREFIX, FS_S3A_PREFIX, FS_S3A_SCHEME,
    KEY_ENCRYPTION_TESTS, PURGE_EXISTING_MULTIPART, PURGE_EXISTING_MULTIPART_AGE,
    TEST_FS_S3A_NAME, TEST_UNIQUE_FORK_ID,
};

/// Override value declaring that a property has been unset
pub const UNSET_PROPERTY: &str = "unset";

/// Multipart purge age applied by [`prepare_test_config`], in seconds
pub const TEST_PURGE_AGE_SECS: i64 = 30 * 60;

// =============================================================================
// Override source
// =============================================================================

/// Forcible per-run property values, consulted ahead of structured config
#[derive(Debug, Clone, Default)]
pub struct OverrideSource {
    values: HashMap<String, String>,
}

impl OverrideSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Snapshot environment-style variables, e.g. `std::env::vars()`.
    ///
    /// Only variables whose names start with `prefix` are kept; the prefix is
    /// stripped and `_` maps to `.` so `S3A_TEST_FS_S3A_NAME` with prefix
    /// `S3A_` becomes `test.fs.s3a.name`.
    pub fn from_env_vars<I>(vars: I, prefix: &str) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let values = vars
            .into_iter()
            .filter_map(|(name, value)| {
                let rest = name.strip_prefix(prefix)?;
                Some((rest.to_ascii_lowercase().replace('_', "."), value))
            })
            .collect();
        Self { values }
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Raw value, including empty and sentinel values
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Value if it is allowed to override: non-empty and not [`UNSET_PROPERTY`]
    pub fn effective(&self, key: &str) -> Option<&str> {
        self.get(key)
            .filter(|v| !v.is_empty() && *v != UNSET_PROPERTY)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// =============================================================================
// Structured configuration
// =============================================================================

/// Key/value configuration, as loaded from configuration files
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StructuredConfig {
    entries: BTreeMap<String, String>,
}

impl StructuredConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a YAML file
    pub fn from_file(path: &Path, overrides: &OverrideSource) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            TestKitError::Configuration(format!("Failed to read {:?}: {}", path, e))
        })?;
        Self::from_yaml_str(&content, overrides)
    }

    /// Parse configuration from YAML text.
    ///
    /// `${KEY}` placeholders are expanded from `overrides` first. Nested
    /// mappings flatten into dotted keys; scalars are kept as strings.
    pub fn from_yaml_str(content: &str, overrides: &OverrideSource) -> Result<Self> {
        let expanded = env::substitute(content, |k| overrides.effective(k).map(str::to_string))?;
        let root: Value = serde_yaml::from_str(&expanded)?;

        let mut conf = Self::new();
        match root {
            Value::Null => {}
            Value::Mapping(_) => flatten_into(&mut conf.entries, String::new(), root)?,
            other => {
                return Err(TestKitError::Configuration(format!(
                    "Top level of configuration must be a mapping, got {:?}",
                    other
                )))
            }
        }
        Ok(conf)
    }

    /// Value with surrounding whitespace removed
    pub fn get_trimmed(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(|v| v.trim())
    }

    /// Raw value as stored
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Boolean flag read directly from this layer; unparseable values yield `default`
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get_trimmed(key) {
            Some(v) if v.eq_ignore_ascii_case("true") => true,
            Some(v) if v.eq_ignore_ascii_case("false") => false,
            _ => default,
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn set_bool(&mut self, key: impl Into<String>, value: bool) {
        self.set(key, value.to_string());
    }

    pub fn set_int(&mut self, key: impl Into<String>, value: i64) {
        self.set(key, value.to_string());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

fn flatten_into(out: &mut BTreeMap<String, String>, prefix: String, value: Value) -> Result<()> {
    match value {
        Value::Mapping(map) => {
            for (k, v) in map {
                let segment = scalar_to_string(&k).ok_or_else(|| {
                    TestKitError::Configuration(format!("Unsupported key under {:?}", prefix))
                })?;
                let key = if prefix.is_empty() {
                    segment
                } else {
                    format!("{}.{}", prefix, segment)
                };
                flatten_into(out, key, v)?;
            }
        }
        Value::Sequence(items) => {
            let joined = items
                .iter()
                .map(|v| {
                    scalar_to_string(v).ok_or_else(|| {
                        TestKitError::Configuration(format!("Nested list value under {}", prefix))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            out.insert(prefix, joined.join(","));
        }
        Value::Tagged(tagged) => flatten_into(out, prefix, tagged.value)?,
        scalar => {
            if let Some(s) = scalar_to_string(&scalar) {
                out.insert(prefix, s);
            }
        }
    }
    Ok(())
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Null => Some(String::new()),
        _ => None,
    }
}

// =============================================================================
// Resolution
// =============================================================================

/// Resolve a string test property.
///
/// The candidate is the structured config value (or `default` when the key
/// is absent or no config is given). A non-empty, non-sentinel override
/// replaces the candidate.
pub fn resolve(
    overrides: &OverrideSource,
    conf: Option<&StructuredConfig>,
    key: &str,
    default: &str,
) -> String {
    let candidate = conf
        .and_then(|c| c.get_trimmed(key))
        .unwrap_or(default);
    overrides.effective(key).unwrap_or(candidate).to_string()
}

/// Resolve an `i64` test property
pub fn resolve_long(
    overrides: &OverrideSource,
    conf: Option<&StructuredConfig>,
    key: &str,
    default: i64,
) -> Result<i64> {
    let raw = resolve(overrides, conf, key, &default.to_string());
    raw.parse::<i64>()
        .map_err(|_| parse_error(key, &raw, "integer"))
}

/// Resolve an `i32` test property
pub fn resolve_int(
    overrides: &OverrideSource,
    conf: Option<&StructuredConfig>,
    key: &str,
    default: i32,
) -> Result<i32> {
    let raw = resolve(overrides, conf, key, &default.to_string());
    raw.parse::<i32>()
        .map_err(|_| parse_error(key, &raw, "integer"))
}

/// Resolve a boolean test property; only `true` and `false` are accepted
pub fn resolve_bool(
    overrides: &OverrideSource,
    conf: Option<&StructuredConfig>,
    key: &str,
    default: bool,
) -> Result<bool> {
    let raw = resolve(overrides, conf, key, &default.to_string());
    match raw.as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(parse_error(key, &raw, "boolean")),
    }
}

/// Resolve a byte-size test property such as `64m` or `2G`
pub fn resolve_bytes(
    overrides: &OverrideSource,
    conf: Option<&StructuredConfig>,
    key: &str,
    default: &str,
) -> Result<i64> {
    let raw = resolve(overrides, conf, key, default);
    parse_bytes(&raw).ok_or_else(|| parse_error(key, &raw, "byte size"))
}

/// Parse `<integer>[k|m|g|t|p|e]`, suffixes case-insensitive powers of 1024
pub fn parse_bytes(s: &str) -> Option<i64> {
    let s = s.trim();
    let last = s.chars().last()?;
    let (num_part, power) = match last.to_ascii_lowercase() {
        'k' => (&s[..s.len() - 1], 1),
        'm' => (&s[..s.len() - 1], 2),
        'g' => (&s[..s.len() - 1], 3),
        't' => (&s[..s.len() - 1], 4),
        'p' => (&s[..s.len() - 1], 5),
        'e' => (&s[..s.len() - 1], 6),
        _ => (s, 0),
    };

    let n = num_part.parse::<i64>().ok()?;
    1024_i64.checked_pow(power).and_then(|m| n.checked_mul(m))
}

fn parse_error(key: &str, value: &str, target: &'static str) -> TestKitError {
    TestKitError::Parse {
        key: key.to_string(),
        value: value.to_string(),
        target,
    }
}

// =============================================================================
// Test environment helpers
// =============================================================================

/// Filesystem under test, as named by [`TEST_FS_S3A_NAME`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestEndpoint {
    pub uri: String,
    pub bucket: String,
}

/// Name of the filesystem under test; empty if unset
pub fn test_fs_name(conf: &StructuredConfig) -> &str {
    conf.get_trimmed(TEST_FS_S3A_NAME).unwrap_or("")
}

/// Require a live filesystem to test against.
///
/// Fails with [`TestKitError::Assumption`] when [`TEST_FS_S3A_NAME`] is
/// missing or does not use the `s3a` scheme, so callers skip rather than fail.
/// A missing endpoint is deliberately not a [`TestKitError::Configuration`]
/// error: suites without live credentials skip these tests.
pub fn require_test_endpoint(conf: &StructuredConfig) -> Result<TestEndpoint> {
    let name = test_fs_name(conf);
    let live = name
        .split_once("://")
        .filter(|(scheme, _)| *scheme == FS_S3A_SCHEME)
        .map(|(_, rest)| rest.split('/').next().unwrap_or(""))
        .filter(|bucket| !bucket.is_empty());

    match live {
        Some(bucket) => Ok(TestEndpoint {
            uri: name.to_string(),
            bucket: bucket.to_string(),
        }),
        None => Err(TestKitError::Assumption(format!(
            "No test filesystem in {}",
            TEST_FS_S3A_NAME
        ))),
    }
}

/// Patch `conf` for a live test run.
///
/// Enables the metadata-store backend from test properties and, when
/// `purge` is set, enables purging of stale multipart uploads with a long
/// age so parallel multipart tests do not time each other out.
pub fn prepare_test_config(
    conf: &mut StructuredConfig,
    overrides: &OverrideSource,
    purge: bool,
) -> Result<TestEndpoint> {
    let endpoint = require_test_endpoint(conf)?;
    backend::maybe_enable_backend(conf, overrides)?;
    if purge {
        conf.set_bool(PURGE_EXISTING_MULTIPART, true);
        conf.set_int(PURGE_EXISTING_MULTIPART_AGE, TEST_PURGE_AGE_SECS);
    }
    debug!(uri = %endpoint.uri, purge, "prepared test configuration");
    Ok(endpoint)
}

/// Test directory, isolated per fork when [`TEST_UNIQUE_FORK_ID`] is set.
///
/// An empty fork id resolves to `/test` at the root.
pub fn create_test_path(overrides: &OverrideSource, default: &str) -> String {
    match overrides.get(TEST_UNIQUE_FORK_ID) {
        Some("") => "/test".to_string(),
        Some(fork) => format!("/{}/test", fork),
        None => default.to_string(),
    }
}

/// Set an option for one bucket only.
///
/// A leading `fs.s3a.` is stripped from `key` so the value propagates back
/// down to the generic option for that bucket.
pub fn set_bucket_option(conf: &mut StructuredConfig, bucket: &str, key: &str, value: &str) {
    let base = key.strip_prefix(FS_S3A_PREFIX).unwrap_or(key);
    conf.set(format!("{}{}.{}", FS_S3A_BUCKET_PREFIX, bucket, base), value);
}

/// Fail unless `key` is set to exactly `expected`
pub fn assert_option_equals(conf: &StructuredConfig, key: &str, expected: Option<&str>) -> Result<()> {
    let actual = conf.get(key);
    if actual == expected {
        return Ok(());
    }
    Err(TestKitError::Configuration(format!(
        "Value of {}: expected {:?}, got {:?}",
        key, expected, actual
    )))
}

/// Turn off filesystem instance caching
pub fn disable_filesystem_caching(conf: &mut StructuredConfig) {
    conf.set_bool(DISABLE_FS_CACHE, true);
}

/// Skip when encryption tests have been disabled
pub fn skip_if_encryption_tests_disabled(conf: &StructuredConfig) -> Result<()> {
    assume(
        "Skipping encryption tests",
        conf.get_bool(KEY_ENCRYPTION_TESTS, true),
    )
}

/// Turn a failed precondition into [`TestKitError::Assumption`], logging it
pub fn assume(message: &str, condition: bool) -> Result<()> {
    if condition {
        return Ok(());
    }
    warn!("{}", message);
    Err(TestKitError::Assumption(message.to_string()))
}
