//! Configuration keys read or written by the toolkit.
//!
//! Only the keys the toolkit itself touches live here; the wider catalogue
//! belongs to the storage client.

/// Prefix of every filesystem option
pub const FS_S3A_PREFIX: &str = "fs.s3a.";

/// Prefix of per-bucket options: `fs.s3a.bucket.<bucket>.<option>`
pub const FS_S3A_BUCKET_PREFIX: &str = "fs.s3a.bucket.";

/// URI scheme of the filesystem under test
pub const FS_S3A_SCHEME: &str = "s3a";

/// Name (URI) of the filesystem to run live tests against
pub const TEST_FS_S3A_NAME: &str = "test.fs.s3a.name";

/// Per-fork identifier set by parallel test runners
pub const TEST_UNIQUE_FORK_ID: &str = "test.unique.fork.id";

/// Whether encryption tests run
pub const KEY_ENCRYPTION_TESTS: &str = "test.fs.s3a.encryption.enabled";

/// Enable the metadata-store backend for tests
pub const TEST_S3GUARD_ENABLED: &str = "fs.s3a.s3guard.test.enabled";

/// Treat the metadata store as authoritative in tests
pub const TEST_S3GUARD_AUTHORITATIVE: &str = "fs.s3a.s3guard.test.authoritative";

/// Backend mode name for tests
pub const TEST_S3GUARD_IMPLEMENTATION: &str = "fs.s3a.s3guard.test.implementation";

pub const METADATASTORE_AUTHORITATIVE: &str = "fs.s3a.metadatastore.authoritative";
pub const DEFAULT_METADATASTORE_AUTHORITATIVE: bool = false;

pub const S3_METADATA_STORE_IMPL: &str = "fs.s3a.metadatastore.impl";

pub const S3GUARD_DDB_TABLE_CREATE_KEY: &str = "fs.s3a.s3guard.ddb.table.create";

pub const S3GUARD_DDB_CLIENT_FACTORY_IMPL: &str = "fs.s3a.s3guard.ddb.client.factory.impl";

pub const PURGE_EXISTING_MULTIPART: &str = "fs.s3a.multipart.purge";

/// Age in seconds beyond which pending multipart uploads are purged
pub const PURGE_EXISTING_MULTIPART_AGE: &str = "fs.s3a.multipart.purge.age";

pub const DISABLE_FS_CACHE: &str = "fs.s3a.impl.disable.cache";
