//! s3a-testkit: integration-test toolkit for eventually-consistent object stores
//!
//! This library provides the primitives integration tests need when the
//! store under test only converges on its final state some time after an
//! operation returns.
//!
//! # Architecture
//!
//! - **Config**: layered test properties. An injected override source beats
//!   structured configuration, which beats hard defaults. Typed accessors for
//!   integers, booleans and byte sizes (`64m`, `2g`).
//! - **Poll**: retry a probe until it succeeds, fails fatally, or a deadline
//!   passes, surfacing the last failure on timeout.
//! - **Metrics**: snapshot an instrumentation counter and assert on how far
//!   it moved.
//! - **Status**: compare a filesystem entry against expected fields.
//! - **Backend**: resolve which metadata-store backend a run activates.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use s3a_testkit::config::{resolve_bytes, OverrideSource, StructuredConfig};
//! use s3a_testkit::metrics::{CounterRegistry, MetricDiff, Statistic};
//! use s3a_testkit::poll::{poll_until, ProbeError};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let overrides = OverrideSource::from_env_vars(std::env::vars(), "S3A_");
//! let conf = StructuredConfig::from_file("test-config.yaml".as_ref(), &overrides)?;
//! let size = resolve_bytes(&overrides, Some(&conf), "fs.s3a.scale.test.huge.filesize", "10m")?;
//!
//! let counters = Arc::new(CounterRegistry::new());
//! let puts = MetricDiff::new(counters.clone(), Statistic::new("object_put_requests", ""));
//! // ... upload `size` bytes ...
//! poll_until(Duration::from_secs(10), || {
//!     puts.assert_diff_equals(1).map_err(ProbeError::Retryable)
//! })?;
//! # let _ = size;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod env;
pub mod error;
pub mod keys;
pub mod logging;
pub mod metrics;
pub mod poll;
pub mod status;

pub use error::{ErrorKind, Result, TestKitError};
