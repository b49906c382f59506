//! Common test utilities and fixtures
//!
//! [`LaggingStore`] stands in for the store under test: writes are counted
//! immediately but only become visible to status lookups after a delay.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use s3a_testkit::metrics::{CounterRegistry, Statistic};
use s3a_testkit::status::EntryDescriptor;

pub const OBJECT_PUT_REQUESTS: Statistic =
    Statistic::new("object_put_requests", "Object put/multipart upload count");
pub const OBJECT_PUT_BYTES: Statistic =
    Statistic::new("object_put_bytes", "Bytes uploaded in put requests");
pub const OBJECT_METADATA_REQUESTS: Statistic =
    Statistic::new("object_metadata_requests", "Number of requests for object metadata");
pub const IGNORED_ERRORS: Statistic =
    Statistic::new("ignored_errors", "Errors caught and ignored");

pub const BLOCK_SIZE: u64 = 32 << 20;

/// Store whose listings converge `lag` after each write
pub struct LaggingStore {
    counters: Arc<CounterRegistry>,
    lag: Duration,
    entries: Mutex<HashMap<String, (EntryDescriptor, Instant)>>,
}

impl LaggingStore {
    pub fn new(lag: Duration) -> Self {
        Self {
            counters: Arc::new(CounterRegistry::new()),
            lag,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn counters(&self) -> Arc<CounterRegistry> {
        self.counters.clone()
    }

    pub fn put(&self, path: &str, len: u64, modification_time: i64) {
        self.counters.increment(&OBJECT_PUT_REQUESTS);
        self.counters.add(&OBJECT_PUT_BYTES, len as i64);
        let entry = EntryDescriptor::file(path, len, BLOCK_SIZE, modification_time)
            .with_owner("tester", "tester");
        self.entries
            .lock()
            .insert(path.to_string(), (entry, Instant::now() + self.lag));
    }

    pub fn status(&self, path: &str) -> Result<EntryDescriptor, String> {
        self.counters.increment(&OBJECT_METADATA_REQUESTS);
        let entries = self.entries.lock();
        match entries.get(path) {
            Some((entry, visible_at)) if Instant::now() >= *visible_at => Ok(entry.clone()),
            _ => Err(format!("No such file or directory: {}", path)),
        }
    }
}
