//! Verification of filesystem entry status
//!
//! The expected descriptor doubles as a filter: `len` and
//! `modification_time` are always compared, every other field only when
//! the expected value is non-zero or `Some`. A literal zero (or `None`)
//! therefore cannot be asserted for those fields.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TestKitError};

/// Unix permission bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(u16);

impl Permission {
    pub const fn new(bits: u16) -> Self {
        Self(bits & 0o7777)
    }

    pub fn bits(self) -> u16 {
        self.0
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const FLAGS: [(u16, char); 9] = [
            (0o400, 'r'),
            (0o200, 'w'),
            (0o100, 'x'),
            (0o040, 'r'),
            (0o020, 'w'),
            (0o010, 'x'),
            (0o004, 'r'),
            (0o002, 'w'),
            (0o001, 'x'),
        ];
        for (bit, c) in FLAGS {
            write!(f, "{}", if self.0 & bit != 0 { c } else { '-' })?;
        }
        if self.0 & 0o1000 != 0 {
            f.write_str("t")?;
        }
        Ok(())
    }
}

/// Status of a file or directory as reported by the filesystem under test
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntryDescriptor {
    pub path: String,
    pub is_directory: bool,
    /// Length in bytes
    pub len: u64,
    pub block_size: u64,
    /// Epoch milliseconds
    pub modification_time: i64,
    /// Epoch milliseconds
    pub access_time: i64,
    pub replication: u16,
    pub owner: Option<String>,
    pub group: Option<String>,
    pub permission: Option<Permission>,
}

impl EntryDescriptor {
    pub fn file(path: impl Into<String>, len: u64, block_size: u64, modification_time: i64) -> Self {
        Self {
            path: path.into(),
            len,
            block_size,
            modification_time,
            ..Default::default()
        }
    }

    pub fn directory(path: impl Into<String>, modification_time: i64) -> Self {
        Self {
            path: path.into(),
            is_directory: true,
            modification_time,
            ..Default::default()
        }
    }

    pub fn with_owner(mut self, owner: impl Into<String>, group: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self.group = Some(group.into());
        self
    }

    pub fn with_permission(mut self, permission: Permission) -> Self {
        self.permission = Some(permission);
        self
    }

    pub fn with_replication(mut self, replication: u16) -> Self {
        self.replication = replication;
        self
    }

    pub fn with_access_time(mut self, access_time: i64) -> Self {
        self.access_time = access_time;
        self
    }
}

/// One field whose actual value differs from the expected one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMismatch {
    pub field: &'static str,
    pub expected: String,
    pub actual: String,
}

impl FieldMismatch {
    pub fn new(field: &'static str, expected: impl fmt::Display, actual: impl fmt::Display) -> Self {
        Self {
            field,
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}

impl fmt::Display for FieldMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: expected {}, got {}", self.field, self.expected, self.actual)
    }
}

/// Verify a file entry against `expected`, reporting every mismatching field
pub fn verify_file_status(actual: &EntryDescriptor, expected: &EntryDescriptor) -> Result<()> {
    let mut mismatches = Vec::new();
    if actual.is_directory {
        mismatches.push(FieldMismatch::new("is_directory", false, true));
    }
    check(&mut mismatches, "len", expected.len, actual.len);
    check_common(&mut mismatches, actual, expected);
    finish(actual, mismatches)
}

/// Verify a directory entry: must be a directory of zero length
pub fn verify_dir_status(actual: &EntryDescriptor, expected: &EntryDescriptor) -> Result<()> {
    let mut mismatches = Vec::new();
    if !actual.is_directory {
        mismatches.push(FieldMismatch::new("is_directory", true, false));
    }
    check(&mut mismatches, "len", 0, actual.len);
    check_common(&mut mismatches, actual, expected);
    finish(actual, mismatches)
}

fn check_common(out: &mut Vec<FieldMismatch>, actual: &EntryDescriptor, expected: &EntryDescriptor) {
    check(out, "modification_time", expected.modification_time, actual.modification_time);
    if expected.block_size != 0 {
        check(out, "block_size", expected.block_size, actual.block_size);
    }
    if expected.replication != 0 {
        check(out, "replication", expected.replication, actual.replication);
    }
    if expected.access_time != 0 {
        check(out, "access_time", expected.access_time, actual.access_time);
    }
    check_optional(out, "owner", &expected.owner, &actual.owner);
    check_optional(out, "group", &expected.group, &actual.group);
    check_optional(out, "permission", &expected.permission, &actual.permission);
}

fn check<T: PartialEq + fmt::Display>(
    out: &mut Vec<FieldMismatch>,
    field: &'static str,
    expected: T,
    actual: T,
) {
    if expected != actual {
        out.push(FieldMismatch::new(field, expected, actual));
    }
}

fn check_optional<T: PartialEq + fmt::Display>(
    out: &mut Vec<FieldMismatch>,
    field: &'static str,
    expected: &Option<T>,
    actual: &Option<T>,
) {
    if let Some(want) = expected {
        match actual {
            Some(got) => check(out, field, want, got),
            None => out.push(FieldMismatch::new(field, want, "<none>")),
        }
    }
}

fn finish(actual: &EntryDescriptor, mismatches: Vec<FieldMismatch>) -> Result<()> {
    if mismatches.is_empty() {
        return Ok(());
    }
    Err(TestKitError::FieldMismatch {
        path: actual.path.clone(),
        mismatches,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MTIME: i64 = 1_514_764_800_000;

    fn sample_file() -> EntryDescriptor {
        EntryDescriptor::file("s3a://bucket/data.csv", 1024, 32 << 20, MTIME)
            .with_owner("alice", "staff")
            .with_permission(Permission::new(0o644))
            .with_replication(1)
            .with_access_time(MTIME)
    }

    fn mismatched_fields(err: TestKitError) -> Vec<&'static str> {
        match err {
            TestKitError::FieldMismatch { mismatches, .. } => {
                mismatches.into_iter().map(|m| m.field).collect()
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_matching_file() {
        let actual = sample_file();
        assert!(verify_file_status(&actual, &actual.clone()).is_ok());
    }

    #[test]
    fn test_unset_fields_are_unchecked() {
        let actual = sample_file();
        let expected = EntryDescriptor::file("s3a://bucket/data.csv", 1024, 0, MTIME);
        assert!(verify_file_status(&actual, &expected).is_ok());
    }

    #[test]
    fn test_zero_len_is_still_checked() {
        let actual = sample_file();
        let expected = EntryDescriptor::file("s3a://bucket/data.csv", 0, 0, MTIME);
        let err = verify_file_status(&actual, &expected).unwrap_err();
        assert_eq!(mismatched_fields(err), vec!["len"]);
    }

    #[test]
    fn test_all_mismatches_reported() {
        let actual = sample_file();
        let expected = EntryDescriptor::file("s3a://bucket/data.csv", 1024, 64 << 20, MTIME + 1)
            .with_owner("bob", "staff")
            .with_permission(Permission::new(0o600));
        let err = verify_file_status(&actual, &expected).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("s3a://bucket/data.csv"), "{}", msg);
        assert!(msg.contains("permission: expected rw-------, got rw-r--r--"), "{}", msg);
        assert_eq!(
            mismatched_fields(err),
            vec!["modification_time", "block_size", "owner", "permission"]
        );
    }

    #[test]
    fn test_missing_optional_field() {
        let actual = EntryDescriptor::file("f", 1, 1, MTIME);
        let expected = EntryDescriptor::file("f", 1, 1, MTIME).with_owner("alice", "staff");
        let err = verify_file_status(&actual, &expected).unwrap_err();
        assert_eq!(mismatched_fields(err), vec!["owner", "group"]);
    }

    #[test]
    fn test_file_check_rejects_directory() {
        let actual = EntryDescriptor::directory("s3a://bucket/dir", MTIME);
        let expected = EntryDescriptor::file("s3a://bucket/dir", 0, 0, MTIME);
        let err = verify_file_status(&actual, &expected).unwrap_err();
        assert_eq!(mismatched_fields(err), vec!["is_directory"]);
    }

    #[test]
    fn test_directory_status() {
        let actual = EntryDescriptor::directory("s3a://bucket/dir", MTIME).with_owner("alice", "staff");
        let expected = EntryDescriptor::directory("s3a://bucket/dir", MTIME);
        assert!(verify_dir_status(&actual, &expected).is_ok());

        let mut non_empty = actual.clone();
        non_empty.len = 4096;
        let err = verify_dir_status(&non_empty, &expected).unwrap_err();
        assert_eq!(mismatched_fields(err), vec!["len"]);

        let file = EntryDescriptor::file("s3a://bucket/dir", 0, 0, MTIME);
        let err = verify_dir_status(&file, &expected).unwrap_err();
        assert_eq!(mismatched_fields(err), vec!["is_directory"]);
    }

    #[test]
    fn test_permission_display() {
        assert_eq!(Permission::new(0o755).to_string(), "rwxr-xr-x");
        assert_eq!(Permission::new(0o1777).to_string(), "rwxrwxrwxt");
        assert_eq!(Permission::new(0o170644).bits(), 0o644);
    }

    #[test]
    fn test_expected_from_yaml() {
        let yaml = r#"
path: s3a://bucket/data.csv
len: 1024
modification_time: 1514764800000
owner: alice
permission: 420
"#;
        let expected: EntryDescriptor = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(expected.permission, Some(Permission::new(0o644)));
        assert_eq!(expected.group, None);
        assert!(verify_file_status(&sample_file(), &expected).is_ok());
    }
}
