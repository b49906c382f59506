//! Placeholder substitution for structured configuration text
//!
//! Configuration files may reference override values using the `${KEY}`
//! syntax. Keys follow property naming: letters, digits, `_`, `.` and `-`.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::error::{Result, TestKitError};

/// Regex pattern for matching placeholder references: ${some.key}
static PLACEHOLDER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_.\-]*)\}").expect("placeholder pattern is valid")
});

/// Substitute `${KEY}` references in a string using `lookup`.
///
/// Returns an error listing all unresolved keys if any lookup fails.
///
/// # Examples
///
/// ```
/// use s3a_testkit::env::substitute;
///
/// let result = substitute("bucket: ${test.bucket}", |k| {
///     (k == "test.bucket").then(|| "landsat".to_string())
/// })
/// .unwrap();
/// assert_eq!(result, "bucket: landsat");
/// ```
pub fn substitute<F>(input: &str, lookup: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut missing: Vec<String> = Vec::new();

    let result = PLACEHOLDER_PATTERN.replace_all(input, |caps: &Captures<'_>| {
        let key = &caps[1];
        match lookup(key) {
            Some(value) => value,
            None => {
                if !missing.iter().any(|m| m == key) {
                    missing.push(key.to_string());
                }
                caps[0].to_string()
            }
        }
    });

    if !missing.is_empty() {
        return Err(TestKitError::Configuration(format!(
            "Unresolved placeholders: {}",
            missing.join(", ")
        )));
    }

    Ok(result.into_owned())
}
