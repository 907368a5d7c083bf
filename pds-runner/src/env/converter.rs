/// Converts a configuration key into an environment variable name
///
/// The key is upper cased, `.` becomes `_` and `-` is removed. Empty keys are
/// returned unchanged.
///
/// ```
/// use pds_runner::env::convert_key_to_env;
///
/// assert_eq!(convert_key_to_env("all-hyphens.are.re-moved"), "ALLHYPHENS_ARE_REMOVED");
/// ```
pub fn convert_key_to_env(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '-')
        .map(|c| if c == '.' { '_' } else { c.to_ascii_uppercase() })
        .collect()
}
