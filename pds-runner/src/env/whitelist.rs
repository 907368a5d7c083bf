use std::collections::HashMap;
use tracing::debug;

/// Variables every launcher script may inherit
pub const DEFAULT_WHITELIST: &[&str] = &[
    "HOME", "LANG", "LC_ALL", "PATH", "PWD", "SHELL", "TEMP", "TERM", "TMP", "TMPDIR", "TZ",
    "USER",
];

/// Filters an environment map down to whitelisted variable names
///
/// Entries are exact names or prefixes ending with `*`, for example
/// `PDS_STORAGE_*` accepts `PDS_STORAGE_S3_1` but not `PDS_STORAGEHOLDER`.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentSanitizer {
    custom: Vec<WhitelistEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum WhitelistEntry {
    Exact(String),
    Prefix(String),
}

impl WhitelistEntry {
    fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        match trimmed.strip_suffix('*') {
            Some(prefix) => Some(Self::Prefix(prefix.to_string())),
            None => Some(Self::Exact(trimmed.to_string())),
        }
    }

    fn matches(&self, name: &str) -> bool {
        match self {
            Self::Exact(exact) => exact == name,
            Self::Prefix(prefix) => name.starts_with(prefix.as_str()),
        }
    }
}

impl EnvironmentSanitizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a sanitizer with a comma separated custom whitelist
    pub fn with_whitelist(whitelist: Option<&str>) -> Self {
        let mut sanitizer = Self::new();
        sanitizer.update_whitelist(whitelist);
        sanitizer
    }

    /// Replaces the custom whitelist
    ///
    /// `None`, an empty string or a string made of commas only resets the
    /// sanitizer to the default whitelist.
    pub fn update_whitelist(&mut self, whitelist: Option<&str>) {
        self.custom = whitelist
            .map(|list| list.split(',').filter_map(WhitelistEntry::parse).collect())
            .unwrap_or_default();
    }

    /// Adds further entries without dropping the current ones
    pub fn extend_whitelist<I, S>(&mut self, entries: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.custom
            .extend(entries.into_iter().filter_map(|e| WhitelistEntry::parse(e.as_ref())));
    }

    pub fn is_whitelisted(&self, name: &str) -> bool {
        DEFAULT_WHITELIST.contains(&name) || self.custom.iter().any(|entry| entry.matches(name))
    }

    /// Removes every variable that is not whitelisted
    pub fn sanitize(&self, environment: &mut HashMap<String, String>) {
        environment.retain(|name, _| {
            let keep = self.is_whitelisted(name);
            if !keep {
                debug!("Removing '{}' from launcher script environment", name);
            }
            keep
        });
    }
}
