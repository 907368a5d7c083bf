use std::collections::HashMap;

/// Environment map that ignores incomplete entries
///
/// `put` calls with a missing key or value are dropped silently, the map
/// stays as it was.
#[derive(Debug, Default, Clone)]
pub struct SafeEnvironment {
    entries: HashMap<String, String>,
}

impl SafeEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put<K, V>(&mut self, key: Option<K>, value: Option<V>)
    where
        K: Into<String>,
        V: Into<String>,
    {
        if let (Some(key), Some(value)) = (key, value) {
            self.entries.insert(key.into(), value.into());
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_map(self) -> HashMap<String, String> {
        self.entries
    }
}

impl Extend<(String, String)> for SafeEnvironment {
    fn extend<T: IntoIterator<Item = (String, String)>>(&mut self, iter: T) {
        self.entries.extend(iter);
    }
}
