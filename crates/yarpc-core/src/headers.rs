//! Application headers: an ordered, case-insensitive multimap.
//!
//! Keys are normalized to lower-case ASCII on every store and lookup. The
//! original spelling is retained only for diagnostic display. Enumeration
//! order is insertion order.

/// One stored header entry.
#[derive(Debug, Clone)]
struct Entry {
    /// Lower-cased key, used for all lookups.
    key: String,
    /// Key as first written by the caller, for display only.
    display: String,
    value: String,
}

/// Ordered case-insensitive multimap of user metadata.
///
/// `set` has last-writer-wins semantics: it collapses every value stored
/// under the key into a single one. `add` appends and preserves multiple
/// values; the transport edge decides whether to emit multiple header lines
/// or join them.
///
/// Two `Headers` are equal iff their lowercased-key to value-list mappings
/// are equal, regardless of the order distinct keys were inserted in.
#[derive(Clone, Default)]
pub struct Headers {
    entries: Vec<Entry>,
}

fn normalize(key: &str) -> String {
    key.to_ascii_lowercase()
}

impl Headers {
    /// Create an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty header map with room for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Build a header map from `(key, value)` pairs, preserving multiples.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut headers = Self::new();
        for (k, v) in pairs {
            headers.add(k.as_ref(), v);
        }
        headers
    }

    /// Store a single value under `key`, replacing any existing values.
    ///
    /// The entry keeps the position of the first value previously stored
    /// under the key, so enumeration order stays stable across overwrites.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let lowered = normalize(key);
        let value = value.into();
        let mut kept = false;
        self.entries.retain_mut(|entry| {
            if entry.key != lowered {
                return true;
            }
            if kept {
                return false;
            }
            kept = true;
            entry.value = value.clone();
            true
        });
        if !kept {
            self.entries.push(Entry {
                key: lowered,
                display: key.to_owned(),
                value,
            });
        }
    }

    /// Append a value under `key`, preserving any existing values.
    pub fn add(&mut self, key: &str, value: impl Into<String>) {
        self.entries.push(Entry {
            key: normalize(key),
            display: key.to_owned(),
            value: value.into(),
        });
    }

    /// First value stored under `key`, if any.
    pub fn get(&self, key: &str) -> Option<&str> {
        let lowered = normalize(key);
        self.entries
            .iter()
            .find(|entry| entry.key == lowered)
            .map(|entry| entry.value.as_str())
    }

    /// All values stored under `key`, in insertion order.
    pub fn get_all<'a>(&'a self, key: &str) -> impl Iterator<Item = &'a str> {
        let lowered = normalize(key);
        self.entries
            .iter()
            .filter(move |entry| entry.key == lowered)
            .map(|entry| entry.value.as_str())
    }

    /// All `(lowercased key, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|entry| (entry.key.as_str(), entry.value.as_str()))
    }

    /// Merge `other` into `self` with `set` semantics per key.
    pub fn extend_from(&mut self, other: &Headers) {
        for (key, value) in other.iter() {
            self.set(key, value);
        }
    }

    /// Number of stored entries (counting multiples).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for Headers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for entry in &self.entries {
            map.entry(&entry.display, &entry.value);
        }
        map.finish()
    }
}

impl PartialEq for Headers {
    fn eq(&self, other: &Self) -> bool {
        fn grouped(headers: &Headers) -> std::collections::HashMap<&str, Vec<&str>> {
            let mut map: std::collections::HashMap<&str, Vec<&str>> =
                std::collections::HashMap::new();
            for (key, value) in headers.iter() {
                map.entry(key).or_default().push(value);
            }
            map
        }
        grouped(self) == grouped(other)
    }
}

impl Eq for Headers {}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::from_pairs(iter)
    }
}
