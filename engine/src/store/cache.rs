use std::collections::HashMap;

/// Environmentally resolved values keyed by dimension, then option.
///
/// An entry exists only for (dimension, option) pairs that were resolved
/// while selected. Entries are never evicted; the store's signal observers
/// keep them current.
#[derive(Debug, Default)]
pub struct ResolutionCache {
    entries: HashMap<String, HashMap<String, String>>,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, dimension: &str, option: &str) -> Option<&str> {
        self.entries
            .get(dimension)
            .and_then(|options| options.get(option))
            .map(String::as_str)
    }

    /// Inserts a first observation. Returns the cached value and whether the
    /// entry was created by this call; an existing entry is left untouched.
    pub fn insert_if_absent(
        &mut self,
        dimension: &str,
        option: &str,
        value: &str,
    ) -> (String, bool) {
        let options = self.entries.entry(dimension.to_string()).or_default();
        match options.get(option) {
            Some(existing) => (existing.clone(), false),
            None => {
                options.insert(option.to_string(), value.to_string());
                (value.to_string(), true)
            }
        }
    }

    /// Records a new observation for an existing or new entry.
    pub fn update(&mut self, dimension: &str, option: &str, value: &str) {
        self.entries
            .entry(dimension.to_string())
            .or_default()
            .insert(option.to_string(), value.to_string());
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
