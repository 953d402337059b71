use std::collections::HashMap;

/// An interning table that maps strings to dense indices in first-seen order.
///
/// Used for outcome labels and feature predicates of the maxent model as well as
/// for the words of the n-gram model. Indices never change once assigned.
#[derive(Debug, Default, Clone)]
pub struct Vocabulary {
    items: Vec<String>,
    index: HashMap<String, usize>,
}

impl Vocabulary {
    pub fn with_capacity(n: usize) -> Self {
        Self {
            items: Vec::with_capacity(n),
            index: HashMap::with_capacity(n),
        }
    }

    /// Returns the index of `key`, adding it at the end if it is new.
    pub fn insert(&mut self, key: &str) -> usize {
        if let Some(&id) = self.index.get(key) {
            return id;
        }
        let id = self.items.len();
        self.index.insert(key.to_string(), id);
        self.items.push(key.to_string());
        id
    }

    pub fn id(&self, key: &str) -> Option<usize> {
        self.index.get(key).copied()
    }

    pub fn get(&self, id: usize) -> Option<&str> {
        self.items.get(id).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(String::as_str)
    }
}

impl<S: AsRef<str>> FromIterator<S> for Vocabulary {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut vocab = Vocabulary::default();
        for s in iter {
            vocab.insert(s.as_ref());
        }
        vocab
    }
}
