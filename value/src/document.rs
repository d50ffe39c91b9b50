use crate::value::Value;
use indexmap::IndexMap;
use indexmap::map::{IntoIter, Iter, Keys};
use std::fmt::{Display, Formatter};

/// Ordered field map of one stored document.
///
/// Insertion order is kept so the public `id` can be the first key after a read.
/// Equality ignores key order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Document {
    fields: IndexMap<String, Value>,
}

impl Document {
    pub fn new() -> Self {
        Document {
            fields: IndexMap::new(),
        }
    }

    pub fn from_pairs<S: AsRef<str>>(pairs: Vec<(S, Value)>) -> Self {
        pairs
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_string(), v))
            .collect()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.fields.get_mut(key)
    }

    pub fn insert<S: Into<String>, V: Into<Value>>(&mut self, key: S, value: V) -> Option<Value> {
        self.fields.insert(key.into(), value.into())
    }

    /// Removes a key while keeping the order of the remaining ones.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.shift_remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Field is present and not null.
    pub fn has_value(&self, key: &str) -> bool {
        self.fields.get(key).is_some_and(|v| !v.is_null())
    }

    pub fn keys(&self) -> Keys<'_, String, Value> {
        self.fields.keys()
    }

    pub fn iter(&self) -> Iter<'_, String, Value> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn first_key(&self) -> Option<&str> {
        self.fields.first().map(|(k, _)| k.as_str())
    }

    /// Puts `key` at the front, replacing any previous entry.
    pub fn insert_first<S: Into<String>, V: Into<Value>>(&mut self, key: S, value: V) {
        let key = key.into();
        self.fields.shift_remove(&key);
        self.fields.shift_insert(0, key, value.into());
    }

    /// Overwrites the fields of `self` with the ones of `other`.
    pub fn merge(&mut self, other: Document) {
        for (k, v) in other {
            self.fields.insert(k, v);
        }
    }

    pub fn retain<F: FnMut(&String, &mut Value) -> bool>(&mut self, keep: F) {
        self.fields.retain(keep)
    }
}

impl Display for Document {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{{{}}}",
            self.fields
                .iter()
                .map(|(k, v)| format!("{}:{}", k, v))
                .collect::<Vec<_>>()
                .join(",")
        )
    }
}

impl IntoIterator for Document {
    type Item = (String, Value);
    type IntoIter = IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl<'a> IntoIterator for &'a Document {
    type Item = (&'a String, &'a Value);
    type IntoIter = Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Document {
            fields: iter.into_iter().collect(),
        }
    }
}

impl Extend<(String, Value)> for Document {
    fn extend<T: IntoIterator<Item = (String, Value)>>(&mut self, iter: T) {
        self.fields.extend(iter)
    }
}
