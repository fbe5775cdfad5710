use serde_json::{Map, Value};

/// Field values available to path tokens, content templates and derived fields.
///
/// Keys are case-sensitive and unique. A context is built up during derivation
/// and treated as read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataContext {
    fields: Map<String, Value>,
}

impl DataContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Merge every field of `other` into this context, replacing existing keys.
    pub fn merge(&mut self, other: Map<String, Value>) {
        for (key, value) in other {
            self.fields.insert(key, value);
        }
    }

    /// The field's value, if it is present and truthy.
    pub fn truthy(&self, key: &str) -> Option<&Value> {
        self.fields.get(key).filter(|v| is_truthy(v))
    }

    /// Textual form of a field, as substituted into paths.
    pub fn text(&self, key: &str) -> Option<String> {
        self.truthy(key).map(value_text)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.fields
    }
}

impl From<Map<String, Value>> for DataContext {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for DataContext {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut context = DataContext::new();
        for (key, value) in iter {
            context.insert(key, value);
        }
        context
    }
}

/// `null`, `false`, `0` and `""` are falsy; everything else is truthy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Strings are used verbatim; every other value uses its JSON text.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
