use indexmap::IndexMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{graph::envelope::Envelope, host::BufferId};

/// A value that can be applied to a node member.
///
/// Numbers and envelopes are what automation parameters accept; everything
/// else is handed to the host (or stored on a composite) as a plain property.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(untagged))]
pub enum Value {
    Number(f64),
    Bool(bool),
    Text(String),
    Envelope(Envelope),
    Settings(Settings),
    /// Transfer curve for wave shapers.
    #[cfg_attr(feature = "serde", serde(skip))]
    Curve(Vec<f32>),
    #[cfg_attr(feature = "serde", serde(skip))]
    Buffer(BufferId),
}

impl Value {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Whether the value counts as "set": not zero, NaN, empty text or false.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Bool(b) => *b,
            Value::Text(text) => !text.is_empty(),
            _ => true,
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::Number(value as f64)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(value as f64)
    }
}

impl From<u8> for Value {
    fn from(value: u8) -> Self {
        Value::Number(value as f64)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<Envelope> for Value {
    fn from(value: Envelope) -> Self {
        Value::Envelope(value)
    }
}

impl From<Settings> for Value {
    fn from(value: Settings) -> Self {
        Value::Settings(value)
    }
}

impl From<Vec<f32>> for Value {
    fn from(value: Vec<f32>) -> Self {
        Value::Curve(value)
    }
}

impl From<BufferId> for Value {
    fn from(value: BufferId) -> Self {
        Value::Buffer(value)
    }
}

/// Member name → value, applied once when a node is created.
///
/// Entries keep the order they were inserted in, and that is the order they
/// are applied in.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct Settings {
    entries: IndexMap<String, Value>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Insert or replace; a replaced entry keeps its position.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.entries.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.get(name)
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_number)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.entries.shift_remove(name)
    }

    /// Copy every entry of `other` over this one; `other` wins.
    pub fn merge(&mut self, other: &Settings) {
        for (name, value) in &other.entries {
            self.entries.insert(name.clone(), value.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Settings {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut settings = Settings::new();
        for (name, value) in iter {
            settings.set(name, value);
        }
        settings
    }
}

/// Build [`Settings`] inline.
///
/// ```
/// use tony_graph::settings;
///
/// let osc = settings! { "type" => "sawtooth", "frequency" => 110.0 };
/// assert_eq!(osc.number("frequency"), Some(110.0));
/// ```
#[macro_export]
macro_rules! settings {
    () => { $crate::graph::settings::Settings::new() };
    ($($name:expr => $value:expr),+ $(,)?) => {
        $crate::graph::settings::Settings::new()$(.with($name, $value))+
    };
}
