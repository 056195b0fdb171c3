//! Call parameters and their classification into query or body parameters.
//!
//! # Design
//! A parameter travels in the URL query string when its serialized form is a
//! primitive (number, boolean or string) and in the JSON body otherwise. The
//! decision is made on the serialized form: a `Serializable` parameter whose
//! custom serialization yields a string goes to the query string even though
//! the value itself is structured.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Number, Value};

/// A value that can be written into a URL query string.
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Number(Number),
    Bool(bool),
    String(String),
}

impl Primitive {
    /// The primitive carried by a JSON value, if the value is one.
    pub fn from_json(value: &Value) -> Option<Primitive> {
        match value {
            Value::Number(n) => Some(Primitive::Number(n.clone())),
            Value::Bool(b) => Some(Primitive::Bool(*b)),
            Value::String(s) => Some(Primitive::String(s.clone())),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Primitive::Number(n) => Value::Number(n.clone()),
            Primitive::Bool(b) => Value::Bool(*b),
            Primitive::String(s) => Value::String(s.clone()),
        }
    }
}

/// String conversion used for the query string. Integral floats below 1e21
/// print all their digits without a fractional part (`2.0` becomes `2`).
impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Primitive::Number(n) => match n.as_f64() {
                Some(x) if n.is_f64() && x.fract() == 0.0 && x.abs() < 1e21 => {
                    write!(f, "{}", x as i128)
                }
                _ => write!(f, "{n}"),
            },
            Primitive::Bool(b) => write!(f, "{b}"),
            Primitive::String(s) => f.write_str(s),
        }
    }
}

/// A value with its own serialization, consulted before classification.
pub trait CustomSerialize: fmt::Debug + Send + Sync {
    /// Custom serialized form. `None` means the value has none and is sent
    /// as its `raw` form.
    fn to_json(&self) -> Option<Value>;

    /// The value's plain structured form.
    fn raw(&self) -> Value;
}

/// One named value handed to a remote call.
#[derive(Debug, Clone)]
pub enum CallParameter {
    Primitive(Primitive),
    Structured(Value),
    Serializable(Arc<dyn CustomSerialize>),
}

impl CallParameter {
    pub fn serializable(value: impl CustomSerialize + 'static) -> Self {
        CallParameter::Serializable(Arc::new(value))
    }

    /// Serialize `value` with serde; the resulting JSON form is classified
    /// like any other structured value.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_value(value).map(CallParameter::Structured)
    }
}

impl From<Primitive> for CallParameter {
    fn from(value: Primitive) -> Self {
        CallParameter::Primitive(value)
    }
}

impl From<Value> for CallParameter {
    fn from(value: Value) -> Self {
        CallParameter::Structured(value)
    }
}

impl From<bool> for CallParameter {
    fn from(value: bool) -> Self {
        CallParameter::Primitive(Primitive::Bool(value))
    }
}

impl From<&str> for CallParameter {
    fn from(value: &str) -> Self {
        CallParameter::Primitive(Primitive::String(value.to_string()))
    }
}

impl From<String> for CallParameter {
    fn from(value: String) -> Self {
        CallParameter::Primitive(Primitive::String(value))
    }
}

macro_rules! integer_parameter {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for CallParameter {
                fn from(value: $ty) -> Self {
                    CallParameter::Primitive(Primitive::Number(Number::from(value)))
                }
            }
        )*
    };
}

integer_parameter!(i32, i64, u32, u64, usize);

/// Non-finite floats have no JSON number form and are sent as their string
/// rendering.
impl From<f64> for CallParameter {
    fn from(value: f64) -> Self {
        let primitive = Number::from_f64(value)
            .map(Primitive::Number)
            .unwrap_or_else(|| Primitive::String(value.to_string()));
        CallParameter::Primitive(primitive)
    }
}

/// Where a parameter travels.
#[derive(Debug, Clone, PartialEq)]
pub enum Classified {
    Query(Primitive),
    Body(Value),
}

/// Decide whether `param` travels in the query string or in the body.
pub fn classify(param: &CallParameter) -> Classified {
    let form = match param {
        CallParameter::Primitive(p) => return Classified::Query(p.clone()),
        CallParameter::Structured(value) => value.clone(),
        CallParameter::Serializable(value) => value.to_json().unwrap_or_else(|| value.raw()),
    };
    match Primitive::from_json(&form) {
        Some(p) => Classified::Query(p),
        None => Classified::Body(form),
    }
}

/// Insertion-ordered mapping of parameter names to values.
#[derive(Debug, Clone, Default)]
pub struct Params {
    entries: Vec<(String, CallParameter)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<CallParameter>) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert a parameter. An existing name keeps its position and takes the
    /// new value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<CallParameter>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&CallParameter> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CallParameter)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parameters where some values may not be known yet.
#[derive(Debug, Clone, Default)]
pub struct PartialParams {
    entries: Vec<(String, Option<CallParameter>)>,
}

impl PartialParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, name: impl Into<String>, value: impl Into<CallParameter>) -> Self {
        self.with_opt(name, Some(value))
    }

    pub fn with_opt<V: Into<CallParameter>>(mut self, name: impl Into<String>, value: Option<V>) -> Self {
        let name = name.into();
        let value = value.map(Into::into);
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
        self
    }

    /// Name of the first absent parameter.
    pub fn first_missing(&self) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, v)| v.is_none())
            .map(|(n, _)| n.as_str())
    }

    /// All parameters, provided none is absent.
    pub fn complete(&self) -> Option<Params> {
        let entries = self
            .entries
            .iter()
            .map(|(n, v)| v.clone().map(|v| (n.clone(), v)))
            .collect::<Option<Vec<_>>>()?;
        Some(Params { entries })
    }
}

impl From<Params> for PartialParams {
    fn from(params: Params) -> Self {
        Self {
            entries: params.entries.into_iter().map(|(n, v)| (n, Some(v))).collect(),
        }
    }
}
