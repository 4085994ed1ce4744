//! Search Space - declarative hyperparameter grid
//!
//! A space maps each parameter name to an explicit, finite list of candidate
//! values. [`SearchSpace::configurations`] expands it into the full cartesian
//! product in a fixed order: parameters in declaration order, the last one
//! varying fastest.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A single hyperparameter value.
///
/// `Null` stands for "no limit" style values (`max_depth: null`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Absent / unlimited
    Null,
    /// Boolean flag
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Floating point value
    Float(f64),
    /// Free-form string (loss names and the like)
    Text(String),
}

impl ParamValue {
    /// Convert a JSON scalar. Arrays and objects are not parameter values.
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => Some(Self::Null),
            serde_json::Value::Bool(b) => Some(Self::Bool(*b)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float)),
            serde_json::Value::String(s) => Some(Self::Text(s.clone())),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("None"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl<T: Into<Self>> From<Option<T>> for ParamValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// One concrete assignment of values to every parameter of a space.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Configuration(BTreeMap<String, ParamValue>);

impl Configuration {
    /// Empty configuration (every parameter at its default).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a parameter.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    /// Look up a parameter.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    /// Iterate over `(name, value)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    /// Number of parameters set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no parameter is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Positive integer parameter, or `default` when unset.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for non-integer or non-positive values.
    pub fn usize_or(&self, name: &str, default: usize) -> Result<usize> {
        match self.get(name) {
            None => Ok(default),
            Some(ParamValue::Int(i)) if *i > 0 => usize::try_from(*i)
                .map_err(|_| Error::InvalidInput(format!("{name}={i} is out of range"))),
            Some(other) => Err(Error::InvalidInput(format!(
                "{name} must be a positive integer, got {other}"
            ))),
        }
    }

    /// Optional positive integer parameter; `null` means unlimited.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for values that are neither `null` nor a
    /// positive integer.
    pub fn opt_usize_or(&self, name: &str, default: Option<usize>) -> Result<Option<usize>> {
        match self.get(name) {
            None => Ok(default),
            Some(ParamValue::Null) => Ok(None),
            Some(_) => self.usize_or(name, 0).map(Some),
        }
    }

    /// Float parameter (integers are widened), or `default` when unset.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for non-numeric or non-finite values.
    #[allow(clippy::cast_precision_loss)]
    pub fn f64_or(&self, name: &str, default: f64) -> Result<f64> {
        let value = match self.get(name) {
            None => return Ok(default),
            Some(ParamValue::Float(x)) => *x,
            Some(ParamValue::Int(i)) => *i as f64,
            Some(other) => {
                return Err(Error::InvalidInput(format!(
                    "{name} must be a number, got {other}"
                )))
            }
        };
        if value.is_finite() {
            Ok(value)
        } else {
            Err(Error::InvalidInput(format!("{name} must be finite")))
        }
    }

    /// Boolean parameter, or `default` when unset.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for non-boolean values.
    pub fn bool_or(&self, name: &str, default: bool) -> Result<bool> {
        match self.get(name) {
            None => Ok(default),
            Some(ParamValue::Bool(b)) => Ok(*b),
            Some(other) => Err(Error::InvalidInput(format!(
                "{name} must be true or false, got {other}"
            ))),
        }
    }

    /// Integer seed parameter, or `default` when unset.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for negative or non-integer values.
    pub fn seed_or(&self, name: &str, default: u64) -> Result<u64> {
        match self.get(name) {
            None | Some(ParamValue::Null) => Ok(default),
            Some(ParamValue::Int(i)) => u64::try_from(*i)
                .map_err(|_| Error::InvalidInput(format!("{name} must be non-negative"))),
            Some(other) => Err(Error::InvalidInput(format!(
                "{name} must be an integer seed, got {other}"
            ))),
        }
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (name, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}: {value}")?;
        }
        f.write_str("}")
    }
}

/// Grid of candidate values per parameter, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(try_from = "serde_json::Map<String, serde_json::Value>")]
pub struct SearchSpace {
    params: Vec<(String, Vec<ParamValue>)>,
}

impl SearchSpace {
    /// Empty space: expands to one all-defaults configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a parameter and its candidate values.
    ///
    /// Re-declaring a name replaces its candidates in place.
    #[must_use]
    pub fn param<V, I>(mut self, name: impl Into<String>, values: I) -> Self
    where
        V: Into<ParamValue>,
        I: IntoIterator<Item = V>,
    {
        let name = name.into();
        let values: Vec<ParamValue> = values.into_iter().map(Into::into).collect();
        if let Some(slot) = self.params.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = values;
        } else {
            self.params.push((name, values));
        }
        self
    }

    /// Parameter names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.params.iter().map(|(n, _)| n.as_str())
    }

    /// Candidate values of a parameter.
    #[must_use]
    pub fn candidates(&self, name: &str) -> Option<&[ParamValue]> {
        self.params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
    }

    /// Number of configurations the grid expands to (`Π k_i`).
    #[must_use]
    pub fn len(&self) -> usize {
        self.params.iter().map(|(_, v)| v.len()).product()
    }

    /// Whether the grid expands to nothing (some parameter has no candidates).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Expand the grid into every configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if any parameter has an empty candidate list.
    pub fn configurations(&self) -> Result<Vec<Configuration>> {
        if let Some((name, _)) = self.params.iter().find(|(_, v)| v.is_empty()) {
            return Err(Error::InvalidInput(format!(
                "parameter '{name}' has no candidate values"
            )));
        }

        // Odometer over candidate indices; the last parameter turns fastest.
        let mut out = Vec::with_capacity(self.len());
        let mut cursor = vec![0usize; self.params.len()];
        loop {
            let config = self
                .params
                .iter()
                .zip(&cursor)
                .fold(Configuration::new(), |c, ((name, values), &i)| {
                    c.with(name.clone(), values[i].clone())
                });
            out.push(config);

            let mut pos = self.params.len();
            loop {
                if pos == 0 {
                    return Ok(out);
                }
                pos -= 1;
                cursor[pos] += 1;
                if cursor[pos] < self.params[pos].1.len() {
                    break;
                }
                cursor[pos] = 0;
            }
        }
    }
}

impl Serialize for SearchSpace {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;

        let mut map = serializer.serialize_map(Some(self.params.len()))?;
        for (name, values) in &self.params {
            map.serialize_entry(name, values)?;
        }
        map.end()
    }
}

impl TryFrom<serde_json::Map<String, serde_json::Value>> for SearchSpace {
    type Error = Error;

    fn try_from(map: serde_json::Map<String, serde_json::Value>) -> Result<Self> {
        let mut space = Self::new();
        for (name, values) in map {
            let serde_json::Value::Array(values) = values else {
                return Err(Error::InvalidInput(format!(
                    "parameter '{name}' must list its candidates in an array"
                )));
            };
            let values = values
                .iter()
                .map(|v| {
                    ParamValue::from_json(v).ok_or_else(|| {
                        Error::InvalidInput(format!("parameter '{name}' has a non-scalar value"))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            space.params.push((name, values));
        }
        Ok(space)
    }
}
