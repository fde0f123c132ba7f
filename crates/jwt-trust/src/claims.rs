//! Token claims.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::error::InvalidToken;
use crate::{Error, Result};

/// Registered claims that carry a NumericDate.
pub const DATE_CLAIMS: [&str; 3] = ["iat", "nbf", "exp"];

/// Ordered claim set.
///
/// Insertion order is preserved through encoding, so the same payload always
/// serializes to the same token body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Claims(Map<String, Value>);

impl Claims {
    /// Empty claim set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a claim, returning the previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(name.into(), value.into())
    }

    /// Builder-style [`Claims::insert`].
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Get a claim by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Convenience accessor for `sub`.
    pub fn sub(&self) -> Option<&str> {
        self.get("sub").and_then(Value::as_str)
    }

    /// The `iss` claim as text, if it is a string or number.
    pub fn issuer(&self) -> Option<String> {
        match self.get("iss")? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Number of claims.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if there are no claims.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate claims in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Borrow the underlying JSON object.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Take the underlying JSON object.
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// The claim body to sign: nulls dropped, date claims checked.
    pub(crate) fn to_signing_body(&self) -> Result<Map<String, Value>> {
        let mut body = Map::with_capacity(self.0.len());
        for (name, value) in &self.0 {
            if value.is_null() {
                continue;
            }
            let value = if DATE_CLAIMS.contains(&name.as_str()) {
                numeric_date(value).ok_or_else(|| {
                    Error::TokenCreation(format!("claim `{name}` must be a numeric date"))
                })?
            } else {
                value.clone()
            };
            body.insert(name.clone(), value);
        }
        Ok(body)
    }

    /// Decoded claims with date claims reduced to whole epoch seconds.
    ///
    /// Fails with [`InvalidToken::Malformed`] when a date claim is not a
    /// number or numeric string.
    pub(crate) fn normalized(self) -> Result<Self> {
        self.0
            .into_iter()
            .map(|(name, value)| {
                if !DATE_CLAIMS.contains(&name.as_str()) {
                    return Ok((name, value));
                }
                match epoch_seconds(&value) {
                    Some(secs) => Ok((name, Value::from(secs))),
                    None => Err(Error::from(InvalidToken::Malformed(format!(
                        "claim `{name}` must be a numeric date"
                    )))),
                }
            })
            .collect()
    }
}

impl From<Map<String, Value>> for Claims {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Value)> for Claims {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Claims {
    type Item = (String, Value);
    type IntoIter = serde_json::map::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

// Numbers pass through untouched; numeric strings become whole seconds.
fn numeric_date(value: &Value) -> Option<Value> {
    match value {
        Value::Number(_) => Some(value.clone()),
        Value::String(_) => epoch_seconds(value).map(|secs| Value::Number(Number::from(secs))),
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation)]
fn epoch_seconds(value: &Value) -> Option<i64> {
    let as_float = |f: f64| f.is_finite().then_some(f.trunc() as i64);
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(as_float)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(as_float))
        }
        _ => None,
    }
}
