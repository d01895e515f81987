//! Claims extracted from a validated token
//!
//! Claims are an ordered multimap of string pairs. A JSON array claim
//! (`"scope": ["api1", "api2"]`, `"role": ["admin", "user"]`) becomes one
//! [`Claim`] per element, in order, which is how downstream identity
//! construction expects multi-valued claims.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single `(type, value)` claim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    /// Claim type (`sub`, `scope`, `role`, ...)
    pub name: String,
    /// Claim value rendered as a string
    pub value: String,
}

impl Claim {
    /// Create a claim
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Ordered collection of claims; the same name may appear more than once
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Claims(Vec<Claim>);

impl Claims {
    /// Empty claim set
    pub fn new() -> Self {
        Self::default()
    }

    /// Flatten a JSON object into claims.
    ///
    /// Strings are taken verbatim, numbers and booleans use their JSON text,
    /// arrays expand into repeated claims, nested objects are kept as compact
    /// JSON, and `null` is dropped.
    pub fn from_json(object: &Map<String, Value>) -> Self {
        let mut claims = Self::new();
        for (name, value) in object {
            claims.push_value(name, value);
        }
        claims
    }

    fn push_value(&mut self, name: &str, value: &Value) {
        match value {
            Value::Null => {}
            Value::String(s) => self.push(name, s.clone()),
            Value::Array(items) => {
                for item in items {
                    // Nested arrays are flattened one level at a time
                    self.push_value(name, item);
                }
            }
            Value::Bool(_) | Value::Number(_) | Value::Object(_) => {
                self.push(name, value.to_string());
            }
        }
    }

    /// Append a claim
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push(Claim::new(name, value));
    }

    /// First value for `name`
    pub fn first(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.value.as_str())
    }

    /// All values for `name`, in order
    pub fn values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0
            .iter()
            .filter(move |c| c.name == name)
            .map(|c| c.value.as_str())
    }

    /// Whether any claim has this name
    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|c| c.name == name)
    }

    /// Whether a claim with this exact name and value exists
    pub fn has(&self, name: &str, value: &str) -> bool {
        self.0.iter().any(|c| c.name == name && c.value == value)
    }

    /// `sub` claim, if present
    pub fn subject(&self) -> Option<&str> {
        self.first("sub")
    }

    /// `exp` claim as seconds since the Unix epoch
    pub fn expires_at(&self) -> Option<u64> {
        self.first("exp").and_then(parse_numeric_date)
    }

    /// Iterate all claims in order
    pub fn iter(&self) -> std::slice::Iter<'_, Claim> {
        self.0.iter()
    }

    /// Number of claims
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no claims
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Parse a NumericDate (RFC 7519 §2). Fractional seconds are truncated.
pub(crate) fn parse_numeric_date(raw: &str) -> Option<u64> {
    if let Ok(secs) = raw.parse::<u64>() {
        return Some(secs);
    }
    raw.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite() && *f >= 0.0)
        .map(|f| f as u64)
}

impl<'a> IntoIterator for &'a Claims {
    type Item = &'a Claim;
    type IntoIter = std::slice::Iter<'a, Claim>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<Claim> for Claims {
    fn from_iter<T: IntoIterator<Item = Claim>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_arrays_become_repeated_claims() {
        let claims = Claims::from_json(&object(json!({
            "sub": "alice",
            "role": ["admin", "user"],
        })));

        let roles: Vec<_> = claims.values("role").collect();
        assert_eq!(roles, vec!["admin", "user"]);
        assert_eq!(claims.subject(), Some("alice"));
        assert_eq!(claims.len(), 3);
    }

    #[test]
    fn test_scalar_rendering() {
        let claims = Claims::from_json(&object(json!({
            "exp": 1_700_000_000u64,
            "email_verified": true,
            "nothing": null,
            "cnf": {"jkt": "abc"},
        })));

        assert_eq!(claims.first("exp"), Some("1700000000"));
        assert_eq!(claims.expires_at(), Some(1_700_000_000));
        assert_eq!(claims.first("email_verified"), Some("true"));
        assert!(!claims.contains("nothing"));
        assert_eq!(claims.first("cnf"), Some(r#"{"jkt":"abc"}"#));
    }

    #[test]
    fn test_order_is_preserved() {
        let claims = Claims::from_json(&object(json!({
            "iss": "https://auth.example.com",
            "sub": "alice",
            "aud": "api",
        })));

        let names: Vec<_> = claims.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["iss", "sub", "aud"]);
    }

    #[test]
    fn test_fractional_numeric_date() {
        assert_eq!(parse_numeric_date("1700000000.75"), Some(1_700_000_000));
        assert_eq!(parse_numeric_date("-5"), None);
        assert_eq!(parse_numeric_date("soon"), None);
    }
}
