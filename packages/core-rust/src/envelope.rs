//! The call envelope and the `"Service.Method"` identifier it carries.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// The unit of transfer across the transport boundary: one method call.
///
/// Serialized as a named `MsgPack` map with keys `method` and `args`, so
/// argument lists of mixed dynamic types can be carried without a schema.
/// `args` is positional; each element is a self-describing `rmpv::Value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Full method identifier, always of the form `"<Service>.<Method>"`.
    pub method: String,
    /// Ordered, dynamically-typed positional arguments.
    pub args: Vec<rmpv::Value>,
}

impl Envelope {
    /// Builds an envelope for the given method identifier and arguments.
    #[must_use]
    pub fn new(method: impl Into<String>, args: Vec<rmpv::Value>) -> Self {
        Self {
            method: method.into(),
            args,
        }
    }
}

// ---------------------------------------------------------------------------
// MethodId
// ---------------------------------------------------------------------------

/// Error for a method identifier that cannot be split into service and method.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("service/method request ill-formed: {id:?}")]
pub struct MalformedIdentifier {
    /// The identifier as received.
    pub id: String,
}

/// Borrowed view of a parsed `"Service.Method"` identifier.
///
/// The split is on the *last* dot, so a malformed registration could in
/// principle smuggle dots into a service name. Registration rejects dotted
/// names outright (see `hostlink-bridge`), which makes the split unambiguous.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodId<'a> {
    /// Service name (everything before the last dot).
    pub service: &'a str,
    /// Method name (everything after the last dot).
    pub method: &'a str,
}

impl<'a> MethodId<'a> {
    /// Splits `id` on its last dot.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedIdentifier`] when there is no dot, or when either
    /// half is empty.
    pub fn parse(id: &'a str) -> Result<Self, MalformedIdentifier> {
        match id.rsplit_once('.') {
            Some((service, method)) if !service.is_empty() && !method.is_empty() => {
                Ok(Self { service, method })
            }
            _ => Err(MalformedIdentifier { id: id.to_string() }),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_service_and_method() {
        let id = MethodId::parse("Math.Add").unwrap();
        assert_eq!(id.service, "Math");
        assert_eq!(id.method, "Add");
    }

    #[test]
    fn parse_splits_on_last_dot() {
        // Dotted service names are rejected at registration time, but the
        // split itself is well-defined: the last dot wins.
        let id = MethodId::parse("a.b.C").unwrap();
        assert_eq!(id.service, "a.b");
        assert_eq!(id.method, "C");
    }

    #[test]
    fn parse_rejects_missing_dot() {
        let err = MethodId::parse("NoDotHere").unwrap_err();
        assert_eq!(err.id, "NoDotHere");
    }

    #[test]
    fn parse_rejects_empty_halves() {
        assert!(MethodId::parse(".Method").is_err());
        assert!(MethodId::parse("Service.").is_err());
        assert!(MethodId::parse(".").is_err());
        assert!(MethodId::parse("").is_err());
    }

    #[test]
    fn envelope_serializes_with_wire_keys() {
        let envelope = Envelope::new("Math.Add", vec![rmpv::Value::from(2), rmpv::Value::from(3)]);
        let bytes = rmp_serde::to_vec_named(&envelope).unwrap();
        let value: rmpv::Value = rmp_serde::from_slice(&bytes).unwrap();
        let map = value.as_map().expect("envelope should be a MsgPack map");

        let keys: Vec<&str> = map.iter().filter_map(|(k, _)| k.as_str()).collect();
        assert!(keys.contains(&"method"), "expected 'method' key, got: {keys:?}");
        assert!(keys.contains(&"args"), "expected 'args' key, got: {keys:?}");
    }
}
