//! Value objects and enum-like interned strings.

use std::fmt;

use serde_json::{Map, Value};

use crate::error::SerializationError;

/// A nested immutable attribute carrier with declared typed fields.
///
/// Value objects nest inside events and inside each other; equality is
/// structural. Validation support never appears in the serialized form,
/// so `to_attributes` must emit declared fields only.
pub trait ValueObject: Sized + PartialEq + std::fmt::Debug {
    /// Serializes the declared fields to a JSON object.
    fn to_attributes(&self) -> Map<String, Value>;

    /// Reconstructs an instance by coercing each declared field from the
    /// given JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`SerializationError`] when a field fails coercion.
    fn from_attributes(attributes: &Map<String, Value>) -> Result<Self, SerializationError>;
}

/// An enum-like interned string.
///
/// Serializes as its plain string form and deserializes back to an equal
/// value, so symbols survive a round trip through the event log.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(String);

impl Symbol {
    /// Creates a symbol from its string form.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Symbol {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Symbol {
    fn from(name: String) -> Self {
        Self(name)
    }
}
