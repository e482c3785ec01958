//! Context for field encryption, used for key derivation and domain separation.

use std::fmt;

/// Identifies where an encrypted value lives.
///
/// The context ensures that:
/// - Different fields produce different ciphertexts under the same key
/// - A ciphertext copied into another field fails authentication
///
/// # Example
///
/// ```
/// use rotakey::context::FieldContext;
///
/// let ctx = FieldContext::new("magicWord").with_scope("rolodex");
/// assert_eq!(ctx.to_string(), "rolodex|magicWord");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldContext {
    scope: Option<String>,
    field_name: String,
}

impl FieldContext {
    /// Creates a context for `field_name` in the default scope.
    #[must_use]
    pub fn new(field_name: impl Into<String>) -> Self {
        Self { scope: None, field_name: field_name.into() }
    }

    /// Sets the scope, e.g. a collection or tenant name.
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Returns the scope, if set.
    #[must_use]
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    /// Returns the field name.
    #[must_use]
    pub fn field_name(&self) -> &str {
        &self.field_name
    }
}

impl fmt::Display for FieldContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.scope.as_deref().unwrap_or("default"), self.field_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_context_display() {
        let ctx = FieldContext::new("magicWord").with_scope("rolodex");
        assert_eq!(ctx.to_string(), "rolodex|magicWord");
    }

    #[test]
    fn test_field_context_display_no_scope() {
        let ctx = FieldContext::new("magicWord");
        assert_eq!(ctx.to_string(), "default|magicWord");
        assert_eq!(ctx.scope(), None);
        assert_eq!(ctx.field_name(), "magicWord");
    }
}
