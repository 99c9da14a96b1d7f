//! Validated SQL identifiers and namespace name generation.

use std::fmt;

use serde::Serialize;
use uuid::Uuid;

use crate::error::IdentError;

/// Longest identifier MySQL accepts for databases, tables, columns and
/// constraints.
pub const MAX_IDENT_LEN: usize = 64;

/// A table, column, constraint or namespace name that is safe to quote.
///
/// Construction rejects names the engine cannot store; quoting escapes the
/// rest, so an `Ident` can always be interpolated into a statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Ident(String);

impl Ident {
    /// Validates and wraps a name.
    pub fn new(name: impl Into<String>) -> Result<Self, IdentError> {
        let name = name.into();
        if name.is_empty() {
            return Err(IdentError::Empty);
        }
        if name.chars().count() > MAX_IDENT_LEN {
            return Err(IdentError::TooLong {
                ident: name,
                max: MAX_IDENT_LEN,
            });
        }
        if let Some(ch) = name.chars().find(|c| *c == '\0' || c.is_control()) {
            return Err(IdentError::InvalidCharacter { ident: name, ch });
        }
        if name.ends_with(char::is_whitespace) {
            return Err(IdentError::TrailingWhitespace { ident: name });
        }
        Ok(Self(name))
    }

    /// Returns the raw name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the name quoted with backticks, doubling embedded backticks.
    pub fn quoted(&self) -> String {
        format!("`{}`", self.0.replace('`', "``"))
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Ident {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for Ident {
    type Error = IdentError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Ident::new(value)
    }
}

impl TryFrom<String> for Ident {
    type Error = IdentError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Ident::new(value)
    }
}

/// Generates a fresh namespace name of the form `{prefix}_{tag}_{uuid}` (or
/// `{prefix}_{uuid}` when `tag` is empty).
pub fn unique_namespace(prefix: &str, tag: &str) -> Result<Ident, IdentError> {
    let id = Uuid::new_v4().simple();
    if tag.is_empty() {
        Ident::new(format!("{prefix}_{id}"))
    } else {
        Ident::new(format!("{prefix}_{tag}_{id}"))
    }
}
