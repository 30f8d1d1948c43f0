//! Context set naming rules and the external `context:` prefix.

use crate::error::{Result, SetError};

/// Prefix of a context set's canonical external name.
pub const PREFIX: &str = "context:";

/// Remove every leading [`PREFIX`] from a name.
pub fn strip_prefix(name: &str) -> &str {
    let mut name = name;
    while let Some(rest) = name.strip_prefix(PREFIX) {
        name = rest;
    }
    name
}

/// Canonical external name: exactly one [`PREFIX`] in front of the bare name.
pub fn prefixed(name: &str) -> String {
    format!("{PREFIX}{}", strip_prefix(name))
}

/// Check a bare set name against the naming rules.
///
/// Names are non-empty, start with an alphabetic character and contain no
/// whitespace.
pub fn validate(name: &str) -> Result<()> {
    let invalid = |reason| SetError::InvalidName {
        name: name.to_string(),
        reason,
    };

    let Some(first) = name.chars().next() else {
        return Err(invalid("name is empty"));
    };
    if !first.is_alphabetic() {
        return Err(invalid("name must start with a letter"));
    }
    if name.chars().any(char::is_whitespace) {
        return Err(invalid("name must not contain whitespace"));
    }
    Ok(())
}
