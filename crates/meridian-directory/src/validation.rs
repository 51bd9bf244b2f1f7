//! Structural validation of organization claims.
//!
//! Runs before any collaborator is consulted. A claim that fails here is
//! rejected outright; it is never an error, since any participant can
//! broadcast garbage.

use crate::types::OrganizationClaim;

/// Longest accepted identity reference, in characters
pub const MAX_IDENTITY_LEN: usize = 1024;

/// Longest accepted description, in characters
pub const MAX_DESCRIPTION_LEN: usize = 4096;

/// Longest accepted display name, in characters
pub const MAX_NAME_LEN: usize = 64;

/// Why a claim failed structural validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClaimValidationError {
    /// A required field is empty
    #[error("field '{field}' is required")]
    MissingField {
        /// Field name
        field: &'static str,
    },

    /// A field is longer than allowed
    #[error("field '{field}' is {actual} characters, limit is {max}")]
    TooLong {
        /// Field name
        field: &'static str,
        /// Limit
        max: usize,
        /// Observed length
        actual: usize,
    },

    /// An identity reference contains whitespace or control characters
    #[error("field '{field}' contains whitespace or control characters")]
    InvalidCharacters {
        /// Field name
        field: &'static str,
    },

    /// A name does not follow the network naming rule
    #[error("field '{field}' value '{value}' must be alphanumeric with '.', '_' or '-' inside")]
    InvalidName {
        /// Field name
        field: &'static str,
        /// Offending value
        value: String,
    },

    /// An organization names itself as its parent
    #[error("organization '{identity}' cannot be its own parent")]
    SelfParent {
        /// Offending identity
        identity: String,
    },
}

impl OrganizationClaim {
    /// Check required fields and formats.
    pub fn validate(&self) -> Result<(), ClaimValidationError> {
        validate_identity_field("identity", &self.identity)?;

        if let Some(parent) = self.parent() {
            validate_identity_field("parent", parent)?;
            if parent == self.identity {
                return Err(ClaimValidationError::SelfParent {
                    identity: self.identity.clone(),
                });
            }
        }

        validate_name_field("name", &self.name)?;
        validate_length("description", &self.description, MAX_DESCRIPTION_LEN)?;
        Ok(())
    }
}

fn validate_identity_field(field: &'static str, value: &str) -> Result<(), ClaimValidationError> {
    if value.is_empty() {
        return Err(ClaimValidationError::MissingField { field });
    }
    validate_length(field, value, MAX_IDENTITY_LEN)?;
    if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ClaimValidationError::InvalidCharacters { field });
    }
    Ok(())
}

fn validate_length(
    field: &'static str,
    value: &str,
    max: usize,
) -> Result<(), ClaimValidationError> {
    let actual = value.chars().count();
    if actual > max {
        return Err(ClaimValidationError::TooLong { field, max, actual });
    }
    Ok(())
}

/// Names are 1-64 ASCII alphanumerics, with `.`, `_` and `-` allowed
/// anywhere except the first and last position.
fn validate_name_field(field: &'static str, value: &str) -> Result<(), ClaimValidationError> {
    if value.is_empty() {
        return Err(ClaimValidationError::MissingField { field });
    }
    validate_length(field, value, MAX_NAME_LEN)?;

    let bytes = value.as_bytes();
    let edges_ok = bytes
        .first()
        .zip(bytes.last())
        .is_some_and(|(first, last)| first.is_ascii_alphanumeric() && last.is_ascii_alphanumeric());
    let body_ok = bytes
        .iter()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'));

    if edges_ok && body_ok {
        Ok(())
    } else {
        Err(ClaimValidationError::InvalidName {
            field,
            value: value.to_owned(),
        })
    }
}
