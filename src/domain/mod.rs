//! Domain values shared by every layer.
//!
//! # Invariants
//! - Entity identities are assigned once, at construction, and never change.
//! - `Contact::new`/`Group::new` validate their details; values restored
//!   from storage are trusted as-is.

pub mod contact;
pub mod group;
pub mod query;

pub use contact::{Contact, ContactDetails};
pub use group::{Group, GroupDetails};
pub use query::{ContactFilter, Direction, Pagination, QueryError, QueryParameter, Sort, Sorts};

/// Field-level validation failure for contacts and groups.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Required { field: &'static str },

    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },

    #[error("phone_number must be an optional '+' followed by 3 to 50 digits")]
    PhoneNumber,

    #[error("email is not a valid address")]
    Email,

    #[error("age must be at most {max}")]
    Age { max: u8 },
}

pub(crate) fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required { field });
    }
    Ok(())
}

pub(crate) fn max_chars(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(())
}
