use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::{max_chars, require, ValidationError};

pub const NAME_MAX: usize = 100;
pub const DESCRIPTION_MAX: usize = 1000;

/// Editable attributes of a group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GroupDetails {
    pub name: String,
    pub description: String,
}

impl GroupDetails {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require("name", &self.name)?;
        max_chars("name", &self.name, NAME_MAX)?;
        max_chars("description", &self.description, DESCRIPTION_MAX)?;
        Ok(())
    }
}

/// A named set of contacts.
///
/// `contact_count` is maintained by the repository alongside membership
/// rows; callers can read it but never set it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Group {
    id: Uuid,
    created_at: DateTime<Utc>,
    modified_at: DateTime<Utc>,
    #[serde(flatten)]
    details: GroupDetails,
    contact_count: u64,
}

impl Group {
    pub const SORT_COLUMNS: &'static [&'static str] =
        &["created_at", "modified_at", "name", "contact_count"];

    pub fn new(details: GroupDetails) -> Result<Self, ValidationError> {
        Self::with_id(Uuid::new_v4(), details)
    }

    pub fn with_id(id: Uuid, details: GroupDetails) -> Result<Self, ValidationError> {
        details.validate()?;
        let now = Utc::now();
        Ok(Self {
            id,
            created_at: now,
            modified_at: now,
            details,
            contact_count: 0,
        })
    }

    pub fn restore(
        id: Uuid,
        created_at: DateTime<Utc>,
        modified_at: DateTime<Utc>,
        details: GroupDetails,
        contact_count: u64,
    ) -> Self {
        Self {
            id,
            created_at,
            modified_at,
            details,
            contact_count,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn modified_at(&self) -> DateTime<Utc> {
        self.modified_at
    }

    pub fn details(&self) -> &GroupDetails {
        &self.details
    }

    pub fn contact_count(&self) -> u64 {
        self.contact_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_group_starts_empty() {
        let group = Group::new(GroupDetails {
            name: "friends".to_string(),
            description: String::new(),
        })
        .unwrap();
        assert_eq!(group.contact_count(), 0);
    }

    #[test]
    fn description_length_is_bounded() {
        let details = GroupDetails {
            name: "friends".to_string(),
            description: "d".repeat(DESCRIPTION_MAX + 1),
        };
        assert_eq!(
            details.validate(),
            Err(ValidationError::TooLong {
                field: "description",
                max: DESCRIPTION_MAX
            })
        );
    }

    #[test]
    fn blank_name_is_rejected() {
        let details = GroupDetails::default();
        assert_eq!(
            Group::new(details),
            Err(ValidationError::Required { field: "name" })
        );
    }
}
