use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::{max_chars, require, ValidationError};

pub const PHONE_DIGITS_MIN: usize = 3;
pub const PHONE_DIGITS_MAX: usize = 50;
pub const EMAIL_MAX: usize = 250;
pub const NAME_MAX: usize = 50;
pub const SURNAME_MAX: usize = 100;
pub const PATRONYMIC_MAX: usize = 100;
pub const AGE_MAX: u8 = 200;

/// Editable attributes of a contact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContactDetails {
    pub phone_number: String,
    pub email: Option<String>,
    pub name: String,
    pub surname: String,
    pub patronymic: String,
    pub age: u8,
}

impl ContactDetails {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_phone_number(&self.phone_number)?;
        if let Some(email) = self.email.as_deref() {
            validate_email(email)?;
        }
        require("name", &self.name)?;
        max_chars("name", &self.name, NAME_MAX)?;
        max_chars("surname", &self.surname, SURNAME_MAX)?;
        max_chars("patronymic", &self.patronymic, PATRONYMIC_MAX)?;
        if self.age > AGE_MAX {
            return Err(ValidationError::Age { max: AGE_MAX });
        }
        Ok(())
    }
}

/// A person record. The identity is fixed once assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Contact {
    id: Uuid,
    created_at: DateTime<Utc>,
    modified_at: DateTime<Utc>,
    #[serde(flatten)]
    details: ContactDetails,
}

impl Contact {
    /// Columns a contact listing may be ordered by.
    pub const SORT_COLUMNS: &'static [&'static str] = &[
        "created_at",
        "modified_at",
        "phone_number",
        "email",
        "name",
        "surname",
        "patronymic",
        "age",
    ];

    /// Validates `details` and assigns a fresh identity.
    pub fn new(details: ContactDetails) -> Result<Self, ValidationError> {
        Self::with_id(Uuid::new_v4(), details)
    }

    /// Validates `details` for an existing identity, e.g. a full update.
    pub fn with_id(id: Uuid, details: ContactDetails) -> Result<Self, ValidationError> {
        details.validate()?;
        let now = Utc::now();
        Ok(Self {
            id,
            created_at: now,
            modified_at: now,
            details,
        })
    }

    /// Rebuilds a contact from persisted state without validation.
    pub fn restore(
        id: Uuid,
        created_at: DateTime<Utc>,
        modified_at: DateTime<Utc>,
        details: ContactDetails,
    ) -> Self {
        Self {
            id,
            created_at,
            modified_at,
            details,
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

    pub fn details(&self) -> &ContactDetails {
        &self.details
    }

    pub fn phone_number(&self) -> &str {
        &self.details.phone_number
    }
}

fn validate_phone_number(value: &str) -> Result<(), ValidationError> {
    require("phone_number", value)?;
    let digits = value.strip_prefix('+').unwrap_or(value);
    let len = digits.len();
    if !digits.bytes().all(|b| b.is_ascii_digit())
        || !(PHONE_DIGITS_MIN..=PHONE_DIGITS_MAX).contains(&len)
    {
        return Err(ValidationError::PhoneNumber);
    }
    Ok(())
}

fn validate_email(value: &str) -> Result<(), ValidationError> {
    max_chars("email", value, EMAIL_MAX)?;
    match value.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => {
            Ok(())
        }
        _ => Err(ValidationError::Email),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details() -> ContactDetails {
        ContactDetails {
            phone_number: "+77001234567".to_string(),
            email: Some("ivan@example.com".to_string()),
            name: "Ivan".to_string(),
            surname: "Petrov".to_string(),
            patronymic: String::new(),
            age: 30,
        }
    }

    #[test]
    fn new_contact_gets_fresh_identity() {
        let a = Contact::new(details()).unwrap();
        let b = Contact::new(details()).unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.created_at(), a.modified_at());
    }

    #[test]
    fn phone_number_accepts_plus_prefix_and_rejects_letters() {
        assert!(validate_phone_number("+123").is_ok());
        assert!(validate_phone_number("123").is_ok());
        assert_eq!(validate_phone_number("12"), Err(ValidationError::PhoneNumber));
        assert_eq!(validate_phone_number("12a45"), Err(ValidationError::PhoneNumber));
        assert_eq!(validate_phone_number("++123"), Err(ValidationError::PhoneNumber));
        assert_eq!(
            validate_phone_number(""),
            Err(ValidationError::Required {
                field: "phone_number"
            })
        );
    }

    #[test]
    fn email_needs_single_at_with_both_parts() {
        assert!(validate_email("a@b").is_ok());
        assert_eq!(validate_email("@b"), Err(ValidationError::Email));
        assert_eq!(validate_email("a@"), Err(ValidationError::Email));
        assert_eq!(validate_email("a@b@c"), Err(ValidationError::Email));
        assert_eq!(validate_email("plain"), Err(ValidationError::Email));
    }

    #[test]
    fn name_is_required_and_bounded() {
        let mut d = details();
        d.name = "  ".to_string();
        assert_eq!(d.validate(), Err(ValidationError::Required { field: "name" }));

        d.name = "x".repeat(NAME_MAX + 1);
        assert_eq!(
            d.validate(),
            Err(ValidationError::TooLong {
                field: "name",
                max: NAME_MAX
            })
        );
    }

    #[test]
    fn age_above_limit_is_rejected() {
        let mut d = details();
        d.age = AGE_MAX + 1;
        assert_eq!(Contact::new(d), Err(ValidationError::Age { max: AGE_MAX }));
    }

    #[test]
    fn serialized_contact_is_flat() {
        let contact = Contact::new(details()).unwrap();
        let value = serde_json::to_value(&contact).unwrap();
        assert_eq!(value["phone_number"], "+77001234567");
        assert_eq!(value["id"], contact.id().to_string());
    }
}
