//! Contact model and query helpers.

use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use cardfile_core::{AccountId, ContactId};

/// A contact record as persisted by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// Store-assigned id.
    pub id: ContactId,
    /// Owning account.
    pub account_id: AccountId,
    /// First name.
    pub first_name: String,
    /// Last name.
    pub last_name: String,
    /// Contact email.
    pub email: String,
    /// Phone number.
    pub phone_number: String,
    /// Date of birth.
    pub birthday: NaiveDate,
    /// Free-form notes.
    pub description: String,
    /// Set once at creation.
    pub created_at: DateTime<Utc>,
    /// Bumped on every update.
    pub updated_at: DateTime<Utc>,
}

/// Fields of a contact as supplied by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactDraft {
    /// First name.
    pub first_name: String,
    /// Last name.
    pub last_name: String,
    /// Contact email.
    pub email: String,
    /// Phone number.
    pub phone_number: String,
    /// Date of birth.
    pub birthday: NaiveDate,
    /// Free-form notes.
    pub description: String,
}

/// Optional equality filters for the search operation.
///
/// Name and email comparisons are case-insensitive; absent fields do not
/// constrain the result.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchFilter {
    /// Match on first name.
    pub first_name: Option<String>,
    /// Match on last name.
    pub last_name: Option<String>,
    /// Match on email.
    pub email: Option<String>,
}

impl SearchFilter {
    /// Whether no field is set, i.e. the filter matches nothing useful.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.first_name.is_none() && self.last_name.is_none() && self.email.is_none()
    }

    /// Whether a contact satisfies every present field.
    #[must_use]
    pub fn matches(&self, contact: &Contact) -> bool {
        let field_matches = |filter: &Option<String>, value: &str| {
            filter
                .as_deref()
                .is_none_or(|f| f.eq_ignore_ascii_case(value))
        };

        field_matches(&self.first_name, &contact.first_name)
            && field_matches(&self.last_name, &contact.last_name)
            && field_matches(&self.email, &contact.email)
    }
}

/// Whether a birthday falls within the `days`-day window starting at
/// `today`, by calendar month and day.
///
/// The comparison ignores the birth year. A Feb 29 birthday counts on
/// Feb 28 when the window's year has no leap day.
#[must_use]
pub fn birthday_in_window(birthday: NaiveDate, today: NaiveDate, days: u64) -> bool {
    (0..days).any(|offset| {
        let Some(day) = today.checked_add_days(Days::new(offset)) else {
            return false;
        };
        if (day.month(), day.day()) == (birthday.month(), birthday.day()) {
            return true;
        }
        // Feb 29 birthdays celebrate on Feb 28 in non-leap years.
        day.month() == 2
            && day.day() == 28
            && birthday.month() == 2
            && birthday.day() == 29
            && !day.leap_year()
    })
}
