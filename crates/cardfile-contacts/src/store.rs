//! Contact-store capability and in-memory implementation.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{NaiveDate, Utc};
use thiserror::Error;

use cardfile_core::{AccountId, ContactId};

use crate::contact::{Contact, ContactDraft, SearchFilter, birthday_in_window};

/// Length of the upcoming-birthday window in days.
const BIRTHDAY_WINDOW_DAYS: u64 = 7;

/// Contact-store failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContactError {
    /// Infrastructure failure; fatal to the request, not the process.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Persistence capability for contact records.
///
/// Every method takes the owning account; records belonging to other
/// accounts are invisible, and a foreign id behaves exactly like a missing
/// one.
pub trait ContactStore: Send + Sync {
    /// Page through the owner's contacts in id order.
    ///
    /// # Errors
    ///
    /// Returns `ContactError::Unavailable` on infrastructure failure.
    fn list(
        &self,
        owner: AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Contact>, ContactError>;

    /// Fetch one contact by id.
    ///
    /// # Errors
    ///
    /// Returns `ContactError::Unavailable` on infrastructure failure.
    fn get(&self, owner: AccountId, id: ContactId) -> Result<Option<Contact>, ContactError>;

    /// Create a contact for the owner, assigning id and timestamps.
    ///
    /// # Errors
    ///
    /// Returns `ContactError::Unavailable` on infrastructure failure.
    fn create(&self, owner: AccountId, draft: ContactDraft) -> Result<Contact, ContactError>;

    /// Replace a contact's fields; `None` if the id does not resolve for
    /// this owner.
    ///
    /// # Errors
    ///
    /// Returns `ContactError::Unavailable` on infrastructure failure.
    fn update(
        &self,
        owner: AccountId,
        id: ContactId,
        draft: ContactDraft,
    ) -> Result<Option<Contact>, ContactError>;

    /// Delete a contact; returns the removed record, `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns `ContactError::Unavailable` on infrastructure failure.
    fn remove(&self, owner: AccountId, id: ContactId) -> Result<Option<Contact>, ContactError>;

    /// Contacts satisfying every present filter field.
    ///
    /// # Errors
    ///
    /// Returns `ContactError::Unavailable` on infrastructure failure.
    fn search(
        &self,
        owner: AccountId,
        filter: &SearchFilter,
    ) -> Result<Vec<Contact>, ContactError>;

    /// Contacts whose birthday falls within the next seven days of `today`.
    ///
    /// # Errors
    ///
    /// Returns `ContactError::Unavailable` on infrastructure failure.
    fn upcoming_birthdays(
        &self,
        owner: AccountId,
        today: NaiveDate,
    ) -> Result<Vec<Contact>, ContactError>;
}

/// In-memory contact store.
#[derive(Debug, Default)]
pub struct MemoryContactStore {
    contacts: RwLock<HashMap<ContactId, Contact>>,
    next_id: AtomicU64,
}

impl MemoryContactStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn owned_sorted(&self, owner: AccountId) -> Result<Vec<Contact>, ContactError> {
        let contacts = self
            .contacts
            .read()
            .map_err(|_| ContactError::Unavailable("contact map lock poisoned".into()))?;
        let mut owned: Vec<Contact> = contacts
            .values()
            .filter(|c| c.account_id == owner)
            .cloned()
            .collect();
        owned.sort_by_key(|c| c.id);
        Ok(owned)
    }
}

impl ContactStore for MemoryContactStore {
    fn list(
        &self,
        owner: AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Contact>, ContactError> {
        Ok(self
            .owned_sorted(owner)?
            .into_iter()
            .skip(offset)
            .take(limit)
            .collect())
    }

    fn get(&self, owner: AccountId, id: ContactId) -> Result<Option<Contact>, ContactError> {
        let contacts = self
            .contacts
            .read()
            .map_err(|_| ContactError::Unavailable("contact map lock poisoned".into()))?;
        Ok(contacts
            .get(&id)
            .filter(|c| c.account_id == owner)
            .cloned())
    }

    fn create(&self, owner: AccountId, draft: ContactDraft) -> Result<Contact, ContactError> {
        let mut contacts = self
            .contacts
            .write()
            .map_err(|_| ContactError::Unavailable("contact map lock poisoned".into()))?;

        let id = ContactId::new(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let now = Utc::now();
        let contact = Contact {
            id,
            account_id: owner,
            first_name: draft.first_name,
            last_name: draft.last_name,
            email: draft.email,
            phone_number: draft.phone_number,
            birthday: draft.birthday,
            description: draft.description,
            created_at: now,
            updated_at: now,
        };

        contacts.insert(id, contact.clone());
        Ok(contact)
    }

    fn update(
        &self,
        owner: AccountId,
        id: ContactId,
        draft: ContactDraft,
    ) -> Result<Option<Contact>, ContactError> {
        let mut contacts = self
            .contacts
            .write()
            .map_err(|_| ContactError::Unavailable("contact map lock poisoned".into()))?;

        let Some(contact) = contacts.get_mut(&id).filter(|c| c.account_id == owner) else {
            return Ok(None);
        };

        contact.first_name = draft.first_name;
        contact.last_name = draft.last_name;
        contact.email = draft.email;
        contact.phone_number = draft.phone_number;
        contact.birthday = draft.birthday;
        contact.description = draft.description;
        contact.updated_at = Utc::now();

        Ok(Some(contact.clone()))
    }

    fn remove(&self, owner: AccountId, id: ContactId) -> Result<Option<Contact>, ContactError> {
        let mut contacts = self
            .contacts
            .write()
            .map_err(|_| ContactError::Unavailable("contact map lock poisoned".into()))?;

        if contacts.get(&id).is_none_or(|c| c.account_id != owner) {
            return Ok(None);
        }
        Ok(contacts.remove(&id))
    }

    fn search(
        &self,
        owner: AccountId,
        filter: &SearchFilter,
    ) -> Result<Vec<Contact>, ContactError> {
        if filter.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .owned_sorted(owner)?
            .into_iter()
            .filter(|c| filter.matches(c))
            .collect())
    }

    fn upcoming_birthdays(
        &self,
        owner: AccountId,
        today: NaiveDate,
    ) -> Result<Vec<Contact>, ContactError> {
        Ok(self
            .owned_sorted(owner)?
            .into_iter()
            .filter(|c| birthday_in_window(c.birthday, today, BIRTHDAY_WINDOW_DAYS))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const ALICE: AccountId = AccountId::new(1);
    const BOB: AccountId = AccountId::new(2);

    fn draft(first: &str, last: &str, birthday: NaiveDate) -> ContactDraft {
        ContactDraft {
            first_name: first.to_string(),
            last_name: last.to_string(),
            email: format!("{}@example.com", first.to_lowercase()),
            phone_number: "+1 555 0100".to_string(),
            birthday,
            description: "from the club".to_string(),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn create_then_get() {
        let store = MemoryContactStore::new();
        let created = store
            .create(ALICE, draft("Carol", "Jones", date(1990, 6, 15)))
            .unwrap();

        let found = store.get(ALICE, created.id).unwrap().unwrap();
        assert_eq!(found, created);
    }

    #[test]
    fn records_are_invisible_across_accounts() {
        let store = MemoryContactStore::new();
        let created = store
            .create(ALICE, draft("Carol", "Jones", date(1990, 6, 15)))
            .unwrap();

        assert!(store.get(BOB, created.id).unwrap().is_none());
        assert!(store
            .update(BOB, created.id, draft("Mallory", "X", date(1990, 6, 15)))
            .unwrap()
            .is_none());
        assert!(store.remove(BOB, created.id).unwrap().is_none());

        // The record is untouched.
        let found = store.get(ALICE, created.id).unwrap().unwrap();
        assert_eq!(found.first_name, "Carol");
    }

    #[test]
    fn list_pages_in_id_order() {
        let store = MemoryContactStore::new();
        for i in 0..5 {
            store
                .create(ALICE, draft(&format!("C{i}"), "X", date(1990, 1, 1)))
                .unwrap();
        }
        store.create(BOB, draft("Other", "Y", date(1990, 1, 1))).unwrap();

        let page = store.list(ALICE, 2, 1).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].first_name, "C1");
        assert_eq!(page[1].first_name, "C2");
    }

    #[test]
    fn update_replaces_fields_and_bumps_timestamp() {
        let store = MemoryContactStore::new();
        let created = store
            .create(ALICE, draft("Carol", "Jones", date(1990, 6, 15)))
            .unwrap();

        let updated = store
            .update(ALICE, created.id, draft("Caroline", "Jones", date(1990, 6, 15)))
            .unwrap()
            .unwrap();
        assert_eq!(updated.first_name, "Caroline");
        assert!(updated.updated_at >= created.updated_at);
        assert_eq!(updated.created_at, created.created_at);
    }

    #[test]
    fn remove_returns_the_record_once() {
        let store = MemoryContactStore::new();
        let created = store
            .create(ALICE, draft("Carol", "Jones", date(1990, 6, 15)))
            .unwrap();

        assert!(store.remove(ALICE, created.id).unwrap().is_some());
        assert!(store.remove(ALICE, created.id).unwrap().is_none());
    }

    #[test]
    fn search_combines_present_fields() {
        let store = MemoryContactStore::new();
        store.create(ALICE, draft("Carol", "Jones", date(1990, 6, 15))).unwrap();
        store.create(ALICE, draft("Carol", "Smith", date(1991, 2, 1))).unwrap();
        store.create(ALICE, draft("Dave", "Jones", date(1992, 3, 2))).unwrap();

        let filter = SearchFilter {
            first_name: Some("carol".to_string()),
            last_name: Some("jones".to_string()),
            email: None,
        };
        let hits = store.search(ALICE, &filter).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].last_name, "Jones");

        // An empty filter matches nothing rather than everything.
        assert!(store.search(ALICE, &SearchFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn upcoming_birthdays_scoped_and_windowed() {
        let store = MemoryContactStore::new();
        let today = date(2026, 6, 10);

        store.create(ALICE, draft("Soon", "A", date(1990, 6, 12))).unwrap();
        store.create(ALICE, draft("Later", "B", date(1990, 7, 20))).unwrap();
        store.create(BOB, draft("Foreign", "C", date(1990, 6, 12))).unwrap();

        let hits = store.upcoming_birthdays(ALICE, today).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].first_name, "Soon");
    }
}
