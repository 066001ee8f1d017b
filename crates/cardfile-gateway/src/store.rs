//! Sled-backed credential and contact stores.
//!
//! Accounts live in one tree keyed by big-endian id, with an `idx:email:`
//! secondary index. Email uniqueness is claimed with a compare-and-swap on
//! the index key, so concurrent signups with the same email admit exactly
//! one winner. Contacts live in a second tree keyed by owner id + contact
//! id, which makes every per-owner query a prefix scan.

use std::path::Path;

use chrono::{NaiveDate, Utc};

use cardfile_auth::{Account, CredentialStore, NewAccount, StoreError};
use cardfile_contacts::{
    Contact, ContactDraft, ContactError, ContactStore, SearchFilter, birthday_in_window,
};
use cardfile_core::{AccountId, ContactId};

/// Length of the upcoming-birthday window in days.
const BIRTHDAY_WINDOW_DAYS: u64 = 7;

fn account_key(id: AccountId) -> [u8; 8] {
    id.as_u64().to_be_bytes()
}

fn email_index_key(email: &str) -> String {
    format!("idx:email:{email}")
}

fn contact_key(owner: AccountId, id: ContactId) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&owner.as_u64().to_be_bytes());
    key[8..].copy_from_slice(&id.as_u64().to_be_bytes());
    key
}

/// Credential store backed by sled.
pub struct SledAccountStore {
    db: sled::Db,
    tree: sled::Tree,
}

impl SledAccountStore {
    /// Open or create the account tree under the given data directory.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unavailable` if the database cannot be opened.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let db = sled::open(path.join("cardfile"))
            .map_err(|e| StoreError::Unavailable(format!("failed to open database: {e}")))?;
        Self::with_db(&db)
    }

    /// Open the account tree on an existing sled database.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unavailable` if the tree cannot be opened.
    pub fn with_db(db: &sled::Db) -> Result<Self, StoreError> {
        let tree = db
            .open_tree("accounts")
            .map_err(|e| StoreError::Unavailable(format!("failed to open accounts tree: {e}")))?;
        Ok(Self {
            db: db.clone(),
            tree,
        })
    }

    fn get_by_id(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        match self.tree.get(account_key(id)) {
            Ok(Some(value)) => {
                let account: Account = serde_json::from_slice(&value)
                    .map_err(|e| StoreError::Unavailable(format!("deserialization error: {e}")))?;
                Ok(Some(account))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(StoreError::Unavailable(format!("get error: {e}"))),
        }
    }

    fn put(&self, account: &Account) -> Result<(), StoreError> {
        let value = serde_json::to_vec(account)
            .map_err(|e| StoreError::Unavailable(format!("serialization error: {e}")))?;
        self.tree
            .insert(account_key(account.id), value)
            .map_err(|e| StoreError::Unavailable(format!("insert error: {e}")))?;
        self.tree
            .flush()
            .map_err(|e| StoreError::Unavailable(format!("flush error: {e}")))?;
        Ok(())
    }
}

impl CredentialStore for SledAccountStore {
    fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        match self.tree.get(email_index_key(email).as_bytes()) {
            Ok(Some(id_bytes)) => {
                let raw: [u8; 8] = id_bytes
                    .as_ref()
                    .try_into()
                    .map_err(|_| StoreError::Unavailable("corrupt email index".into()))?;
                self.get_by_id(AccountId::new(u64::from_be_bytes(raw)))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(StoreError::Unavailable(format!("index lookup error: {e}"))),
        }
    }

    fn insert(&self, account: NewAccount) -> Result<Account, StoreError> {
        let id = self
            .db
            .generate_id()
            .map_err(|e| StoreError::Unavailable(format!("id generation error: {e}")))?
            + 1;
        let record = Account {
            id: AccountId::new(id),
            email: account.email,
            username: account.username,
            password_hash: account.password_hash,
            role: account.role,
            confirmed: false,
            refresh_token: None,
            avatar_url: account.avatar_url,
            created_at: Utc::now(),
        };

        // Claim the email via compare-and-swap on the index key; of two
        // concurrent signups exactly one lands the claim.
        let claim = self
            .tree
            .compare_and_swap(
                email_index_key(&record.email).as_bytes(),
                None as Option<&[u8]>,
                Some(&account_key(record.id)[..]),
            )
            .map_err(|e| StoreError::Unavailable(format!("index claim error: {e}")))?;
        if claim.is_err() {
            return Err(StoreError::Duplicate);
        }

        self.put(&record)?;
        Ok(record)
    }

    fn update(&self, account: &Account) -> Result<(), StoreError> {
        // Emails are immutable after creation, so the index needs no rewrite.
        if self.get_by_id(account.id)?.is_none() {
            return Err(StoreError::Missing);
        }
        self.put(account)
    }
}

impl std::fmt::Debug for SledAccountStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledAccountStore").finish_non_exhaustive()
    }
}

/// Contact store backed by sled.
pub struct SledContactStore {
    db: sled::Db,
    tree: sled::Tree,
}

impl SledContactStore {
    /// Open or create the contact tree under the given data directory.
    ///
    /// # Errors
    ///
    /// Returns `ContactError::Unavailable` if the database cannot be opened.
    pub fn open(path: &Path) -> Result<Self, ContactError> {
        let db = sled::open(path.join("cardfile"))
            .map_err(|e| ContactError::Unavailable(format!("failed to open database: {e}")))?;
        Self::with_db(db)
    }

    /// Open the contact tree on an existing sled database.
    ///
    /// # Errors
    ///
    /// Returns `ContactError::Unavailable` if the tree cannot be opened.
    pub fn with_db(db: sled::Db) -> Result<Self, ContactError> {
        let tree = db
            .open_tree("contacts")
            .map_err(|e| ContactError::Unavailable(format!("failed to open contacts tree: {e}")))?;
        Ok(Self { db, tree })
    }

    /// The underlying sled database, for sharing with the account store.
    #[must_use]
    pub fn db(&self) -> &sled::Db {
        &self.db
    }

    fn scan_owner(&self, owner: AccountId) -> impl Iterator<Item = Result<Contact, ContactError>> {
        self.tree
            .scan_prefix(owner.as_u64().to_be_bytes())
            .map(|entry| {
                let (_, value) =
                    entry.map_err(|e| ContactError::Unavailable(format!("scan error: {e}")))?;
                serde_json::from_slice(&value)
                    .map_err(|e| ContactError::Unavailable(format!("deserialization error: {e}")))
            })
    }

    fn put(&self, contact: &Contact) -> Result<(), ContactError> {
        let value = serde_json::to_vec(contact)
            .map_err(|e| ContactError::Unavailable(format!("serialization error: {e}")))?;
        self.tree
            .insert(contact_key(contact.account_id, contact.id), value)
            .map_err(|e| ContactError::Unavailable(format!("insert error: {e}")))?;
        self.tree
            .flush()
            .map_err(|e| ContactError::Unavailable(format!("flush error: {e}")))?;
        Ok(())
    }
}

impl ContactStore for SledContactStore {
    fn list(
        &self,
        owner: AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Contact>, ContactError> {
        // Keys are (owner, id) big-endian, so the prefix scan yields id order.
        self.scan_owner(owner).skip(offset).take(limit).collect()
    }

    fn get(&self, owner: AccountId, id: ContactId) -> Result<Option<Contact>, ContactError> {
        match self.tree.get(contact_key(owner, id)) {
            Ok(Some(value)) => serde_json::from_slice(&value)
                .map(Some)
                .map_err(|e| ContactError::Unavailable(format!("deserialization error: {e}"))),
            Ok(None) => Ok(None),
            Err(e) => Err(ContactError::Unavailable(format!("get error: {e}"))),
        }
    }

    fn create(&self, owner: AccountId, draft: ContactDraft) -> Result<Contact, ContactError> {
        let id = self
            .db
            .generate_id()
            .map_err(|e| ContactError::Unavailable(format!("id generation error: {e}")))?
            + 1;
        let now = Utc::now();
        let contact = Contact {
            id: ContactId::new(id),
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

        self.put(&contact)?;
        Ok(contact)
    }

    fn update(
        &self,
        owner: AccountId,
        id: ContactId,
        draft: ContactDraft,
    ) -> Result<Option<Contact>, ContactError> {
        let Some(mut contact) = self.get(owner, id)? else {
            return Ok(None);
        };

        contact.first_name = draft.first_name;
        contact.last_name = draft.last_name;
        contact.email = draft.email;
        contact.phone_number = draft.phone_number;
        contact.birthday = draft.birthday;
        contact.description = draft.description;
        contact.updated_at = Utc::now();

        self.put(&contact)?;
        Ok(Some(contact))
    }

    fn remove(&self, owner: AccountId, id: ContactId) -> Result<Option<Contact>, ContactError> {
        let removed = self
            .tree
            .remove(contact_key(owner, id))
            .map_err(|e| ContactError::Unavailable(format!("remove error: {e}")))?;
        self.tree
            .flush()
            .map_err(|e| ContactError::Unavailable(format!("flush error: {e}")))?;

        match removed {
            Some(value) => serde_json::from_slice(&value)
                .map(Some)
                .map_err(|e| ContactError::Unavailable(format!("deserialization error: {e}"))),
            None => Ok(None),
        }
    }

    fn search(
        &self,
        owner: AccountId,
        filter: &SearchFilter,
    ) -> Result<Vec<Contact>, ContactError> {
        if filter.is_empty() {
            return Ok(Vec::new());
        }
        self.scan_owner(owner)
            .filter(|c| c.as_ref().map_or(true, |c| filter.matches(c)))
            .collect()
    }

    fn upcoming_birthdays(
        &self,
        owner: AccountId,
        today: NaiveDate,
    ) -> Result<Vec<Contact>, ContactError> {
        self.scan_owner(owner)
            .filter(|c| {
                c.as_ref()
                    .map_or(true, |c| birthday_in_window(c.birthday, today, BIRTHDAY_WINDOW_DAYS))
            })
            .collect()
    }
}

impl std::fmt::Debug for SledContactStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledContactStore").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardfile_auth::Role;
    use tempfile::TempDir;

    fn new_account(email: &str) -> NewAccount {
        NewAccount {
            email: email.to_string(),
            username: "alice".to_string(),
            password_hash: "$argon2id$stub".to_string(),
            role: Role::User,
            avatar_url: None,
        }
    }

    fn draft(first: &str) -> ContactDraft {
        ContactDraft {
            first_name: first.to_string(),
            last_name: "Jones".to_string(),
            email: format!("{}@example.com", first.to_lowercase()),
            phone_number: "+1 555 0100".to_string(),
            birthday: NaiveDate::from_ymd_opt(1990, 6, 15).unwrap(),
            description: "met at the conference".to_string(),
        }
    }

    #[test]
    fn account_insert_and_find() {
        let dir = TempDir::new().unwrap();
        let store = SledAccountStore::open(dir.path()).unwrap();

        let account = store.insert(new_account("a@x.com")).unwrap();
        assert!(!account.confirmed);

        let found = store.find_by_email("a@x.com").unwrap().unwrap();
        assert_eq!(found.id, account.id);
        assert!(store.find_by_email("b@x.com").unwrap().is_none());
    }

    #[test]
    fn duplicate_account_email_rejected() {
        let dir = TempDir::new().unwrap();
        let store = SledAccountStore::open(dir.path()).unwrap();

        store.insert(new_account("a@x.com")).unwrap();
        assert!(matches!(
            store.insert(new_account("a@x.com")),
            Err(StoreError::Duplicate)
        ));
    }

    #[test]
    fn account_update_persists() {
        let dir = TempDir::new().unwrap();
        let store = SledAccountStore::open(dir.path()).unwrap();

        let mut account = store.insert(new_account("a@x.com")).unwrap();
        account.confirmed = true;
        account.refresh_token = Some("serialized".to_string());
        store.update(&account).unwrap();

        let found = store.find_by_email("a@x.com").unwrap().unwrap();
        assert!(found.confirmed);
        assert_eq!(found.refresh_token.as_deref(), Some("serialized"));
    }

    #[test]
    fn accounts_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = SledAccountStore::open(dir.path()).unwrap();
            store.insert(new_account("a@x.com")).unwrap();
        }
        let store = SledAccountStore::open(dir.path()).unwrap();
        assert!(store.find_by_email("a@x.com").unwrap().is_some());
    }

    #[test]
    fn contact_crud_scoped_to_owner() {
        let dir = TempDir::new().unwrap();
        let store = SledContactStore::open(dir.path()).unwrap();
        let alice = AccountId::new(1);
        let bob = AccountId::new(2);

        let created = store.create(alice, draft("Carol")).unwrap();
        assert!(store.get(alice, created.id).unwrap().is_some());
        assert!(store.get(bob, created.id).unwrap().is_none());

        assert!(store.update(bob, created.id, draft("Mallory")).unwrap().is_none());
        assert!(store.remove(bob, created.id).unwrap().is_none());

        let updated = store.update(alice, created.id, draft("Caroline")).unwrap().unwrap();
        assert_eq!(updated.first_name, "Caroline");

        assert!(store.remove(alice, created.id).unwrap().is_some());
        assert!(store.get(alice, created.id).unwrap().is_none());
    }

    #[test]
    fn contact_list_pages_in_id_order() {
        let dir = TempDir::new().unwrap();
        let store = SledContactStore::open(dir.path()).unwrap();
        let alice = AccountId::new(1);

        let first = store.create(alice, draft("A")).unwrap();
        let second = store.create(alice, draft("B")).unwrap();
        store.create(AccountId::new(2), draft("Foreign")).unwrap();

        let page = store.list(alice, 10, 0).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].id, first.id);
        assert_eq!(page[1].id, second.id);

        let offset = store.list(alice, 10, 1).unwrap();
        assert_eq!(offset.len(), 1);
        assert_eq!(offset[0].id, second.id);
    }

    #[test]
    fn contact_search_and_birthdays() {
        let dir = TempDir::new().unwrap();
        let store = SledContactStore::open(dir.path()).unwrap();
        let alice = AccountId::new(1);

        store.create(alice, draft("Carol")).unwrap();
        let mut other = draft("Dave");
        other.birthday = NaiveDate::from_ymd_opt(1991, 1, 2).unwrap();
        store.create(alice, other).unwrap();

        let filter = SearchFilter {
            first_name: Some("carol".to_string()),
            ..SearchFilter::default()
        };
        let hits = store.search(alice, &filter).unwrap();
        assert_eq!(hits.len(), 1);

        let today = NaiveDate::from_ymd_opt(2026, 6, 12).unwrap();
        let birthdays = store.upcoming_birthdays(alice, today).unwrap();
        assert_eq!(birthdays.len(), 1);
        assert_eq!(birthdays[0].first_name, "Carol");
    }
}
