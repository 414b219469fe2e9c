use std::fmt::{Debug, Display};

use kernel::{Account, AuditRecord, Role};

/// Stored credential row. Only the credential store ever looks at the verifier.
#[derive(Debug, Clone)]
pub struct AccountRecord {
    pub username: String,
    pub verifier: String,
    pub role: Role,
}

impl From<AccountRecord> for Account {
    fn from(r: AccountRecord) -> Self {
        Account {
            username: r.username,
            role: r.role,
        }
    }
}

/// Tables behind the credential store, the shared-file ownership map and the
/// history log. Every method is a single statement or transaction, so callers
/// holding the store lock see each one as atomic.
pub trait Storage {
    type Err: Debug + Display;

    fn new_database(&self) -> Result<(), Self::Err>;

    /// Returns `false` when the username is already taken.
    fn insert_account(&mut self, account: &AccountRecord) -> Result<bool, Self::Err>;

    fn get_account(&self, username: &str) -> Result<Option<AccountRecord>, Self::Err>;

    fn get_accounts(&self) -> Result<Vec<Account>, Self::Err>;

    /// Returns `false` when there is no such account.
    fn update_verifier(&mut self, username: &str, verifier: &str) -> Result<bool, Self::Err>;

    /// Returns `false` when there is no such account.
    fn delete_account(&mut self, username: &str) -> Result<bool, Self::Err>;

    /// Records `creator` as owner of a shared file. With `replace` unset an
    /// existing owner is kept.
    fn set_owner(&mut self, filename: &str, creator: &str, replace: bool)
        -> Result<(), Self::Err>;

    fn get_owner(&self, filename: &str) -> Result<Option<String>, Self::Err>;

    fn delete_owner(&mut self, filename: &str) -> Result<bool, Self::Err>;

    /// Forgets every shared file recorded as uploaded by `creator`.
    fn delete_owners_by(&mut self, creator: &str) -> Result<usize, Self::Err>;

    fn append_audit(&mut self, record: &AuditRecord) -> Result<(), Self::Err>;

    /// Records in insertion order, optionally restricted to one actor.
    fn get_audit(&self, actor: Option<&str>) -> Result<Vec<AuditRecord>, Self::Err>;

    fn count_audit(&self) -> Result<usize, Self::Err>;

    fn delete_audit(&mut self) -> Result<usize, Self::Err>;

    /// Removes the record at zero-based position `index`, `false` when out of range.
    fn delete_audit_at(&mut self, index: usize) -> Result<bool, Self::Err>;
}
