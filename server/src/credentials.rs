use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use kernel::{Account, Role};

use crate::domain::{AccountRecord, Storage};
use crate::error::{Error, Result, StorageError};
use crate::namespace::validate_username;
use crate::sqlite::Database;

const DECOY_PASSWORD: &str = "decoy";

/// Username → (Argon2id verifier, role).
pub struct CredentialStore {
    db: Database,
    hasher: Argon2<'static>,
    protected: Vec<String>,
    /// Verifier checked for unknown usernames
    decoy: Option<String>,
}

impl CredentialStore {
    /// `protected` lists the bootstrap admin identities that can never be deleted.
    pub fn new(db: Database, params: Params, protected: Vec<String>) -> Self {
        let hasher = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let decoy = hash_with(&hasher, DECOY_PASSWORD)
            .map_err(|e| tracing::warn!("decoy verifier not available: {e}"))
            .ok();
        Self {
            db,
            hasher,
            protected,
            decoy,
        }
    }

    pub fn create_account(&self, username: &str, password: &str, role: Role) -> Result<Account> {
        validate_username(username)?;
        let record = AccountRecord {
            username: username.to_owned(),
            verifier: self.hash(password)?,
            role,
        };
        if !self.db.lock().insert_account(&record)? {
            return Err(Error::DuplicateUsername(username.to_owned()));
        }
        tracing::info!("account {username} created with role {role}");
        Ok(record.into())
    }

    pub fn verify(&self, username: &str, password: &str) -> Result<Account> {
        let record = self.db.lock().get_account(username)?;
        let Some(record) = record else {
            // same Argon2 work as for a known name
            if let Some(decoy) = &self.decoy {
                let _ = self.check(decoy, password);
            }
            return Err(Error::InvalidCredentials);
        };
        self.check(&record.verifier, password)?;
        Ok(record.into())
    }

    pub fn change_password(&self, username: &str, old: &str, new: &str) -> Result<()> {
        self.verify(username, old)?;
        let verifier = self.hash(new)?;
        if !self.db.lock().update_verifier(username, &verifier)? {
            return Err(Error::InvalidCredentials);
        }
        tracing::info!("password of {username} changed");
        Ok(())
    }

    /// Removes the credential entry only. The caller owns the namespace cascade.
    pub fn delete_account(&self, username: &str) -> Result<()> {
        let mut db = self.db.lock();
        if db.get_account(username)?.is_none() {
            return Err(Error::NotFound(format!("account {username}")));
        }
        if self.is_protected(username) {
            return Err(Error::ProtectedAccount(username.to_owned()));
        }
        db.delete_account(username)?;
        tracing::info!("account {username} deleted");
        Ok(())
    }

    pub fn account(&self, username: &str) -> Result<Account> {
        self.db
            .lock()
            .get_account(username)?
            .map(Account::from)
            .ok_or_else(|| Error::NotFound(format!("account {username}")))
    }

    pub fn accounts(&self) -> Result<Vec<Account>> {
        Ok(self.db.lock().get_accounts()?)
    }

    #[must_use]
    pub fn is_protected(&self, username: &str) -> bool {
        self.protected.iter().any(|p| p == username)
    }

    #[must_use]
    pub fn protected(&self) -> &[String] {
        &self.protected
    }

    fn hash(&self, password: &str) -> Result<String> {
        hash_with(&self.hasher, password)
    }

    fn check(&self, verifier: &str, password: &str) -> Result<()> {
        let parsed =
            PasswordHash::new(verifier).map_err(|e| StorageError::Verifier(e.to_string()))?;
        self.hasher
            .verify_password(password.as_bytes(), &parsed)
            .map_err(|_| Error::InvalidCredentials)
    }
}

fn hash_with(hasher: &Argon2<'_>, password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = hasher
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| StorageError::Verifier(e.to_string()))?;
    Ok(hash.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::Sqlite;
    use kernel::ErrorKind;
    use rstest::{fixture, rstest};

    #[fixture]
    fn store() -> CredentialStore {
        let db = Sqlite::open_in_memory().unwrap();
        db.new_database().unwrap();
        let params = Params::new(Params::MIN_M_COST, 1, 1, None).unwrap();
        CredentialStore::new(db.into_shared(), params, vec!["admin".to_owned()])
    }

    #[rstest]
    #[case("alice", "correct horse")]
    #[case("bob", "")]
    #[case("carol", "zażółć gęślą jaźń")]
    fn create_then_verify(store: CredentialStore, #[case] username: &str, #[case] password: &str) {
        // Arrange
        store
            .create_account(username, password, Role::Standard)
            .unwrap();

        // Act
        let ok = store.verify(username, password);
        let wrong = store.verify(username, "something else");

        // Assert
        assert_eq!(ok.unwrap().username, username);
        assert_eq!(wrong.unwrap_err().kind(), ErrorKind::InvalidCredentials);
    }

    #[rstest]
    fn verifier_is_not_plaintext(store: CredentialStore) {
        // Arrange
        store
            .create_account("alice", "secret", Role::Standard)
            .unwrap();

        // Act
        let record = store.db.lock().get_account("alice").unwrap().unwrap();

        // Assert
        assert!(!record.verifier.contains("secret"));
        assert!(record.verifier.starts_with("$argon2id$"));
    }

    #[rstest]
    fn same_password_different_salt(store: CredentialStore) {
        // Arrange
        store.create_account("a", "pw", Role::Standard).unwrap();
        store.create_account("b", "pw", Role::Standard).unwrap();

        // Act
        let a = store.db.lock().get_account("a").unwrap().unwrap();
        let b = store.db.lock().get_account("b").unwrap().unwrap();

        // Assert
        assert_ne!(a.verifier, b.verifier);
    }

    #[rstest]
    fn duplicate_username(store: CredentialStore) {
        // Arrange
        store.create_account("alice", "one", Role::Standard).unwrap();

        // Act
        let result = store.create_account("alice", "two", Role::Admin);

        // Assert
        assert_eq!(result.unwrap_err().kind(), ErrorKind::DuplicateUsername);
        assert!(store.verify("alice", "one").is_ok());
        assert_eq!(store.account("alice").unwrap().role, Role::Standard);
    }

    #[rstest]
    fn unknown_user(store: CredentialStore) {
        // Arrange

        // Act
        let result = store.verify("ghost", "pw");

        // Assert
        assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidCredentials);
        // unknown names are checked against a real Argon2id verifier too
        let decoy = store.decoy.as_deref().unwrap();
        assert!(decoy.starts_with("$argon2id$"));
        assert!(store.check(decoy, DECOY_PASSWORD).is_ok());
    }

    #[rstest]
    fn invalid_username(store: CredentialStore) {
        // Arrange

        // Act
        let result = store.create_account("../alice", "pw", Role::Standard);

        // Assert
        assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidPath);
    }

    #[rstest]
    fn change_password(store: CredentialStore) {
        // Arrange
        store.create_account("alice", "old", Role::Standard).unwrap();

        // Act
        let wrong = store.change_password("alice", "not old", "new");
        let right = store.change_password("alice", "old", "new");

        // Assert
        assert_eq!(wrong.unwrap_err().kind(), ErrorKind::InvalidCredentials);
        assert!(right.is_ok());
        assert!(store.verify("alice", "new").is_ok());
        assert_eq!(
            store.verify("alice", "old").unwrap_err().kind(),
            ErrorKind::InvalidCredentials
        );
    }

    #[rstest]
    #[case("ghost", ErrorKind::NotFound)]
    #[case("admin", ErrorKind::ProtectedAccount)]
    fn delete_account_failures(
        store: CredentialStore,
        #[case] username: &str,
        #[case] expected: ErrorKind,
    ) {
        // Arrange
        store.create_account("admin", "pw", Role::Admin).unwrap();

        // Act
        let result = store.delete_account(username);

        // Assert
        assert_eq!(result.unwrap_err().kind(), expected);
    }

    #[rstest]
    fn delete_account(store: CredentialStore) {
        // Arrange
        store.create_account("alice", "pw", Role::Standard).unwrap();

        // Act
        store.delete_account("alice").unwrap();

        // Assert
        assert_eq!(
            store.verify("alice", "pw").unwrap_err().kind(),
            ErrorKind::InvalidCredentials
        );
        assert!(store.accounts().unwrap().is_empty());
    }
}
