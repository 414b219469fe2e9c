use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

use kernel::{Account, Action, AuditRecord, DeleteResult, FileEntry, Role, ScopeRequest};

use crate::audit::AuditLog;
use crate::config::Config;
use crate::credentials::CredentialStore;
use crate::domain::Storage;
use crate::error::{Error, Result};
use crate::namespace::{resolve, resolve_scope, StorageLocation};
use crate::policy::{authorize, authorize_admin, Actor, Operation};
use crate::sqlite::{Database, Sqlite};
use crate::store::{FileStore, Listing};

/// Every operation an outer surface can request. Each call resolves the
/// location, authorizes the actor, performs the operation and records it.
pub struct FileShare {
    credentials: CredentialStore,
    store: FileStore,
    audit: AuditLog,
}

impl FileShare {
    /// Opens (creating when needed) the database and upload root of `config`.
    pub fn open(config: &Config) -> anyhow::Result<Self> {
        fs::create_dir_all(&config.data_dir)?;
        let db = Sqlite::open(config.db_path())?;
        db.new_database()?;
        let share = Self::with_database(db.into_shared(), &config.upload_dir, config)?;
        Ok(share)
    }

    pub fn with_database(db: Database, upload_dir: &Path, config: &Config) -> anyhow::Result<Self> {
        let params = config.password_cost.params()?;
        Ok(Self {
            credentials: CredentialStore::new(db.clone(), params, config.admins.clone()),
            store: FileStore::new(upload_dir, db.clone(), config.ownership)?,
            audit: AuditLog::new(db),
        })
    }

    /// Seeds every protected admin identity that does not exist yet.
    /// Returns the names that were created.
    pub fn bootstrap(&self, password: &str) -> Result<Vec<String>> {
        let mut created = Vec::new();
        for username in self.credentials.protected() {
            match self
                .credentials
                .create_account(username, password, Role::Admin)
            {
                Ok(_) => {
                    self.store.provision(username)?;
                    created.push(username.clone());
                }
                Err(Error::DuplicateUsername(_)) => {
                    tracing::debug!("bootstrap admin {username} already exists");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(created)
    }

    pub fn login(&self, username: &str, password: &str) -> Result<Actor> {
        match self.credentials.verify(username, password) {
            Ok(account) => Ok(account.into()),
            Err(e) => {
                tracing::warn!("login of {username} rejected: {e}");
                Err(e)
            }
        }
    }

    pub fn create_account(
        &self,
        actor: &Actor,
        username: &str,
        password: &str,
        role: Role,
    ) -> Result<Account> {
        authorize_admin(actor).into_result()?;
        let account = self.credentials.create_account(username, password, role)?;
        // files and ownership left behind by a failed account removal must not resurface
        let stale = self.store.remove_namespace(username)?;
        if stale > 0 {
            tracing::warn!("removed {stale} stale files of {username}");
        }
        self.store.release_ownership(username)?;
        self.store.provision(username)?;
        Ok(account)
    }

    /// Removes the account, its shared-file ownership and then its private
    /// area. The steps are not atomic: when a later one fails the account is
    /// already gone and the error is returned with the leftovers in place.
    pub fn delete_account(&self, actor: &Actor, username: &str) -> Result<DeleteResult> {
        authorize_admin(actor).into_result()?;
        self.credentials.delete_account(username)?;
        let released = self.store.release_ownership(username)?;
        tracing::debug!("{released} shared files of {username} are now admin managed");
        let files = self.store.remove_namespace(username).map_err(|e| {
            tracing::error!("account {username} deleted but its files were not: {e}");
            e
        })?;
        Ok(DeleteResult { files })
    }

    /// Changes the password of the calling account.
    pub fn change_password(&self, actor: &Actor, old: &str, new: &str) -> Result<()> {
        let username = actor.require_user()?;
        self.credentials.change_password(username, old, new)
    }

    pub fn accounts(&self, actor: &Actor) -> Result<Vec<Account>> {
        authorize_admin(actor).into_result()?;
        self.credentials.accounts()
    }

    pub fn upload<R: Read>(
        &self,
        actor: &Actor,
        request: ScopeRequest,
        filename: &str,
        data: R,
    ) -> Result<FileEntry> {
        let location = resolve(actor, request, filename)?;
        let username = actor.require_user()?;
        self.check(actor, Operation::Write, &location, None)?;

        let written = self.store.put(&location, username, data)?;
        self.audit.record(username, &location, Action::Upload)?;
        tracing::info!(
            "{username} uploaded {} to {} ({written} bytes)",
            location.filename(),
            location.scope()
        );
        self.store.entry(&location)
    }

    pub fn download(
        &self,
        actor: &Actor,
        request: ScopeRequest,
        filename: &str,
    ) -> Result<(File, FileEntry)> {
        let location = resolve(actor, request, filename)?;
        let username = actor.require_user()?;
        self.check(actor, Operation::Read, &location, None)?;

        let file = self.store.get(&location)?;
        self.audit.record(username, &location, Action::Download)?;
        tracing::info!(
            "{username} downloaded {} from {}",
            location.filename(),
            location.scope()
        );
        Ok(file)
    }

    pub fn list(&self, actor: &Actor, request: ScopeRequest) -> Result<Listing> {
        let scope = resolve_scope(actor, request)?;
        authorize(actor, Operation::Read, &scope, None).into_result()?;
        self.store.list(&scope)
    }

    pub fn delete(&self, actor: &Actor, request: ScopeRequest, filename: &str) -> Result<()> {
        let location = resolve(actor, request, filename)?;
        let username = actor.require_user()?;
        // a file that is gone has no creator left to authorize against
        if !self.store.exists(&location) {
            return Err(Error::NotFound(format!(
                "{}/{}",
                location.scope(),
                location.filename()
            )));
        }
        let creator = self.store.owner(&location)?;
        self.check(actor, Operation::Delete, &location, creator.as_deref())?;

        self.store.delete(&location)?;
        self.audit.record(username, &location, Action::Delete)?;
        tracing::info!(
            "{username} deleted {} from {}",
            location.filename(),
            location.scope()
        );
        Ok(())
    }

    /// History records in insertion order.
    ///
    /// Standard users only see their own records; asking for somebody
    /// else's requires the admin role. Admins see everything unless they filter.
    pub fn history(&self, actor: &Actor, user: Option<&str>) -> Result<Vec<AuditRecord>> {
        let username = actor.require_user()?;
        let filter = match user {
            Some(other) if other != username => {
                authorize_admin(actor).into_result()?;
                Some(other)
            }
            Some(own) => Some(own),
            None if actor.is_admin() => None,
            None => Some(username),
        };
        self.audit.query(filter)
    }

    pub fn purge_history(&self, actor: &Actor) -> Result<usize> {
        authorize_admin(actor).into_result()?;
        let removed = self.audit.purge_all()?;
        tracing::info!("{actor} purged {removed} history records");
        Ok(removed)
    }

    pub fn purge_history_entry(&self, actor: &Actor, index: usize) -> Result<()> {
        authorize_admin(actor).into_result()?;
        self.audit.purge_one(index)?;
        tracing::info!("{actor} purged history record {index}");
        Ok(())
    }

    fn check(
        &self,
        actor: &Actor,
        operation: Operation,
        location: &StorageLocation,
        creator: Option<&str>,
    ) -> Result<()> {
        authorize(actor, operation, location.scope(), creator)
            .into_result()
            .map_err(|e| {
                tracing::warn!(
                    "{actor} denied {operation:?} on {}/{}: {e}",
                    location.scope(),
                    location.filename()
                );
                e
            })
    }
}
