use chrono::Utc;
use kernel::{Action, AuditRecord};

use crate::domain::Storage;
use crate::error::{Error, Result};
use crate::namespace::StorageLocation;
use crate::sqlite::Database;

/// Append-only history of uploads, downloads and deletions.
pub struct AuditLog {
    db: Database,
}

impl AuditLog {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn record(&self, actor: &str, location: &StorageLocation, action: Action) -> Result<()> {
        let record = AuditRecord {
            actor: actor.to_owned(),
            filename: location.filename().to_owned(),
            scope: location.scope().clone(),
            action,
            time: Utc::now(),
        };
        self.db.lock().append_audit(&record).map_err(|e| {
            tracing::error!("history record for {actor} {action} {} lost: {e}", record.filename);
            Error::from(e)
        })
    }

    pub fn query(&self, actor: Option<&str>) -> Result<Vec<AuditRecord>> {
        Ok(self.db.lock().get_audit(actor)?)
    }

    pub fn purge_all(&self) -> Result<usize> {
        Ok(self.db.lock().delete_audit()?)
    }

    pub fn purge_one(&self, index: usize) -> Result<()> {
        let mut db = self.db.lock();
        if db.delete_audit_at(index)? {
            Ok(())
        } else {
            Err(Error::OutOfRange {
                index,
                len: db.count_audit()?,
            })
        }
    }
}
