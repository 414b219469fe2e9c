use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use kernel::{Account, Action, AuditRecord, Role, Scope};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, Error, OptionalExtension, Row};

use crate::domain::{AccountRecord, Storage};

const CACHE_SIZE: &str = "4096";

/// Process wide handle on the database. One lock guards every table.
pub type Database = Arc<Mutex<Sqlite>>;

pub struct Sqlite {
    conn: Connection,
}

impl Storage for Sqlite {
    type Err = Error;

    fn new_database(&self) -> Result<(), Self::Err> {
        self.pragma_update("encoding", "UTF-8")?;
        self.pragma_update("synchronous", "FULL")?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS account (
                  username     TEXT PRIMARY KEY,
                  verifier     TEXT NOT NULL,
                  role         TEXT NOT NULL
                  )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS ownership (
                  filename     TEXT PRIMARY KEY,
                  creator      TEXT NOT NULL
                  )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS audit (
                  id           INTEGER PRIMARY KEY AUTOINCREMENT,
                  actor        TEXT NOT NULL,
                  filename     TEXT NOT NULL,
                  scope        TEXT NOT NULL,
                  action       TEXT NOT NULL,
                  time         TEXT NOT NULL
                  )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS audit_actor_ix ON audit(actor)",
            [],
        )?;

        Ok(())
    }

    fn insert_account(&mut self, account: &AccountRecord) -> Result<bool, Self::Err> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO account (username, verifier, role) VALUES (?1, ?2, ?3)",
            params![account.username, account.verifier, account.role.to_string()],
        )?;
        Ok(inserted == 1)
    }

    fn get_account(&self, username: &str) -> Result<Option<AccountRecord>, Self::Err> {
        self.conn
            .query_row(
                "SELECT username, verifier, role FROM account WHERE username = ?1",
                params![username],
                |row| {
                    Ok(AccountRecord {
                        username: row.get(0)?,
                        verifier: row.get(1)?,
                        role: parse_column(row, 2)?,
                    })
                },
            )
            .optional()
    }

    fn get_accounts(&self) -> Result<Vec<Account>, Self::Err> {
        let mut stmt = self
            .conn
            .prepare("SELECT username, role FROM account ORDER BY username")?;
        let rows = stmt.query_map([], |row| {
            Ok(Account {
                username: row.get(0)?,
                role: parse_column::<Role>(row, 1)?,
            })
        })?;
        rows.collect()
    }

    fn update_verifier(&mut self, username: &str, verifier: &str) -> Result<bool, Self::Err> {
        let updated = self.conn.execute(
            "UPDATE account SET verifier = ?2 WHERE username = ?1",
            params![username, verifier],
        )?;
        Ok(updated == 1)
    }

    fn delete_account(&mut self, username: &str) -> Result<bool, Self::Err> {
        let deleted = self
            .conn
            .execute("DELETE FROM account WHERE username = ?1", params![username])?;
        Ok(deleted == 1)
    }

    fn set_owner(
        &mut self,
        filename: &str,
        creator: &str,
        replace: bool,
    ) -> Result<(), Self::Err> {
        let sql = if replace {
            "INSERT OR REPLACE INTO ownership (filename, creator) VALUES (?1, ?2)"
        } else {
            "INSERT OR IGNORE INTO ownership (filename, creator) VALUES (?1, ?2)"
        };
        self.conn
            .prepare_cached(sql)?
            .execute(params![filename, creator])?;
        Ok(())
    }

    fn get_owner(&self, filename: &str) -> Result<Option<String>, Self::Err> {
        self.conn
            .query_row(
                "SELECT creator FROM ownership WHERE filename = ?1",
                params![filename],
                |row| row.get(0),
            )
            .optional()
    }

    fn delete_owner(&mut self, filename: &str) -> Result<bool, Self::Err> {
        let deleted = self.conn.execute(
            "DELETE FROM ownership WHERE filename = ?1",
            params![filename],
        )?;
        Ok(deleted == 1)
    }

    fn delete_owners_by(&mut self, creator: &str) -> Result<usize, Self::Err> {
        self.conn.execute(
            "DELETE FROM ownership WHERE creator = ?1",
            params![creator],
        )
    }

    fn append_audit(&mut self, record: &AuditRecord) -> Result<(), Self::Err> {
        self.conn
            .prepare_cached(
                "INSERT INTO audit (actor, filename, scope, action, time)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?
            .execute(params![
                record.actor,
                record.filename,
                record.scope.to_string(),
                record.action.to_string(),
                record.time,
            ])?;
        Ok(())
    }

    fn get_audit(&self, actor: Option<&str>) -> Result<Vec<AuditRecord>, Self::Err> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT actor, filename, scope, action, time FROM audit
             WHERE ?1 IS NULL OR actor = ?1
             ORDER BY id",
        )?;
        let rows = stmt.query_map(params![actor], |row| {
            Ok(AuditRecord {
                actor: row.get(0)?,
                filename: row.get(1)?,
                scope: parse_column::<Scope>(row, 2)?,
                action: parse_column::<Action>(row, 3)?,
                time: row.get::<_, DateTime<Utc>>(4)?,
            })
        })?;
        rows.collect()
    }

    fn count_audit(&self) -> Result<usize, Self::Err> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM audit", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    fn delete_audit(&mut self) -> Result<usize, Self::Err> {
        self.conn.execute("DELETE FROM audit", [])
    }

    fn delete_audit_at(&mut self, index: usize) -> Result<bool, Self::Err> {
        let Ok(offset) = i64::try_from(index) else {
            return Ok(false);
        };
        let deleted = self.conn.execute(
            "DELETE FROM audit WHERE id = (SELECT id FROM audit ORDER BY id LIMIT 1 OFFSET ?1)",
            params![offset],
        )?;
        Ok(deleted == 1)
    }
}

impl Sqlite {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let s = Self {
            conn: Connection::open(path)?,
        };
        s.assign_cache_size()?;
        Ok(s)
    }

    pub fn open_in_memory() -> Result<Self, Error> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    #[must_use]
    pub fn into_shared(self) -> Database {
        Arc::new(Mutex::new(self))
    }

    fn assign_cache_size(&self) -> Result<(), Error> {
        self.pragma_update("cache_size", CACHE_SIZE)
    }

    fn pragma_update(&self, name: &str, value: &str) -> Result<(), Error> {
        self.conn.pragma_update(None, name, value)
    }
}

fn parse_column<T>(row: &Row<'_>, ix: usize) -> Result<T, Error>
where
    T: FromStr<Err = kernel::ParseError>,
{
    let text: String = row.get(ix)?;
    text.parse()
        .map_err(|e| Error::FromSqlConversionFailure(ix, Type::Text, Box::new(e)))
}
