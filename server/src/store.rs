use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use kernel::{FileEntry, Scope};
use parking_lot::{Mutex, RawMutex};
use walkdir::WalkDir;

use crate::domain::Storage;
use crate::error::{Error, Result};
use crate::namespace::{StorageLocation, SEPARATOR};
use crate::sqlite::Database;

const PRIVATE_DIR: &str = "private";
const SHARED_DIR: &str = "shared";
const UPLOAD_PREFIX: &str = ".upload-";

/// Who becomes owner-of-record when a shared file is overwritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OwnershipPolicy {
    /// The first uploader stays the owner
    #[default]
    KeepOriginal,
    /// The last uploader takes over
    LastWriter,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown ownership policy '{0}', expected keep-original or last-writer")]
pub struct UnknownPolicy(String);

impl FromStr for OwnershipPolicy {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "keep-original" => Ok(OwnershipPolicy::KeepOriginal),
            "last-writer" => Ok(OwnershipPolicy::LastWriter),
            other => Err(UnknownPolicy(other.to_owned())),
        }
    }
}

type PathGuard = parking_lot::lock_api::ArcMutexGuard<RawMutex, ()>;

/// One mutex per physical path. Unused entries are pruned on the next lock.
#[derive(Default)]
struct PathLocks {
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl PathLocks {
    fn lock(&self, path: &Path) -> PathGuard {
        let lock = {
            let mut locks = self.locks.lock();
            locks.retain(|_, l| Arc::strong_count(l) > 1);
            Arc::clone(locks.entry(path.to_path_buf()).or_default())
        };
        lock.lock_arc()
    }
}

/// Snapshot of a scope taken at call time.
///
/// File paths are fixed when the listing is created; sizes and times are
/// read while iterating. Files removed in between are skipped. The listing can
/// be iterated any number of times.
#[derive(Debug)]
pub struct Listing {
    root: PathBuf,
    paths: Vec<PathBuf>,
}

impl Listing {
    pub fn iter(&self) -> impl Iterator<Item = FileEntry> + '_ {
        self.paths.iter().filter_map(|path| self.entry(path))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    fn entry(&self, path: &Path) -> Option<FileEntry> {
        let meta = fs::metadata(path).ok()?;
        let relative = path.strip_prefix(&self.root).ok()?;
        Some(file_entry(relative, &meta))
    }
}

impl<'a> IntoIterator for &'a Listing {
    type Item = FileEntry;
    type IntoIter = Box<dyn Iterator<Item = FileEntry> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

/// Files of every scope below one upload root:
/// `private/<username>/...` and `shared/...`.
pub struct FileStore {
    root: PathBuf,
    db: Database,
    ownership: OwnershipPolicy,
    locks: PathLocks,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>, db: Database, ownership: OwnershipPolicy) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join(PRIVATE_DIR))?;
        fs::create_dir_all(root.join(SHARED_DIR))?;
        Ok(Self {
            root,
            db,
            ownership,
            locks: PathLocks::default(),
        })
    }

    /// Creates an empty private area.
    pub fn provision(&self, username: &str) -> Result<()> {
        fs::create_dir_all(self.private_root(username))?;
        Ok(())
    }

    /// Removes a private area with everything in it and returns the number
    /// of files it held.
    pub fn remove_namespace(&self, username: &str) -> Result<usize> {
        let dir = self.private_root(username);
        if !dir.is_dir() {
            return Ok(0);
        }
        let files = WalkDir::new(&dir)
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter(|e| e.file_type().is_file())
            .count();
        fs::remove_dir_all(&dir)?;
        tracing::info!("private area of {username} removed with {files} files");
        Ok(files)
    }

    #[must_use]
    pub fn exists(&self, location: &StorageLocation) -> bool {
        self.physical_path(location).is_file()
    }

    /// Writes `data` to `location`, silently replacing an existing file.
    ///
    /// Returns the number of bytes written.
    pub fn put<R: Read>(&self, location: &StorageLocation, actor: &str, mut data: R) -> Result<u64> {
        let path = self.physical_path(location);
        let dir = path.parent().unwrap_or(&self.root);

        let _guard = self.locks.lock(&path);
        if self.collides(location) {
            return Err(Error::InvalidPath(location.filename().to_owned()));
        }
        fs::create_dir_all(dir)?;
        let mut tmp = tempfile::Builder::new()
            .prefix(UPLOAD_PREFIX)
            .tempfile_in(dir)?;
        let written = io::copy(&mut data, &mut tmp)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| e.error)?;

        if location.scope().is_shared() {
            let replace = self.ownership == OwnershipPolicy::LastWriter;
            self.db
                .lock()
                .set_owner(location.filename(), actor, replace)?;
        }
        Ok(written)
    }

    /// Opens the file for reading together with its metadata.
    pub fn get(&self, location: &StorageLocation) -> Result<(File, FileEntry)> {
        let path = self.physical_path(location);
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(not_found(location));
            }
            Err(e) => return Err(e.into()),
        };
        let meta = file.metadata()?;
        if !meta.is_file() {
            return Err(not_found(location));
        }
        Ok((file, file_entry(Path::new(location.filename()), &meta)))
    }

    pub fn entry(&self, location: &StorageLocation) -> Result<FileEntry> {
        let meta = fs::metadata(self.physical_path(location)).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => not_found(location),
            _ => e.into(),
        })?;
        Ok(file_entry(Path::new(location.filename()), &meta))
    }

    pub fn list(&self, scope: &Scope) -> Result<Listing> {
        let root = self.scope_root(scope);
        let mut paths = Vec::new();
        if root.is_dir() {
            let walker = WalkDir::new(&root)
                .min_depth(1)
                .into_iter()
                .filter_entry(|e| !e.file_name().to_string_lossy().starts_with('.'));
            for entry in walker {
                let entry = entry.map_err(io::Error::from)?;
                if entry.file_type().is_file() {
                    paths.push(entry.into_path());
                }
            }
        }
        Ok(Listing { root, paths })
    }

    pub fn delete(&self, location: &StorageLocation) -> Result<()> {
        let path = self.physical_path(location);
        let _guard = self.locks.lock(&path);
        if !path.is_file() {
            return Err(not_found(location));
        }
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(not_found(location)),
            Err(e) => return Err(e.into()),
        }
        if location.scope().is_shared() {
            self.db.lock().delete_owner(location.filename())?;
        }
        Ok(())
    }

    /// Drops the owner-of-record entries of `username`. Their shared files
    /// stay in place and can then only be deleted by an admin.
    pub fn release_ownership(&self, username: &str) -> Result<usize> {
        Ok(self.db.lock().delete_owners_by(username)?)
    }

    /// Owner-of-record of a shared file. Private files have none.
    pub fn owner(&self, location: &StorageLocation) -> Result<Option<String>> {
        if !location.scope().is_shared() {
            return Ok(None);
        }
        Ok(self.db.lock().get_owner(location.filename())?)
    }

    /// A file where a directory is needed or a directory where the file goes.
    fn collides(&self, location: &StorageLocation) -> bool {
        let mut path = self.scope_root(location.scope());
        let mut segments = location.segments().peekable();
        while let Some(segment) = segments.next() {
            path.push(segment);
            let last = segments.peek().is_none();
            if (last && path.is_dir()) || (!last && path.is_file()) {
                return true;
            }
        }
        false
    }

    fn physical_path(&self, location: &StorageLocation) -> PathBuf {
        let mut path = self.scope_root(location.scope());
        path.extend(location.segments());
        path
    }

    fn scope_root(&self, scope: &Scope) -> PathBuf {
        match scope {
            Scope::Private(owner) => self.private_root(owner),
            Scope::Shared => self.root.join(SHARED_DIR),
        }
    }

    fn private_root(&self, username: &str) -> PathBuf {
        self.root.join(PRIVATE_DIR).join(username)
    }
}

fn not_found(location: &StorageLocation) -> Error {
    Error::NotFound(format!("{}/{}", location.scope(), location.filename()))
}

fn file_entry(relative: &Path, meta: &fs::Metadata) -> FileEntry {
    let name = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join(&SEPARATOR.to_string());
    let modified = meta
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_default();
    FileEntry {
        name,
        size: meta.len(),
        modified,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::resolve;
    use crate::policy::Actor;
    use crate::sqlite::Sqlite;
    use kernel::{ErrorKind, Role, ScopeRequest};
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        store: FileStore,
    }

    fn open(ownership: OwnershipPolicy) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let db = Sqlite::open_in_memory().unwrap();
        db.new_database().unwrap();
        let store = FileStore::new(dir.path(), db.into_shared(), ownership).unwrap();
        Fixture { _dir: dir, store }
    }

    #[fixture]
    fn fx() -> Fixture {
        open(OwnershipPolicy::KeepOriginal)
    }

    fn user(name: &str) -> Actor {
        Actor::User {
            username: name.to_owned(),
            role: Role::Standard,
        }
    }

    fn location(owner: &str, request: ScopeRequest, filename: &str) -> StorageLocation {
        resolve(&user(owner), request, filename).unwrap()
    }

    fn read_all(store: &FileStore, location: &StorageLocation) -> Vec<u8> {
        let (mut file, _) = store.get(location).unwrap();
        let mut content = Vec::new();
        file.read_to_end(&mut content).unwrap();
        content
    }

    #[rstest]
    #[case(b"".as_slice())]
    #[case(b"hello".as_slice())]
    #[case(&[0u8, 159, 146, 150, 255])]
    fn put_then_get(fx: Fixture, #[case] data: &[u8]) {
        // Arrange
        let loc = location("alice", ScopeRequest::Private, "docs/report.pdf");

        // Act
        let written = fx.store.put(&loc, "alice", data).unwrap();

        // Assert
        assert_eq!(written, data.len() as u64);
        assert_eq!(read_all(&fx.store, &loc), data);
    }

    #[rstest]
    fn put_overwrites(fx: Fixture) {
        // Arrange
        let loc = location("alice", ScopeRequest::Private, "a.txt");
        fx.store.put(&loc, "alice", b"first".as_slice()).unwrap();

        // Act
        fx.store.put(&loc, "alice", b"second".as_slice()).unwrap();

        // Assert
        assert_eq!(read_all(&fx.store, &loc), b"second");
        let listing = fx.store.list(loc.scope()).unwrap();
        assert_eq!(listing.len(), 1);
    }

    #[rstest]
    #[case("a", "a/b")]
    #[case("c/d", "c")]
    fn file_and_directory_collide(fx: Fixture, #[case] first: &str, #[case] second: &str) {
        // Arrange
        let first = location("alice", ScopeRequest::Shared, first);
        fx.store.put(&first, "alice", b"1".as_slice()).unwrap();
        let second = location("alice", ScopeRequest::Shared, second);

        // Act
        let result = fx.store.put(&second, "alice", b"2".as_slice());

        // Assert
        assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidPath);
        assert_eq!(read_all(&fx.store, &first), b"1");
    }

    #[rstest]
    #[case("keep-original", Some(OwnershipPolicy::KeepOriginal))]
    #[case("last-writer", Some(OwnershipPolicy::LastWriter))]
    #[case("first-writer", None)]
    #[trace]
    fn parse_ownership_policy(#[case] text: &str, #[case] expected: Option<OwnershipPolicy>) {
        // Arrange

        // Act
        let parsed = text.parse::<OwnershipPolicy>();

        // Assert
        assert_eq!(parsed.ok(), expected);
    }

    #[rstest]
    fn get_missing(fx: Fixture) {
        // Arrange
        let loc = location("alice", ScopeRequest::Shared, "missing.txt");

        // Act
        let result = fx.store.get(&loc);

        // Assert
        assert_eq!(result.unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[rstest]
    fn get_directory_is_not_found(fx: Fixture) {
        // Arrange
        let file = location("alice", ScopeRequest::Shared, "docs/a.txt");
        fx.store.put(&file, "alice", b"a".as_slice()).unwrap();
        let dir = location("alice", ScopeRequest::Shared, "docs");

        // Act
        let result = fx.store.get(&dir);

        // Assert
        assert_eq!(result.unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[rstest]
    fn delete_twice(fx: Fixture) {
        // Arrange
        let loc = location("alice", ScopeRequest::Shared, "report.pdf");
        fx.store.put(&loc, "alice", b"pdf".as_slice()).unwrap();

        // Act
        let first = fx.store.delete(&loc);
        let second = fx.store.delete(&loc);

        // Assert
        assert!(first.is_ok());
        assert_eq!(second.unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(fx.store.owner(&loc).unwrap(), None);
    }

    #[rstest]
    #[case(OwnershipPolicy::KeepOriginal, "alice")]
    #[case(OwnershipPolicy::LastWriter, "bob")]
    #[trace]
    fn shared_overwrite_ownership(#[case] policy: OwnershipPolicy, #[case] expected: &str) {
        // Arrange
        let fx = open(policy);
        let loc = location("alice", ScopeRequest::Shared, "report.pdf");
        fx.store.put(&loc, "alice", b"v1".as_slice()).unwrap();

        // Act
        fx.store.put(&loc, "bob", b"v2".as_slice()).unwrap();

        // Assert
        assert_eq!(fx.store.owner(&loc).unwrap().as_deref(), Some(expected));
    }

    #[rstest]
    fn private_put_has_no_owner_record(fx: Fixture) {
        // Arrange
        let loc = location("alice", ScopeRequest::Private, "report.pdf");

        // Act
        fx.store.put(&loc, "alice", b"pdf".as_slice()).unwrap();

        // Assert
        assert_eq!(fx.store.owner(&loc).unwrap(), None);
    }

    #[rstest]
    fn list_is_a_snapshot(fx: Fixture) {
        // Arrange
        fx.store.provision("alice").unwrap();
        let scope = Scope::Private("alice".to_owned());
        let empty = fx.store.list(&scope).unwrap();
        let a = location("alice", ScopeRequest::Private, "a.txt");
        let b = location("alice", ScopeRequest::Private, "sub/b.txt");
        fx.store.put(&a, "alice", b"aa".as_slice()).unwrap();
        fx.store.put(&b, "alice", b"bbb".as_slice()).unwrap();

        // Act
        let listing = fx.store.list(&scope).unwrap();
        fx.store.put(&location("alice", ScopeRequest::Private, "c.txt"), "alice", b"c".as_slice())
            .unwrap();

        // Assert
        assert!(empty.is_empty());
        assert_eq!(empty.iter().count(), 0);
        let mut names: Vec<(String, u64)> = listing.iter().map(|e| (e.name, e.size)).collect();
        names.sort();
        assert_eq!(
            names,
            [("a.txt".to_owned(), 2), ("sub/b.txt".to_owned(), 3)]
        );
        // restartable
        assert_eq!(listing.iter().count(), 2);
    }

    #[rstest]
    fn list_skips_vanished_files(fx: Fixture) {
        // Arrange
        let a = location("alice", ScopeRequest::Shared, "a.txt");
        fx.store.put(&a, "alice", b"a".as_slice()).unwrap();
        let listing = fx.store.list(a.scope()).unwrap();

        // Act
        fx.store.delete(&a).unwrap();

        // Assert
        assert_eq!(listing.len(), 1);
        assert_eq!(listing.iter().count(), 0);
    }

    #[rstest]
    fn list_unprovisioned_is_empty(fx: Fixture) {
        // Arrange
        let scope = Scope::Private("nobody".to_owned());

        // Act
        let listing = fx.store.list(&scope).unwrap();

        // Assert
        assert!(listing.is_empty());
    }

    #[rstest]
    fn remove_namespace_counts_files(fx: Fixture) {
        // Arrange
        for name in ["a", "b", "c/d"] {
            let loc = location("alice", ScopeRequest::Private, name);
            fx.store.put(&loc, "alice", b"x".as_slice()).unwrap();
        }
        let keep = location("bob", ScopeRequest::Private, "keep");
        fx.store.put(&keep, "bob", b"x".as_slice()).unwrap();

        // Act
        let removed = fx.store.remove_namespace("alice").unwrap();

        // Assert
        assert_eq!(removed, 3);
        assert!(fx.store.exists(&keep));
        assert_eq!(fx.store.remove_namespace("alice").unwrap(), 0);
    }

    #[rstest]
    fn scopes_are_isolated(fx: Fixture) {
        // Arrange
        let private = location("alice", ScopeRequest::Private, "same.txt");
        let shared = location("alice", ScopeRequest::Shared, "same.txt");
        fx.store.put(&private, "alice", b"private".as_slice()).unwrap();

        // Act
        let result = fx.store.get(&shared);

        // Assert
        assert_eq!(result.unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(read_all(&fx.store, &private), b"private");
    }
}
