//! Maps a request onto a storage location.
//!
//! Filenames are validated, never rewritten: anything that a path
//! normalization would change (traversal, absolute prefixes, doubled or
//! dangling separators) is rejected with `InvalidPath`.

use kernel::{Scope, ScopeRequest};

use crate::error::{Error, Result};
use crate::policy::Actor;

pub const SEPARATOR: char = '/';

const MAX_SEGMENT_LEN: usize = 255;
const MAX_USERNAME_LEN: usize = 64;

/// A validated place inside one scope. Only [`resolve`] builds these.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageLocation {
    scope: Scope,
    filename: String,
}

impl StorageLocation {
    #[must_use]
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Filename segments, outermost directory first.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.filename.split(SEPARATOR)
    }
}

/// Resolves `filename` inside the scope requested by `actor`.
///
/// Filename validation comes first, so a bad path is reported as
/// `InvalidPath` even for anonymous callers.
pub fn resolve(actor: &Actor, request: ScopeRequest, filename: &str) -> Result<StorageLocation> {
    validate_filename(filename)?;
    let scope = resolve_scope(actor, request)?;
    Ok(StorageLocation {
        scope,
        filename: filename.to_owned(),
    })
}

/// `private` always resolves to the actor's own area.
pub fn resolve_scope(actor: &Actor, request: ScopeRequest) -> Result<Scope> {
    match request {
        ScopeRequest::Shared => Ok(Scope::Shared),
        ScopeRequest::Private => Ok(Scope::Private(actor.require_user()?.to_owned())),
    }
}

pub fn validate_filename(filename: &str) -> Result<()> {
    let invalid = || Error::InvalidPath(filename.to_owned());

    if filename.is_empty() || filename.contains(['\\', '\0']) || has_drive_prefix(filename) {
        return Err(invalid());
    }
    // a leading separator yields an empty first segment, a trailing one an empty last
    for segment in filename.split(SEPARATOR) {
        if segment.is_empty() || segment.starts_with('.') || segment.len() > MAX_SEGMENT_LEN {
            return Err(invalid());
        }
    }
    Ok(())
}

/// Usernames double as directory names of private areas.
pub fn validate_username(username: &str) -> Result<()> {
    let valid = !username.is_empty()
        && username.len() <= MAX_USERNAME_LEN
        && !username.starts_with('.')
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidPath(username.to_owned()))
    }
}

fn has_drive_prefix(filename: &str) -> bool {
    let mut chars = filename.chars();
    matches!(
        (chars.next(), chars.next()),
        (Some(letter), Some(':')) if letter.is_ascii_alphabetic()
    )
}
