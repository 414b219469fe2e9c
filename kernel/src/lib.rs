#![warn(clippy::unwrap_in_result)]
#![warn(clippy::unwrap_used)]

use std::fmt::{self, Display};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

const PRIVATE_PREFIX: &str = "private:";
const SHARED: &str = "shared";

/// Error produced when a stored or transmitted token cannot be parsed
/// back into a domain value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {what}: '{value}'")]
pub struct ParseError {
    what: &'static str,
    value: String,
}

impl ParseError {
    fn new(what: &'static str, value: &str) -> Self {
        Self {
            what,
            value: value.to_owned(),
        }
    }
}

/// Account role.
///
/// Admins may act on every private namespace, delete any shared file,
/// manage accounts and purge the history log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Standard,
    Admin,
}

impl Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Standard => f.write_str("standard"),
            Role::Admin => f.write_str("admin"),
        }
    }
}

impl FromStr for Role {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(Role::Standard),
            "admin" => Ok(Role::Admin),
            other => Err(ParseError::new("role", other)),
        }
    }
}

/// Scope a client asks for.
///
/// `private` always means the caller's own private namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ScopeRequest {
    Private,
    Shared,
}

impl Display for ScopeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeRequest::Private => f.write_str("private"),
            ScopeRequest::Shared => f.write_str(SHARED),
        }
    }
}

impl FromStr for ScopeRequest {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" => Ok(ScopeRequest::Private),
            SHARED => Ok(ScopeRequest::Shared),
            other => Err(ParseError::new("scope", other)),
        }
    }
}

/// Resolved namespace: one user's private area or the shared area.
///
/// Serialized as `private:<owner>` or `shared`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Scope {
    Private(String),
    Shared,
}

impl Scope {
    /// Owner of a private scope, `None` for the shared one.
    #[must_use]
    pub fn owner(&self) -> Option<&str> {
        match self {
            Scope::Private(owner) => Some(owner),
            Scope::Shared => None,
        }
    }

    #[must_use]
    pub fn is_shared(&self) -> bool {
        matches!(self, Scope::Shared)
    }
}

impl Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Private(owner) => write!(f, "{PRIVATE_PREFIX}{owner}"),
            Scope::Shared => f.write_str(SHARED),
        }
    }
}

impl FromStr for Scope {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == SHARED {
            return Ok(Scope::Shared);
        }
        match s.strip_prefix(PRIVATE_PREFIX) {
            Some(owner) if !owner.is_empty() => Ok(Scope::Private(owner.to_owned())),
            _ => Err(ParseError::new("scope", s)),
        }
    }
}

impl From<Scope> for String {
    fn from(scope: Scope) -> Self {
        scope.to_string()
    }
}

impl TryFrom<String> for Scope {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Kind of event kept in the history log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Upload,
    Download,
    Delete,
}

impl Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Upload => f.write_str("upload"),
            Action::Download => f.write_str("download"),
            Action::Delete => f.write_str("delete"),
        }
    }
}

impl FromStr for Action {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upload" => Ok(Action::Upload),
            "download" => Ok(Action::Download),
            "delete" => Ok(Action::Delete),
            other => Err(ParseError::new("action", other)),
        }
    }
}

/// Public view of an account. The password verifier never leaves the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Account {
    /// Unique, immutable login name
    pub username: String,
    pub role: Role,
}

/// A file materialized inside a scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FileEntry {
    /// Path relative to the scope root, `/` separated
    pub name: String,
    /// Size of the file in bytes
    pub size: u64,
    /// Last modification time
    pub modified: DateTime<Utc>,
}

/// One entry of the append-only history log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AuditRecord {
    /// Who performed the action
    pub actor: String,
    pub filename: String,
    /// `private:<owner>` or `shared`
    #[schema(value_type = String, example = "shared")]
    pub scope: Scope,
    pub action: Action,
    pub time: DateTime<Utc>,
}

/// Stable, machine readable error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum ErrorKind {
    NotAuthenticated,
    InvalidCredentials,
    DuplicateUsername,
    NotFound,
    InvalidPath,
    PermissionDenied,
    ProtectedAccount,
    /// Request body could not be read or decoded
    InvalidRequest,
    OutOfRange,
    StorageFailure,
}

/// Error body returned by the REST API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Problem {
    pub kind: ErrorKind,
    pub message: String,
}

/// Account creation request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewAccount {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub role: Role,
}

/// Password change request for the calling account.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PasswordChange {
    pub old_password: String,
    pub new_password: String,
}

/// History query parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HistoryQuery {
    /// Only return records of this user
    pub user: Option<String>,
}

/// Result of removing an account together with its private namespace.
#[derive(Debug, Serialize, Deserialize, Default, ToSchema)]
pub struct DeleteResult {
    /// Number of files removed from the private namespace
    pub files: usize,
}

/// Result of purging the history log.
#[derive(Debug, Serialize, Deserialize, Default, ToSchema)]
pub struct PurgeResult {
    /// Number of removed records
    pub records: usize,
}
