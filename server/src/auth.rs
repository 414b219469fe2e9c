use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::error::{Error, Result};
use crate::policy::Actor;
use crate::service::FileShare;

const BASIC: &str = "Basic ";

/// Username and password of an `Authorization: Basic` header.
///
/// `None` when the header is absent, `InvalidCredentials` when it is present
/// but unreadable.
pub fn basic_credentials(headers: &HeaderMap) -> Result<Option<(String, String)>> {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value.to_str().map_err(|_| Error::InvalidCredentials)?;
    let encoded = value
        .strip_prefix(BASIC)
        .ok_or(Error::InvalidCredentials)?
        .trim();
    let decoded = STANDARD
        .decode(encoded)
        .map_err(|_| Error::InvalidCredentials)?;
    let decoded = String::from_utf8(decoded).map_err(|_| Error::InvalidCredentials)?;
    let (username, password) = decoded.split_once(':').ok_or(Error::InvalidCredentials)?;
    Ok(Some((username.to_owned(), password.to_owned())))
}

/// Actor of a request. Requests without credentials are anonymous.
pub fn authenticate(share: &FileShare, headers: &HeaderMap) -> Result<Actor> {
    match basic_credentials(headers)? {
        Some((username, password)) => share.login(&username, &password),
        None => Ok(Actor::Anonymous),
    }
}
