#![allow(clippy::unused_async)]
use crate::auth::authenticate;
use crate::error::Error;
use crate::file_reply::FileReply;
use crate::policy::Actor;
use crate::service::FileShare;
use axum::body::{Body, Bytes};
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::{Stream, TryStreamExt};
use kernel::{
    Account, AuditRecord, DeleteResult, ErrorKind, FileEntry, HistoryQuery, NewAccount,
    PasswordChange, Problem, PurgeResult, ScopeRequest,
};
use std::io;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::io::StreamReader;

pub type Share = Arc<FileShare>;

/// Returns the account behind the supplied credentials.
#[utoipa::path(
    get,
    path = "/api/whoami",
    tag = "accounts",
    responses(
        (status = 200, description = "Credentials are valid", body = Account),
        (status = 401, description = "Missing or wrong credentials", body = Problem)
    ),
)]
pub async fn whoami(
    State(share): State<Share>,
    headers: HeaderMap,
) -> Result<Json<Account>, Error> {
    execute(&share, &headers, |_, actor| match actor {
        Actor::User { username, role } => Ok(Json(Account {
            username: username.clone(),
            role: *role,
        })),
        Actor::Anonymous => Err(Error::NotAuthenticated),
    })
}

/// Lists all files of a scope
#[utoipa::path(
    get,
    path = "/api/files/{scope}",
    tag = "files",
    responses(
        (status = 200, description = "Files of the scope", body = [FileEntry]),
        (status = 401, description = "Authentication required", body = Problem)
    ),
    params(
        ("scope" = ScopeRequest, Path, description = "private or shared")
    ),
)]
pub async fn list_files(
    Path(scope): Path<ScopeRequest>,
    State(share): State<Share>,
    headers: HeaderMap,
) -> Result<Json<Vec<FileEntry>>, Error> {
    execute(&share, &headers, move |share, actor| {
        let listing = share.list(actor, scope)?;
        Ok(Json(listing.iter().collect()))
    })
}

/// Uploads several files from a multipart form into a scope.
#[utoipa::path(
    post,
    path = "/api/files/{scope}",
    tag = "files",
    request_body(content = String, content_type = "multipart/form-data", description = "One part per file, the part file name is the target name"),
    responses(
        (status = 201, description = "Files stored", body = [FileEntry]),
        (status = 400, description = "Invalid file name or unreadable body", body = Problem),
        (status = 401, description = "Authentication required", body = Problem)
    ),
    params(
        ("scope" = ScopeRequest, Path, description = "private or shared")
    ),
)]
pub async fn upload_many_from_form(
    Path(scope): Path<ScopeRequest>,
    State(share): State<Share>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Response, Error> {
    let actor = authenticate(&share, &headers)?;
    actor.require_user()?;

    let mut inserted: Vec<FileEntry> = vec![];
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return Err(Error::InvalidRequest(e.to_string())),
        };
        let Some(file_name) = field.file_name().map(ToOwned::to_owned) else {
            tracing::debug!("form field without file name skipped");
            continue;
        };
        let (data, read_bytes) = read_from_stream(field)
            .await
            .map_err(|e| Error::InvalidRequest(e.to_string()))?;
        tracing::debug!("file: {file_name} read: {read_bytes}");
        inserted.push(share.upload(&actor, scope, &file_name, data.as_slice())?);
    }

    Ok(created(Json(inserted)))
}

/// Uploads a single file, replacing an existing one with the same name.
#[utoipa::path(
    post,
    path = "/api/files/{scope}/{file_name}",
    tag = "files",
    request_body(content = String, content_type = "application/octet-stream", description = "Raw file content"),
    responses(
        (status = 201, description = "File stored", body = FileEntry),
        (status = 400, description = "Invalid file name or unreadable body", body = Problem),
        (status = 401, description = "Authentication required", body = Problem)
    ),
    params(
        ("scope" = ScopeRequest, Path, description = "private or shared"),
        ("file_name" = String, Path, description = "File path inside the scope")
    ),
)]
pub async fn upload_file(
    Path((scope, file_name)): Path<(ScopeRequest, String)>,
    State(share): State<Share>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, Error> {
    let actor = authenticate(&share, &headers)?;
    actor.require_user()?;

    let (data, read_bytes) = read_from_stream(body.into_data_stream())
        .await
        .map_err(|e| {
            tracing::error!("{e}");
            Error::InvalidRequest(e.to_string())
        })?;
    tracing::debug!("file: {file_name} read: {read_bytes}");
    let entry = share.upload(&actor, scope, &file_name, data.as_slice())?;
    Ok(created(Json(entry)))
}

/// Gets file binary content
#[utoipa::path(
    get,
    path = "/api/files/{scope}/{file_name}",
    tag = "files",
    responses(
        (status = 200, description = "File binary content", content_type = "application/octet-stream", body = String),
        (status = 403, description = "Not allowed", body = Problem),
        (status = 404, description = "File not found", body = Problem)
    ),
    params(
        ("scope" = ScopeRequest, Path, description = "private or shared"),
        ("file_name" = String, Path, description = "File path inside the scope")
    ),
)]
pub async fn download_file(
    Path((scope, file_name)): Path<(ScopeRequest, String)>,
    State(share): State<Share>,
    headers: HeaderMap,
) -> Result<FileReply, Error> {
    execute(&share, &headers, move |share, actor| {
        let (file, entry) = share.download(actor, scope, &file_name)?;
        Ok(FileReply::new(file, entry))
    })
}

/// Deletes a file
#[utoipa::path(
    delete,
    path = "/api/files/{scope}/{file_name}",
    tag = "files",
    responses(
        (status = 204, description = "File deleted"),
        (status = 403, description = "Only the uploader or an admin may delete", body = Problem),
        (status = 404, description = "File not found", body = Problem)
    ),
    params(
        ("scope" = ScopeRequest, Path, description = "private or shared"),
        ("file_name" = String, Path, description = "File path inside the scope")
    ),
)]
pub async fn delete_file(
    Path((scope, file_name)): Path<(ScopeRequest, String)>,
    State(share): State<Share>,
    headers: HeaderMap,
) -> Result<StatusCode, Error> {
    execute(&share, &headers, move |share, actor| {
        share.delete(actor, scope, &file_name)?;
        Ok(StatusCode::NO_CONTENT)
    })
}

/// Upload, download and delete history in chronological order
#[utoipa::path(
    get,
    path = "/api/history",
    tag = "history",
    responses(
        (status = 200, description = "History records", body = [AuditRecord]),
        (status = 403, description = "Foreign history requires admin role", body = Problem)
    ),
    params(HistoryQuery),
)]
pub async fn get_history(
    Query(query): Query<HistoryQuery>,
    State(share): State<Share>,
    headers: HeaderMap,
) -> Result<Json<Vec<AuditRecord>>, Error> {
    execute(&share, &headers, move |share, actor| {
        Ok(Json(share.history(actor, query.user.as_deref())?))
    })
}

/// Removes the whole history
#[utoipa::path(
    delete,
    path = "/api/history",
    tag = "history",
    responses(
        (status = 200, description = "History purged", body = PurgeResult),
        (status = 403, description = "Admin role required", body = Problem)
    ),
)]
pub async fn purge_history(
    State(share): State<Share>,
    headers: HeaderMap,
) -> Result<Json<PurgeResult>, Error> {
    execute(&share, &headers, |share, actor| {
        let records = share.purge_history(actor)?;
        Ok(Json(PurgeResult { records }))
    })
}

/// Removes one history record by its position
#[utoipa::path(
    delete,
    path = "/api/history/{index}",
    tag = "history",
    responses(
        (status = 204, description = "Record removed"),
        (status = 400, description = "Index out of range", body = Problem),
        (status = 403, description = "Admin role required", body = Problem)
    ),
    params(
        ("index" = usize, Path, description = "Zero based position in the history")
    ),
)]
pub async fn purge_history_entry(
    Path(index): Path<usize>,
    State(share): State<Share>,
    headers: HeaderMap,
) -> Result<StatusCode, Error> {
    execute(&share, &headers, move |share, actor| {
        share.purge_history_entry(actor, index)?;
        Ok(StatusCode::NO_CONTENT)
    })
}

/// Lists all accounts
#[utoipa::path(
    get,
    path = "/api/accounts",
    tag = "accounts",
    responses(
        (status = 200, description = "All accounts", body = [Account]),
        (status = 403, description = "Admin role required", body = Problem)
    ),
)]
pub async fn get_accounts(
    State(share): State<Share>,
    headers: HeaderMap,
) -> Result<Json<Vec<Account>>, Error> {
    execute(&share, &headers, |share, actor| {
        Ok(Json(share.accounts(actor)?))
    })
}

/// Creates an account with an empty private area
#[utoipa::path(
    post,
    path = "/api/accounts",
    tag = "accounts",
    request_body = NewAccount,
    responses(
        (status = 201, description = "Account created", body = Account),
        (status = 403, description = "Admin role required", body = Problem),
        (status = 409, description = "Username taken", body = Problem)
    ),
)]
pub async fn create_account(
    State(share): State<Share>,
    headers: HeaderMap,
    Json(account): Json<NewAccount>,
) -> Result<Response, Error> {
    execute(&share, &headers, move |share, actor| {
        let created_account =
            share.create_account(actor, &account.username, &account.password, account.role)?;
        Ok(created(Json(created_account)))
    })
}

/// Deletes an account together with its private area
#[utoipa::path(
    delete,
    path = "/api/accounts/{username}",
    tag = "accounts",
    responses(
        (status = 200, description = "Account deleted", body = DeleteResult),
        (status = 403, description = "Admin role required or protected account", body = Problem),
        (status = 404, description = "No such account", body = Problem)
    ),
    params(
        ("username" = String, Path, description = "Account to delete")
    ),
)]
pub async fn delete_account(
    Path(username): Path<String>,
    State(share): State<Share>,
    headers: HeaderMap,
) -> Result<Json<DeleteResult>, Error> {
    execute(&share, &headers, move |share, actor| {
        Ok(Json(share.delete_account(actor, &username)?))
    })
}

/// Changes the password of the calling account
#[utoipa::path(
    put,
    path = "/api/password",
    tag = "accounts",
    request_body = PasswordChange,
    responses(
        (status = 204, description = "Password changed"),
        (status = 401, description = "Old password does not match", body = Problem)
    ),
)]
pub async fn change_password(
    State(share): State<Share>,
    headers: HeaderMap,
    Json(change): Json<PasswordChange>,
) -> Result<StatusCode, Error> {
    execute(&share, &headers, move |share, actor| {
        share.change_password(actor, &change.old_password, &change.new_password)?;
        Ok(StatusCode::NO_CONTENT)
    })
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = status_of(kind);
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("{self}");
        }
        let problem = Problem {
            kind,
            message: self.to_string(),
        };
        let mut res = (status, Json(problem)).into_response();
        if kind == ErrorKind::NotAuthenticated {
            res.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static(r#"Basic realm="fshare""#),
            );
        }
        res
    }
}

fn status_of(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotAuthenticated | ErrorKind::InvalidCredentials => StatusCode::UNAUTHORIZED,
        ErrorKind::DuplicateUsername => StatusCode::CONFLICT,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidPath | ErrorKind::OutOfRange | ErrorKind::InvalidRequest => {
            StatusCode::BAD_REQUEST
        }
        ErrorKind::PermissionDenied | ErrorKind::ProtectedAccount => StatusCode::FORBIDDEN,
        ErrorKind::StorageFailure => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn execute<F, R>(share: &FileShare, headers: &HeaderMap, action: F) -> Result<R, Error>
where
    F: FnOnce(&FileShare, &Actor) -> Result<R, Error>,
{
    let start = Instant::now();
    let actor = authenticate(share, headers)?;
    let res = action(share, &actor);
    let duration = start.elapsed();
    tracing::debug!("request by {actor} handled in {:?}", duration);
    res
}

fn created<S: IntoResponse>(s: S) -> Response {
    (StatusCode::CREATED, s).into_response()
}

async fn read_from_stream<S, E>(stream: S) -> io::Result<(Vec<u8>, usize)>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Sync + std::error::Error + Send + 'static,
{
    // Convert the stream into an `AsyncRead`.
    let body_with_io_error = stream.map_err(io::Error::other);
    let body_reader = StreamReader::new(body_with_io_error);
    futures::pin_mut!(body_reader);
    let mut buffer = Vec::new();

    let copied_bytes = tokio::io::copy(&mut body_reader, &mut buffer).await?;
    let copied_bytes = usize::try_from(copied_bytes).unwrap_or(usize::MAX);
    Ok((buffer, copied_bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ErrorKind::NotAuthenticated, StatusCode::UNAUTHORIZED)]
    #[case(ErrorKind::InvalidCredentials, StatusCode::UNAUTHORIZED)]
    #[case(ErrorKind::DuplicateUsername, StatusCode::CONFLICT)]
    #[case(ErrorKind::NotFound, StatusCode::NOT_FOUND)]
    #[case(ErrorKind::InvalidPath, StatusCode::BAD_REQUEST)]
    #[case(ErrorKind::PermissionDenied, StatusCode::FORBIDDEN)]
    #[case(ErrorKind::ProtectedAccount, StatusCode::FORBIDDEN)]
    #[case(ErrorKind::OutOfRange, StatusCode::BAD_REQUEST)]
    #[case(ErrorKind::InvalidRequest, StatusCode::BAD_REQUEST)]
    #[case(ErrorKind::StorageFailure, StatusCode::INTERNAL_SERVER_ERROR)]
    #[trace]
    fn status_codes(#[case] kind: ErrorKind, #[case] expected: StatusCode) {
        // Arrange

        // Act
        let status = status_of(kind);

        // Assert
        assert_eq!(status, expected);
    }

    #[test]
    fn not_authenticated_asks_for_basic_auth() {
        // Arrange
        let error = Error::NotAuthenticated;

        // Act
        let res = error.into_response();

        // Assert
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert!(res.headers().contains_key(header::WWW_AUTHENTICATE));
    }

    #[test]
    fn unreadable_body_is_bad_request() {
        // Arrange
        let error = Error::InvalidRequest("incomplete field data".to_owned());

        // Act
        let res = error.into_response();

        // Assert
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            res.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }

    #[tokio::test]
    async fn read_whole_stream() {
        // Arrange
        let chunks: Vec<Result<Bytes, io::Error>> =
            vec![Ok(Bytes::from_static(b"ab")), Ok(Bytes::from_static(b"cd"))];
        let stream = futures::stream::iter(chunks);

        // Act
        let (data, read) = read_from_stream(stream).await.unwrap();

        // Assert
        assert_eq!(data, b"abcd");
        assert_eq!(read, 4);
    }
}
