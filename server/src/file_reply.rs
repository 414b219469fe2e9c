use axum::{
    body::Body,
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
};
use kernel::FileEntry;
use tokio_util::io::ReaderStream;

/// Streams a stored file back as an attachment.
pub struct FileReply {
    file: std::fs::File,
    entry: FileEntry,
}

impl FileReply {
    #[must_use]
    pub fn new(file: std::fs::File, entry: FileEntry) -> Self {
        Self { file, entry }
    }

    fn name_from_path(&self) -> &str {
        let path = &self.entry.name;
        if let Some(ix) = path.rfind(['\\', '/']) {
            &path[ix + 1..]
        } else {
            path
        }
    }
}

impl IntoResponse for FileReply {
    fn into_response(self) -> Response {
        let file_name = self.name_from_path().replace('"', "");
        let len = self.entry.size.to_string();
        let modified = self
            .entry
            .modified
            .format("%a, %d %b %Y %H:%M:%S GMT")
            .to_string();

        let stream = ReaderStream::new(tokio::fs::File::from_std(self.file));
        let mut res = Body::from_stream(stream).into_response();
        let headers = res.headers_mut();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/octet-stream"),
        );
        let attachment = format!(r#"attachment; filename="{file_name}""#);
        if let Ok(val) = HeaderValue::from_str(attachment.as_str()) {
            headers.insert(header::CONTENT_DISPOSITION, val);
        }
        if let Ok(val) = HeaderValue::from_str(len.as_str()) {
            headers.insert(header::CONTENT_LENGTH, val);
        }
        if let Ok(val) = HeaderValue::from_str(modified.as_str()) {
            headers.insert(header::LAST_MODIFIED, val);
        }

        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rstest::rstest;

    #[rstest]
    #[case("file.ext", "file.ext")]
    #[case("dir/file.ext", "file.ext")]
    #[case("dir1/dir2/file.ext", "file.ext")]
    #[trace]
    fn name_from_path(#[case] path: &str, #[case] expected: &str) {
        // Arrange
        let entry = FileEntry {
            name: path.to_owned(),
            size: 1,
            modified: Utc::now(),
        };
        let file = tempfile::tempfile().unwrap();
        let reply = FileReply::new(file, entry);

        // Act
        let name = reply.name_from_path();

        // Assert
        assert_eq!(name, expected);
    }
}
