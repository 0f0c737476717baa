//! The typed request/response model.
//!
//! Each operation carries only the fields it needs. The acting user is not
//! part of the request: it is always the authenticated sender of the wire
//! message that carried it.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;
use crate::types::{Filename, Identity};

/// Header value of a successful response.
pub const SUCCESS_HEADER: &str = "success";

/// Header value of a failed response.
pub const FAILURE_HEADER: &str = "failure";

/// Discriminator for the five supported operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    AddUser,
    UploadFile,
    DownloadFile,
    DeleteFile,
    ShareFile,
}

impl RequestKind {
    /// All kinds, in protocol order.
    pub const ALL: [RequestKind; 5] = [
        RequestKind::AddUser,
        RequestKind::UploadFile,
        RequestKind::DownloadFile,
        RequestKind::DeleteFile,
        RequestKind::ShareFile,
    ];

    /// The wire header naming this kind.
    pub const fn as_str(&self) -> &'static str {
        match self {
            RequestKind::AddUser => "add_user",
            RequestKind::UploadFile => "upload_file",
            RequestKind::DownloadFile => "download_file",
            RequestKind::DeleteFile => "delete_file",
            RequestKind::ShareFile => "share_file",
        }
    }

    /// Whether requests of this kind travel without an envelope.
    ///
    /// Only `add_user` does: the requester has no registered key yet.
    pub const fn is_bootstrap(&self) -> bool {
        matches!(self, RequestKind::AddUser)
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RequestKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| CoreError::UnknownKind(s.to_string()))
    }
}

/// One logical operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Request {
    /// Register the sender as a user.
    AddUser,

    /// Store a new file owned by the sender.
    UploadFile {
        filename: Filename,
        data: Bytes,
    },

    /// Fetch a file the sender may read.
    DownloadFile { filename: Filename },

    /// Remove a file the sender owns.
    DeleteFile { filename: Filename },

    /// Give `target` read access to a file the sender owns.
    ShareFile { filename: Filename, target: Identity },

    /// A header that names no known operation.
    ///
    /// Never encoded; built by the dispatcher so the validator can answer it.
    #[serde(skip)]
    Unrecognized { header: String },
}

impl Request {
    /// The kind of this request, if it is a known operation.
    pub fn kind(&self) -> Option<RequestKind> {
        match self {
            Request::AddUser => Some(RequestKind::AddUser),
            Request::UploadFile { .. } => Some(RequestKind::UploadFile),
            Request::DownloadFile { .. } => Some(RequestKind::DownloadFile),
            Request::DeleteFile { .. } => Some(RequestKind::DeleteFile),
            Request::ShareFile { .. } => Some(RequestKind::ShareFile),
            Request::Unrecognized { .. } => None,
        }
    }

    /// The wire header for this request.
    pub fn header(&self) -> &str {
        match self {
            Request::Unrecognized { header } => header,
            other => other.kind().map(|k| k.as_str()).unwrap_or_default(),
        }
    }

    /// The file this request targets, if any.
    pub fn filename(&self) -> Option<&Filename> {
        match self {
            Request::UploadFile { filename, .. }
            | Request::DownloadFile { filename }
            | Request::DeleteFile { filename }
            | Request::ShareFile { filename, .. } => Some(filename),
            Request::AddUser | Request::Unrecognized { .. } => None,
        }
    }
}

/// The result of one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Response {
    Success { payload: ResponsePayload },
    Failure { error: String },
}

/// What a successful response carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponsePayload {
    Empty,
    File { filename: Filename, data: Bytes },
}

impl Response {
    /// Success with nothing to return.
    pub fn success() -> Self {
        Response::Success {
            payload: ResponsePayload::Empty,
        }
    }

    /// Success carrying a file's contents.
    pub fn file(filename: Filename, data: Bytes) -> Self {
        Response::Success {
            payload: ResponsePayload::File { filename, data },
        }
    }

    /// Failure with a human-readable reason.
    pub fn failure(error: impl ToString) -> Self {
        Response::Failure {
            error: error.to_string(),
        }
    }

    /// Whether the operation succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, Response::Success { .. })
    }

    /// The wire header for this response.
    pub fn header(&self) -> &'static str {
        match self {
            Response::Success { .. } => SUCCESS_HEADER,
            Response::Failure { .. } => FAILURE_HEADER,
        }
    }

    /// The failure reason, if any.
    pub fn error(&self) -> Option<&str> {
        match self {
            Response::Failure { error } => Some(error),
            Response::Success { .. } => None,
        }
    }

    /// The returned file, if any.
    pub fn into_file(self) -> Option<(Filename, Bytes)> {
        match self {
            Response::Success {
                payload: ResponsePayload::File { filename, data },
            } => Some((filename, data)),
            _ => None,
        }
    }
}
