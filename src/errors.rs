use std::fmt;
use std::io::Cursor;

use rocket::http::{ContentType, Status};
use rocket::request::Request;
use rocket::response::{self, Responder, Response};
use serde_json::json;

/// Crate-wide error. Every store, token and route failure ends up here.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Id / type lookup miss.
    NotFound(String),
    /// Malformed caller input (bad token, missing field, unknown type).
    Validation(String),
    /// Connection failure, constraint violation, file I/O.
    Storage(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Error::Storage(msg.into())
    }

    pub fn status(&self) -> Status {
        match self {
            Error::NotFound(_) => Status::NotFound,
            Error::Validation(_) => Status::BadRequest,
            Error::Storage(_) => Status::InternalServerError,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Error::NotFound(msg) | Error::Validation(msg) | Error::Storage(msg) => msg,
        }
    }

    #[cfg(test)]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotFound(msg) => write!(f, "not found: {}", msg),
            Error::Validation(msg) => write!(f, "validation error: {}", msg),
            Error::Storage(msg) => write!(f, "storage error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<r2d2::Error> for Error {
    fn from(err: r2d2::Error) -> Self {
        Error::Storage(format!("connection pool: {}", err))
    }
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Error::Storage(format!("csv: {}", err))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Storage(format!("io: {}", err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Validation(format!("invalid json: {}", err))
    }
}

impl From<base64::DecodeError> for Error {
    fn from(err: base64::DecodeError) -> Self {
        Error::Validation(format!("invalid base64: {}", err))
    }
}

/// JSON error body. Storage details stay in the log, not in the response.
impl<'r> Responder<'r, 'static> for Error {
    fn respond_to(self, _req: &'r Request<'_>) -> response::Result<'static> {
        let status = self.status();
        let message = match &self {
            Error::Storage(msg) => {
                log::error!("{}", msg);
                "Internal Server Error".to_string()
            }
            other => other.message().to_string(),
        };
        let body = json!({ "error": message }).to_string();
        Response::build()
            .status(status)
            .header(ContentType::JSON)
            .sized_body(body.len(), Cursor::new(body))
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(Error::not_found("x").status(), Status::NotFound);
        assert_eq!(Error::validation("x").status(), Status::BadRequest);
        assert_eq!(Error::storage("x").status(), Status::InternalServerError);
    }

    #[test]
    fn decode_errors_are_validation() {
        let err: Error = serde_json::from_str::<serde_json::Value>("{nope").unwrap_err().into();
        assert!(matches!(err, Error::Validation(_)));
    }
}
