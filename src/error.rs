use std::error::Error as StdError;
use std::fmt::{Debug, Display, Formatter};
use std::string::FromUtf8Error;

use http::StatusCode;
use serde_json::Value;

use crate::body::{Body, InMemoryBody};
use crate::response::{clone_inmemory_response, InMemoryResponse, Response};

pub type Result<T = Response, E = Error> = std::result::Result<T, E>;
pub type InMemoryError = Error<InMemoryBody>;
pub type InMemoryResult<T> = Result<T, InMemoryError>;

#[derive(Debug)]
pub enum ProtocolError {
    Connection(hyper_util::client::legacy::Error),
    HttpProtocol(hyper::Error),
    Utf8(FromUtf8Error),
    Json(serde_json::Error),
    Io(std::io::Error),
    InvalidUri(http::uri::InvalidUri),
    InvalidRequest(String),
    /// A 401 needed a refresh, but the credential store holds no refresh token.
    MissingRefreshToken,
    /// The refresh call failed below the HTTP layer. Carries the message of the original error.
    RefreshFailed(String),
}

impl StdError for ProtocolError {}

impl Display for ProtocolError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolError::Connection(e) => write!(f, "ConnectionError: {e}"),
            ProtocolError::HttpProtocol(e) => write!(f, "HttpProtocolError: {e}"),
            ProtocolError::Utf8(e) => write!(f, "Utf8Error: {e}"),
            ProtocolError::Json(e) => write!(f, "JsonError: {e}"),
            ProtocolError::Io(e) => write!(f, "IoError: {e}"),
            ProtocolError::InvalidUri(e) => write!(f, "InvalidUri: {e}"),
            ProtocolError::InvalidRequest(msg) => write!(f, "InvalidRequest: {msg}"),
            ProtocolError::MissingRefreshToken => write!(f, "No refresh token available"),
            ProtocolError::RefreshFailed(msg) => write!(f, "Token refresh failed: {msg}"),
        }
    }
}

pub enum Error<T = Body> {
    Protocol(ProtocolError),
    HttpError(http::Response<T>),
}

impl<T> Error<T> {
    /// Get the error status code.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::HttpError(r) => Some(r.status()),
            Error::Protocol(_) => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(StatusCode::UNAUTHORIZED)
    }
}

impl Error {
    pub async fn into_memory(self) -> InMemoryError {
        match self {
            Error::HttpError(r) => {
                let (parts, body) = r.into_parts();
                match body.into_memory().await {
                    Ok(body) => Error::HttpError(InMemoryResponse::from_parts(parts, body)),
                    Err(e) => e.into(),
                }
            }
            Error::Protocol(e) => Error::Protocol(e),
        }
    }

    /// A copy of this error that can be handed to another caller.
    /// Buffered responses are cloned. Everything else is carried as its message.
    pub(crate) fn duplicate(&self) -> Error {
        match self {
            Error::HttpError(r) => match r.body() {
                Body::InMemory(body) => {
                    let mut copy = Response::new(Body::InMemory(body.clone()));
                    *copy.status_mut() = r.status();
                    *copy.version_mut() = r.version();
                    *copy.headers_mut() = r.headers().clone();
                    Error::HttpError(copy)
                }
                Body::Hyper(_) => Error::Protocol(ProtocolError::RefreshFailed(format!("upstream returned {}", r.status()))),
            },
            Error::Protocol(ProtocolError::RefreshFailed(msg)) => Error::Protocol(ProtocolError::RefreshFailed(msg.clone())),
            Error::Protocol(ProtocolError::MissingRefreshToken) => Error::Protocol(ProtocolError::MissingRefreshToken),
            Error::Protocol(e) => Error::Protocol(ProtocolError::RefreshFailed(e.to_string())),
        }
    }
}

impl InMemoryError {
    /// The `detail` message the backend puts in error bodies, e.g. `{"detail": "Invalid credentials."}`.
    pub fn detail(&self) -> Option<String> {
        let Error::HttpError(r) = self else {
            return None;
        };
        match r.body() {
            InMemoryBody::Json(Value::Object(map)) => map.get("detail").and_then(Value::as_str).map(str::to_string),
            InMemoryBody::Text(text) => serde_json::from_str::<Value>(text)
                .ok()
                .and_then(|v| v.get("detail").and_then(Value::as_str).map(str::to_string)),
            _ => None,
        }
    }
}

impl Clone for InMemoryError {
    fn clone(&self) -> Self {
        match self {
            Error::HttpError(r) => Error::HttpError(clone_inmemory_response(r)),
            Error::Protocol(ProtocolError::MissingRefreshToken) => Error::Protocol(ProtocolError::MissingRefreshToken),
            Error::Protocol(ProtocolError::RefreshFailed(msg)) => Error::Protocol(ProtocolError::RefreshFailed(msg.clone())),
            Error::Protocol(e) => Error::Protocol(ProtocolError::RefreshFailed(e.to_string())),
        }
    }
}

impl From<InMemoryError> for Error {
    fn from(value: InMemoryError) -> Self {
        match value {
            Error::HttpError(r) => {
                let (parts, body) = r.into_parts();
                Error::HttpError(Response::from_parts(parts, body.into()))
            }
            Error::Protocol(e) => Error::Protocol(e),
        }
    }
}

impl<T: Debug> Debug for Error<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Protocol(e) => write!(f, "ProtocolError({e:?})"),
            Error::HttpError(r) => write!(
                f,
                "HttpError {{ status: {}, headers: {:?}, body: {:?} }}",
                r.status(),
                r.headers(),
                r.body()
            ),
        }
    }
}

impl<T: Debug> Display for Error<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Protocol(e) => write!(f, "{e}"),
            Error::HttpError(r) => write!(f, "HttpError {{ status: {}, body: {:?} }}", r.status(), r.body()),
        }
    }
}

impl<T: Debug> StdError for Error<T> {}

impl<T> From<ProtocolError> for Error<T> {
    fn from(value: ProtocolError) -> Self {
        Error::Protocol(value)
    }
}

impl<T> From<serde_json::Error> for Error<T> {
    fn from(value: serde_json::Error) -> Self {
        Error::Protocol(ProtocolError::Json(value))
    }
}

impl<T> From<std::io::Error> for Error<T> {
    fn from(value: std::io::Error) -> Self {
        Error::Protocol(ProtocolError::Io(value))
    }
}

impl<T> From<hyper::Error> for Error<T> {
    fn from(value: hyper::Error) -> Self {
        Error::Protocol(ProtocolError::HttpProtocol(value))
    }
}

impl<T> From<hyper_util::client::legacy::Error> for Error<T> {
    fn from(value: hyper_util::client::legacy::Error) -> Self {
        Error::Protocol(ProtocolError::Connection(value))
    }
}

impl<T> From<FromUtf8Error> for Error<T> {
    fn from(value: FromUtf8Error) -> Self {
        Error::Protocol(ProtocolError::Utf8(value))
    }
}

impl<T> From<http::uri::InvalidUri> for Error<T> {
    fn from(value: http::uri::InvalidUri) -> Self {
        Error::Protocol(ProtocolError::InvalidUri(value))
    }
}

impl From<hyper::Error> for ProtocolError {
    fn from(value: hyper::Error) -> Self {
        Self::HttpProtocol(value)
    }
}

impl From<serde_json::Error> for ProtocolError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<FromUtf8Error> for ProtocolError {
    fn from(value: FromUtf8Error) -> Self {
        Self::Utf8(value)
    }
}
