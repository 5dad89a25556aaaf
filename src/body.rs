use bytes::Bytes;
use http::HeaderMap;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use serde_json::Value;

pub use memory::*;

use crate::error::ProtocolError;

mod memory;

/// A body is either buffered, or still streaming from the network.
#[derive(Debug)]
pub enum Body {
    InMemory(InMemoryBody),
    Hyper(Incoming),
}

impl Default for Body {
    fn default() -> Self {
        Body::InMemory(InMemoryBody::Empty)
    }
}

impl Body {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Body::InMemory(m) => m.is_empty(),
            Body::Hyper(_) => false,
        }
    }

    /// Read the full body. JSON content is parsed into `InMemoryBody::Json`, everything else becomes text,
    /// or bytes when it isn't valid UTF-8.
    pub async fn into_memory(self) -> Result<InMemoryBody, ProtocolError> {
        self.into_memory_with(None).await
    }

    pub(crate) async fn into_memory_with(self, headers: Option<&HeaderMap>) -> Result<InMemoryBody, ProtocolError> {
        match self {
            Body::InMemory(m) => Ok(m),
            Body::Hyper(incoming) => {
                let bytes = incoming.collect().await?.to_bytes();
                if bytes.is_empty() {
                    return Ok(InMemoryBody::Empty);
                }
                let content_type = headers
                    .and_then(|h| h.get(http::header::CONTENT_TYPE))
                    .and_then(|ct| ct.to_str().ok())
                    .and_then(|ct| ct.split(';').next())
                    .map(str::trim);
                let is_json = content_type.map_or(true, |ct| ct == "application/json" || ct.ends_with("+json"));
                if is_json {
                    if let Ok(value) = serde_json::from_slice::<Value>(&bytes) {
                        return Ok(InMemoryBody::Json(value));
                    }
                }
                match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => Ok(InMemoryBody::Text(text)),
                    Err(e) => Ok(InMemoryBody::Bytes(e.into_bytes())),
                }
            }
        }
    }
}

impl From<InMemoryBody> for Body {
    fn from(value: InMemoryBody) -> Self {
        Body::InMemory(value)
    }
}

impl From<Incoming> for Body {
    fn from(value: Incoming) -> Self {
        Body::Hyper(value)
    }
}

impl TryFrom<InMemoryBody> for Full<Bytes> {
    type Error = ProtocolError;

    fn try_from(value: InMemoryBody) -> Result<Self, Self::Error> {
        let bytes: Bytes = match value {
            InMemoryBody::Empty => Bytes::new(),
            InMemoryBody::Bytes(b) => Bytes::from(b),
            InMemoryBody::Text(s) => Bytes::from(s),
            InMemoryBody::Json(v) => Bytes::from(serde_json::to_vec(&v)?),
        };
        Ok(Full::new(bytes))
    }
}
