use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;

pub use memory::*;

use crate::body::Body;
use crate::error::ProtocolError;
use crate::{InMemoryResult, Result};

mod memory;

pub type Response<B = Body> = http::Response<B>;

#[async_trait]
pub trait ResponseExt
where
    Self: Sized,
{
    fn error_for_status(self) -> Result<Self>;
    /// Read the whole body into memory.
    async fn into_memory(self) -> std::result::Result<InMemoryResponse, ProtocolError>;
    async fn text(self) -> InMemoryResult<String>;
    async fn json<U: DeserializeOwned>(self) -> InMemoryResult<U>;
    /// Get body as bytes.
    async fn bytes(self) -> InMemoryResult<Bytes>;
}

#[async_trait]
impl ResponseExt for Response<Body> {
    fn error_for_status(self) -> Result<Self> {
        let status = self.status();
        if status.is_server_error() || status.is_client_error() {
            Err(crate::Error::HttpError(self))
        } else {
            Ok(self)
        }
    }

    async fn into_memory(self) -> std::result::Result<InMemoryResponse, ProtocolError> {
        let (parts, body) = self.into_parts();
        let body = body.into_memory_with(Some(&parts.headers)).await?;
        Ok(InMemoryResponse::from_parts(parts, body))
    }

    async fn text(self) -> InMemoryResult<String> {
        let (_, body) = self.into_parts();
        let body = body.into_memory().await?;
        body.text()
    }

    async fn json<U: DeserializeOwned>(self) -> InMemoryResult<U> {
        let (_, body) = self.into_parts();
        let body = body.into_memory().await?;
        body.json().map_err(Into::into)
    }

    async fn bytes(self) -> InMemoryResult<Bytes> {
        let (_, body) = self.into_parts();
        let body = body.into_memory().await?;
        body.bytes()
    }
}
