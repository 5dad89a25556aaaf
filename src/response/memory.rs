use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;

use crate::sanitize::sanitize_headers;
use crate::{Body, InMemoryBody, InMemoryResult, Response};

pub type InMemoryResponse = Response<InMemoryBody>;

pub fn make_response(status: StatusCode, headers: HeaderMap, body: InMemoryBody) -> InMemoryResponse {
    let mut res = InMemoryResponse::new(body);
    *res.status_mut() = status;
    *res.headers_mut() = headers;
    res
}

pub fn clone_inmemory_response(res: &InMemoryResponse) -> InMemoryResponse {
    let mut copy = make_response(res.status(), res.headers().clone(), res.body().clone());
    *copy.version_mut() = res.version();
    copy
}

pub trait InMemoryResponseExt {
    fn text(self) -> InMemoryResult<String>;
    fn json<U: DeserializeOwned>(self) -> InMemoryResult<U>;
    fn bytes(self) -> InMemoryResult<Bytes>;
    fn error_for_status(self) -> InMemoryResult<InMemoryResponse>;
    /// A copy that is safe to log.
    fn sanitized(&self) -> InMemoryResponse;
    fn into_body_response(self) -> Response<Body>;
}

impl InMemoryResponseExt for InMemoryResponse {
    fn text(self) -> InMemoryResult<String> {
        self.into_body().text()
    }

    fn json<U: DeserializeOwned>(self) -> InMemoryResult<U> {
        self.into_body().json().map_err(Into::into)
    }

    fn bytes(self) -> InMemoryResult<Bytes> {
        self.into_body().bytes()
    }

    fn error_for_status(self) -> InMemoryResult<InMemoryResponse> {
        let status = self.status();
        if status.is_server_error() || status.is_client_error() {
            Err(crate::Error::HttpError(self))
        } else {
            Ok(self)
        }
    }

    fn sanitized(&self) -> InMemoryResponse {
        let mut copy = clone_inmemory_response(self);
        sanitize_headers(copy.headers_mut());
        copy.body_mut().sanitize();
        copy
    }

    fn into_body_response(self) -> Response<Body> {
        let (parts, body) = self.into_parts();
        Response::from_parts(parts, body.into())
    }
}
