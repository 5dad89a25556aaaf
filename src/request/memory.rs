use std::str::FromStr;

use http::header::HeaderName;
use http::{HeaderMap, HeaderValue, Method, Uri};

use crate::sanitize::sanitize_headers;
use crate::{InMemoryBody, Request};

pub type InMemoryRequest = Request<InMemoryBody>;

impl InMemoryRequest {
    /// Build a bare request, for tests and mocks.
    /// # Panics
    /// Panics if `method` or `url` don't parse.
    pub fn test(method: &str, url: &str) -> Self {
        Self {
            method: Method::from_str(&method.to_uppercase()).expect("invalid method"),
            uri: Uri::from_str(url).expect("invalid url"),
            version: Default::default(),
            headers: Default::default(),
            body: InMemoryBody::Empty,
        }
    }

    pub fn set_body(mut self, body: InMemoryBody) -> Self {
        self.body = body;
        self
    }

    pub fn set_header(mut self, key: impl Into<HeaderName>, value: impl Into<HeaderValue>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn set_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn set_url(mut self, uri: Uri) -> Self {
        self.uri = uri;
        self
    }

    /// The bearer token in the `Authorization` header, if any.
    pub fn bearer_token(&self) -> Option<&str> {
        self.headers
            .get(http::header::AUTHORIZATION)?
            .to_str()
            .ok()?
            .strip_prefix("Bearer ")
    }

    /// A copy that is safe to log.
    pub fn sanitized(&self) -> Self {
        let mut copy = self.clone();
        sanitize_headers(&mut copy.headers);
        copy.body.sanitize();
        copy
    }
}

impl Clone for InMemoryRequest {
    fn clone(&self) -> Self {
        Self {
            method: self.method.clone(),
            uri: self.uri.clone(),
            version: self.version,
            headers: self.headers.clone(),
            body: self.body.clone(),
        }
    }
}

impl PartialEq for InMemoryRequest {
    fn eq(&self, other: &Self) -> bool {
        self.method == other.method && self.uri == other.uri && self.headers == other.headers && self.body == other.body
    }
}
