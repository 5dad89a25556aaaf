use bytes::Bytes;
use http::{HeaderMap, Method, Uri, Version};
use http_body_util::Full;

pub use builder::RequestBuilder;
pub use memory::*;

use crate::body::InMemoryBody;
use crate::error::ProtocolError;

mod builder;
mod memory;

#[derive(Debug)]
pub struct Request<B = InMemoryBody> {
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
    pub headers: HeaderMap,
    pub body: B,
}

impl<B> Request<B> {
    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn host(&self) -> &str {
        self.uri.host().unwrap_or("")
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &B {
        &self.body
    }

    pub fn into_body(self) -> B {
        self.body
    }
}

impl TryFrom<InMemoryRequest> for http::Request<Full<Bytes>> {
    type Error = ProtocolError;

    fn try_from(value: InMemoryRequest) -> Result<Self, Self::Error> {
        let mut request = http::Request::new(Full::try_from(value.body)?);
        *request.method_mut() = value.method;
        *request.uri_mut() = value.uri;
        *request.version_mut() = value.version;
        *request.headers_mut() = value.headers;
        Ok(request)
    }
}
