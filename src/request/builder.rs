use std::borrow::Cow;
use std::future::IntoFuture;
use std::str::FromStr;

use futures::future::BoxFuture;
use http::header::HeaderName;
use http::uri::PathAndQuery;
use http::{HeaderMap, HeaderValue, Method, Uri, Version};
use serde::Serialize;
use serde_json::Value;

use crate::error::ProtocolError;
use crate::response::{InMemoryResponse, ResponseExt};
use crate::{Client, InMemoryBody, InMemoryRequest, InMemoryResult, Request, Response};

/// Builds a request. Invalid headers or query values don't panic: the first error is kept and returned
/// by `send`/`try_build`.
#[derive(Debug)]
pub struct RequestBuilder<'a, C = Client> {
    client: &'a C,

    pub version: Version,
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Option<InMemoryBody>,
    error: Option<ProtocolError>,
}

impl<'a, C> RequestBuilder<'a, C> {
    pub fn new(client: &'a C, method: Method, uri: Uri) -> Self {
        RequestBuilder {
            client,
            version: Default::default(),
            method,
            uri,
            headers: Default::default(),
            body: Default::default(),
            error: None,
        }
    }

    pub(crate) fn with_error(mut self, error: ProtocolError) -> Self {
        self.error.get_or_insert(error);
        self
    }

    pub fn header(mut self, key: &str, value: &str) -> Self {
        match (HeaderName::from_str(key), HeaderValue::from_str(value)) {
            (Ok(k), Ok(v)) => {
                self.headers.insert(k, v);
                self
            }
            _ => self.with_error(ProtocolError::InvalidRequest(format!("invalid header `{key}`"))),
        }
    }

    pub fn headers<S: AsRef<str>, I: Iterator<Item = (S, S)>>(mut self, headers: I) -> Self {
        for (k, v) in headers {
            self = self.header(k.as_ref(), v.as_ref());
        }
        self
    }

    pub fn bearer_auth(self, token: &str) -> Self {
        self.header(http::header::AUTHORIZATION.as_str(), &format!("Bearer {token}"))
    }

    /// Overwrite the current body with the provided JSON object.
    pub fn set_json<S: Serialize>(mut self, obj: S) -> Self {
        match serde_json::to_value(obj) {
            Ok(value) => {
                self.body = Some(InMemoryBody::Json(value));
                self.headers
                    .entry(http::header::CONTENT_TYPE)
                    .or_insert(HeaderValue::from_static("application/json"));
                self.headers
                    .entry(http::header::ACCEPT)
                    .or_insert(HeaderValue::from_static("application/json"));
                self
            }
            Err(e) => self.with_error(e.into()),
        }
    }

    /// Add the provided JSON object to the current body.
    pub fn json<S: Serialize>(mut self, obj: S) -> Self {
        if !matches!(self.body, Some(InMemoryBody::Json(Value::Object(_)))) {
            return self.set_json(obj);
        }
        let obj = match serde_json::to_value(obj) {
            Ok(Value::Object(obj)) => obj,
            Ok(_) => return self.with_error(ProtocolError::InvalidRequest("tried to merge a non-object into a json body".to_string())),
            Err(e) => return self.with_error(e.into()),
        };
        if let Some(InMemoryBody::Json(Value::Object(body))) = self.body.as_mut() {
            body.extend(obj);
        }
        self
    }

    /// Sets content-type to `text/plain` and the body to the supplied text.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.body = Some(InMemoryBody::Text(text.into()));
        self.headers
            .entry(http::header::CONTENT_TYPE)
            .or_insert(HeaderValue::from_static("text/plain"));
        self
    }

    /// Sets content-type to `application/octet-stream` and the body to the supplied bytes.
    pub fn bytes(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.body = Some(InMemoryBody::Bytes(bytes.into()));
        self.headers
            .entry(http::header::CONTENT_TYPE)
            .or_insert(HeaderValue::from_static("application/octet-stream"));
        self
    }

    /// Warning: Does not set content-type!
    pub fn body(mut self, body: InMemoryBody) -> Self {
        self.body = Some(body);
        self
    }

    /// Add a url query parameter, but keep existing parameters.
    pub fn query(self, k: &str, v: &str) -> Self {
        let pair = format!("{}={}", urlencoding::encode(k), urlencoding::encode(v));
        let query = match self.uri.query() {
            Some(q) if !q.is_empty() => format!("{q}&{pair}"),
            _ => pair,
        };
        self.replace_query(&query)
    }

    /// Overwrite the query with the provided value, which must serialize to a flat object.
    pub fn set_query<S: Serialize>(self, obj: S) -> Self {
        let map = match serde_json::to_value(obj) {
            Ok(Value::Object(map)) => map,
            Ok(_) => return self.with_error(ProtocolError::InvalidRequest("query must be an object".to_string())),
            Err(e) => return self.with_error(e.into()),
        };
        let mut pairs = Vec::with_capacity(map.len());
        for (k, v) in &map {
            let v = match v {
                Value::String(s) => Cow::Borrowed(s.as_str()),
                Value::Number(n) => Cow::Owned(n.to_string()),
                Value::Bool(b) => Cow::Owned(b.to_string()),
                Value::Null => continue,
                _ => return self.with_error(ProtocolError::InvalidRequest(format!("query value for `{k}` is not a scalar"))),
            };
            pairs.push(format!("{}={}", urlencoding::encode(k), urlencoding::encode(&v)));
        }
        let query = pairs.join("&");
        self.replace_query(&query)
    }

    fn replace_query(mut self, query: &str) -> Self {
        let mut parts = std::mem::take(&mut self.uri).into_parts();
        let path = parts.path_and_query.as_ref().map_or("/", PathAndQuery::path).to_string();
        let pq = if query.is_empty() { path } else { format!("{path}?{query}") };
        match PathAndQuery::from_str(&pq) {
            Ok(pq) => parts.path_and_query = Some(pq),
            Err(e) => return self.with_error(ProtocolError::InvalidRequest(e.to_string())),
        }
        match Uri::from_parts(parts) {
            Ok(uri) => {
                self.uri = uri;
                self
            }
            Err(e) => self.with_error(ProtocolError::InvalidRequest(e.to_string())),
        }
    }

    pub fn try_build(self) -> Result<InMemoryRequest, ProtocolError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        Ok(Request {
            method: self.method,
            uri: self.uri,
            version: self.version,
            headers: self.headers,
            body: self.body.unwrap_or_default(),
        })
    }
}

impl<'a> RequestBuilder<'a> {
    /// Run the request through the client's middlewares. 4xx and 5xx responses are returned as `Error::HttpError`.
    pub async fn send(self) -> crate::Result<Response> {
        let client = self.client;
        let request = self.try_build()?;
        client.execute(request).await?.error_for_status()
    }

    /// Like `send`, but the body (of the response or of the error) is read before returning.
    pub async fn send_awaiting_body(self) -> InMemoryResult<InMemoryResponse> {
        match self.send().await {
            Ok(res) => res.into_memory().await.map_err(Into::into),
            Err(e) => Err(e.into_memory().await),
        }
    }
}

impl<'a> IntoFuture for RequestBuilder<'a, Client> {
    type Output = crate::Result<Response>;
    type IntoFuture = BoxFuture<'a, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.send())
    }
}
