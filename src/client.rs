use std::fmt::Formatter;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use http::{Method, Uri};
use http_body_util::Full;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use tracing::trace;

use crate::error::ProtocolError;
use crate::middleware::{Middleware, MiddlewareStack, Next};
use crate::{Body, InMemoryRequest, RequestBuilder, Response, Result};

type Transport = hyper_util::client::legacy::Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

static TRANSPORT: OnceLock<std::result::Result<Transport, String>> = OnceLock::new();

fn transport() -> std::result::Result<&'static Transport, ProtocolError> {
    let transport = TRANSPORT.get_or_init(|| {
        // errors when a provider was already installed by the host, which is fine
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
        let https = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .map_err(|e| format!("unable to load native root certificates: {e}"))?
            .https_or_http()
            .enable_http1()
            .build();
        Ok(hyper_util::client::legacy::Client::builder(TokioExecutor::new()).build(https))
    });
    transport
        .as_ref()
        .map_err(|msg| ProtocolError::Io(std::io::Error::other(msg.clone())))
}

static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

pub struct Client {
    base_url: Option<String>,
    default_headers: Vec<(String, String)>,
    pub(crate) middlewares: MiddlewareStack,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Client {{ base_url: {:?} }}", self.base_url)
    }
}

impl Client {
    pub fn new() -> Self {
        Client {
            base_url: None,
            default_headers: vec![("User-Agent".to_string(), APP_USER_AGENT.to_string())],
            middlewares: Vec::new(),
        }
    }

    /// Set a `base_url` so you can pass relative paths instead of full URLs.
    pub fn base_url(mut self, base_url: &str) -> Self {
        self.base_url = Some(base_url.trim_end_matches('/').to_string());
        self
    }

    /// Middlewares run in the order they are added. The last one is closest to the network.
    pub fn with_middleware<T: Middleware + 'static>(mut self, middleware: T) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    /// Add a middleware that is shared with other owners, e.g. to inspect its state later.
    pub fn with_shared_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    pub fn no_default_headers(mut self) -> Self {
        self.default_headers = Vec::new();
        self
    }

    pub fn default_headers<S: AsRef<str>, I: Iterator<Item = (S, S)>>(mut self, headers: I) -> Self {
        self.default_headers
            .extend(headers.map(|(k, v)| (k.as_ref().to_string(), v.as_ref().to_string())));
        self
    }

    pub fn default_header<S: AsRef<str>>(mut self, key: S, value: S) -> Self {
        self.default_headers
            .push((key.as_ref().to_string(), value.as_ref().to_string()));
        self
    }

    fn build_uri(&self, uri_or_path: &str) -> std::result::Result<Uri, http::uri::InvalidUri> {
        if let Ok(uri) = Uri::from_str(uri_or_path) {
            if uri.scheme().is_some() && uri.host().is_some() {
                return Ok(uri);
            }
        }
        match &self.base_url {
            Some(base) if uri_or_path.starts_with('/') => Uri::from_str(&format!("{base}{uri_or_path}")),
            Some(base) => Uri::from_str(&format!("{base}/{uri_or_path}")),
            None => Uri::from_str(uri_or_path),
        }
    }

    pub fn request(&self, method: Method, uri_or_path: &str) -> RequestBuilder {
        let builder = match self.build_uri(uri_or_path) {
            Ok(uri) => RequestBuilder::new(self, method, uri),
            Err(e) => RequestBuilder::new(self, method, Uri::default()).with_error(ProtocolError::InvalidUri(e)),
        };
        builder.headers(self.default_headers.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }

    pub fn get(&self, uri_or_path: &str) -> RequestBuilder {
        self.request(Method::GET, uri_or_path)
    }

    pub fn post(&self, uri_or_path: &str) -> RequestBuilder {
        self.request(Method::POST, uri_or_path)
    }

    pub fn put(&self, uri_or_path: &str) -> RequestBuilder {
        self.request(Method::PUT, uri_or_path)
    }

    pub fn patch(&self, uri_or_path: &str) -> RequestBuilder {
        self.request(Method::PATCH, uri_or_path)
    }

    pub fn delete(&self, uri_or_path: &str) -> RequestBuilder {
        self.request(Method::DELETE, uri_or_path)
    }

    /// Run a built request through the middlewares. Unlike `RequestBuilder::send`, error statuses are returned as `Ok`.
    pub async fn execute(&self, request: InMemoryRequest) -> Result {
        let next = Next {
            client: self,
            middlewares: self.middlewares.as_slice(),
        };
        next.run(request).await
    }

    /// Send the request over the network. Middlewares are not run.
    pub(crate) async fn send_request(&self, request: InMemoryRequest) -> Result {
        trace!(method = %request.method(), url = %request.uri(), "sending request");
        let request: http::Request<Full<Bytes>> = request.try_into()?;
        let res = transport()?.request(request).await?;
        let (parts, body) = res.into_parts();
        Ok(Response::from_parts(parts, Body::Hyper(body)))
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}
