use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

#[cfg(any(test, feature = "mock"))]
pub use mock::{json_response, Mock};

use crate::client::Client;
use crate::response::{InMemoryResponseExt, ResponseExt};
use crate::{Error, InMemoryRequest, Result};

#[cfg(any(test, feature = "mock"))]
mod mock;

pub type MiddlewareStack = Vec<Arc<dyn Middleware>>;

/// The rest of the middleware stack. Running it with an empty stack sends the request over the network.
#[derive(Debug, Copy, Clone)]
pub struct Next<'a> {
    pub client: &'a Client,
    pub(crate) middlewares: &'a [Arc<dyn Middleware>],
}

impl Next<'_> {
    pub async fn run(self, request: InMemoryRequest) -> Result {
        if let Some((middleware, rest)) = self.middlewares.split_first() {
            let next = Next {
                client: self.client,
                middlewares: rest,
            };
            middleware.handle(request, next).await
        } else {
            self.client.send_request(request).await
        }
    }
}

#[async_trait]
pub trait Middleware: Send + Sync + Debug {
    async fn handle(&self, request: InMemoryRequest, next: Next<'_>) -> Result {
        next.run(request).await
    }
}

/// Logs requests and responses at `debug` level. Tokens, passwords and cookies are redacted.
#[derive(Debug, Default, Clone, Copy)]
pub struct Logger;

#[async_trait]
impl Middleware for Logger {
    async fn handle(&self, request: InMemoryRequest, next: Next<'_>) -> Result {
        let url = request.uri().to_string();
        let logged = request.sanitized();
        debug!(
            method = %logged.method(),
            url = %url,
            headers = ?logged.headers(),
            body = ?logged.body(),
            ">>> request"
        );
        let (res, is_error) = match next.run(request).await {
            Ok(res) => (res, false),
            Err(Error::HttpError(res)) => (res, true),
            Err(Error::Protocol(e)) => {
                debug!(url = %url, error = %e, "<<< request failed");
                return Err(Error::Protocol(e));
            }
        };
        let res = res.into_memory().await?;
        let logged = res.sanitized();
        debug!(
            url = %url,
            status = %logged.status(),
            headers = ?logged.headers(),
            body = ?logged.body(),
            "<<< response"
        );
        let res = res.into_body_response();
        if is_error {
            Err(Error::HttpError(res))
        } else {
            Ok(res)
        }
    }
}
