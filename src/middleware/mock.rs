use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use http::{HeaderMap, StatusCode};
use serde::Serialize;

use crate::middleware::{Middleware, Next};
use crate::response::{make_response, InMemoryResponseExt};
use crate::{InMemoryBody, InMemoryRequest, InMemoryResponse, Result};

type Handler = Box<dyn Fn(InMemoryRequest) -> BoxFuture<'static, InMemoryResponse> + Send + Sync>;

/// Terminal middleware that answers every request from `handler` instead of the network,
/// and records each request it receives.
pub struct Mock {
    handler: Handler,
    requests: Mutex<Vec<InMemoryRequest>>,
}

impl Debug for Mock {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mock")
            .field("requests", &self.requests)
            .finish()
    }
}

impl Mock {
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(InMemoryRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = InMemoryResponse> + Send + 'static,
    {
        Self {
            handler: Box::new(move |request| handler(request).boxed()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every request seen so far, in arrival order.
    pub fn requests(&self) -> Vec<InMemoryRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Requests seen so far whose path contains `path`.
    pub fn requests_to(&self, path: &str) -> Vec<InMemoryRequest> {
        self.requests().into_iter().filter(|r| r.path().contains(path)).collect()
    }
}

/// A response with a JSON body.
pub fn json_response(status: StatusCode, body: impl Serialize) -> InMemoryResponse {
    let body = InMemoryBody::new_json(body).unwrap_or_default();
    let mut headers = HeaderMap::new();
    headers.insert(http::header::CONTENT_TYPE, http::HeaderValue::from_static("application/json"));
    make_response(status, headers, body)
}

#[async_trait]
impl Middleware for Mock {
    async fn handle(&self, request: InMemoryRequest, _next: Next<'_>) -> Result {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        let response = (self.handler)(request).await;
        Ok(response.into_body_response())
    }
}
