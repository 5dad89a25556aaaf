//! HTTP client for the HRMS API, with middleware.
//!
//! Requests pass through an ordered stack of [`Middleware`]s before reaching the network.
//! [`session::SessionAuth`] authorizes them and transparently renews expired access tokens.
pub use body::{Body, InMemoryBody};
pub use client::Client;
pub use config::ApiConfig;
pub use error::{Error, InMemoryError, InMemoryResult, ProtocolError, Result};
pub use http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
pub use middleware::{Logger, Middleware, Next};
pub use request::{InMemoryRequest, Request, RequestBuilder};
pub use response::{InMemoryResponse, InMemoryResponseExt, Response, ResponseExt};

mod body;
mod client;
mod config;
mod error;
pub mod middleware;
mod request;
mod response;
mod sanitize;
pub mod session;
