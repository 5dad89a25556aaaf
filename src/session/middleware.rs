use std::collections::VecDeque;
use std::fmt::{Debug, Formatter};
use std::pin::pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::Poll;

use async_trait::async_trait;
use futures::channel::oneshot;
use http::{header, HeaderValue, Method, StatusCode};
use tracing::{debug, info, warn};

use super::refresh::{RefreshRequest, RefreshResponse};
use super::{Credential, CredentialStore, Navigator, NoopNavigator, SessionConfig};
use crate::error::ProtocolError;
use crate::response::{InMemoryResponseExt, ResponseExt};
use crate::{Error, InMemoryRequest, Middleware, Next, Result};

type Waiter = oneshot::Sender<std::result::Result<(String, Turn), Error>>;

/// A place in the replay order. Wait for `after`, start the replay, then signal `done`.
/// A dropped predecessor closes `after`, which frees the turn as well.
struct Turn {
    after: Option<oneshot::Receiver<()>>,
    done: oneshot::Sender<()>,
}

/// Refresh bookkeeping. `queue` is only non-empty while `refreshing` is set.
#[derive(Default)]
struct RefreshState {
    refreshing: bool,
    queue: VecDeque<Waiter>,
}

/// Authorizes requests with the stored access token, and renews it when the API answers 401.
///
/// Only one refresh call is made per expiry, however many requests hit the 401. Requests that fail
/// while a refresh is running wait for it, then are replayed in arrival order with the new token.
/// A replayed request that fails again is returned as-is. If the session can't be renewed, the
/// store is cleared and the [`Navigator`] is sent to the login screen.
///
/// The refresh call goes to the rest of the middleware stack, not through this middleware again.
pub struct SessionAuth {
    config: SessionConfig,
    store: Arc<dyn CredentialStore>,
    navigator: Arc<dyn Navigator>,
    state: Mutex<RefreshState>,
}

impl Debug for SessionAuth {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("SessionAuth")
            .field("config", &self.config)
            .field("store", &self.store)
            .field("navigator", &self.navigator)
            .field("refreshing", &state.refreshing)
            .field("queued", &state.queue.len())
            .finish()
    }
}

impl SessionAuth {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self {
            config: SessionConfig::default(),
            store,
            navigator: Arc::new(NoopNavigator),
            state: Mutex::new(RefreshState::default()),
        }
    }

    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = navigator;
        self
    }

    pub fn is_refreshing(&self) -> bool {
        self.state().refreshing
    }

    /// Number of requests waiting on the running refresh.
    pub fn queued(&self) -> usize {
        self.state().queue.len()
    }

    fn state(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn authorize(&self, mut request: InMemoryRequest, access_token: Option<&str>) -> Result<InMemoryRequest> {
        if let Some(token) = access_token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| ProtocolError::InvalidRequest("access token is not a valid header value".to_string()))?;
            request.headers_mut().insert(header::AUTHORIZATION, value);
        }
        Ok(request)
    }

    fn is_login_request(&self, request: &InMemoryRequest) -> bool {
        request.path().contains(self.config.login_endpoint.as_str())
    }

    /// Either claim the refresh (`None`), or join the queue of the one already running.
    /// Must not await: the check and the claim/enqueue are one step.
    fn claim_or_wait(&self) -> Option<oneshot::Receiver<std::result::Result<(String, Turn), Error>>> {
        let mut state = self.state();
        if state.refreshing {
            let (tx, rx) = oneshot::channel();
            state.queue.push_back(tx);
            Some(rx)
        } else {
            state.refreshing = true;
            None
        }
    }

    /// End the refresh cycle: reset the flag and hand back the waiters, in arrival order.
    fn release(&self) -> VecDeque<Waiter> {
        let mut state = self.state();
        state.refreshing = false;
        std::mem::take(&mut state.queue)
    }

    /// Exchange the refresh token for a new access token. Any non-2xx answer is an error.
    async fn refresh(&self, refresh_token: &str, next: Next<'_>) -> Result<RefreshResponse> {
        let request = next
            .client
            .request(Method::POST, &self.config.refresh_endpoint)
            .set_json(RefreshRequest { refresh: refresh_token })
            .try_build()?;
        let res = match next.run(request).await {
            Ok(res) => res,
            Err(e) => return Err(e.into_memory().await.into()),
        };
        let res = res.into_memory().await?.error_for_status()?;
        Ok(res.json()?)
    }

    /// Must run before the refresh cycle is released, so a 401 arriving afterwards can't pick up
    /// the rejected refresh token.
    fn clear_session(&self) {
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "unable to clear credential store");
        }
    }

    fn redirect_to_login(&self) {
        if self.navigator.current_location() == self.config.login_location {
            debug!("already on the login screen, not redirecting");
        } else {
            self.navigator.redirect_to_login();
        }
    }

    fn persist(&self, data: &RefreshResponse) {
        let saved = match &data.refresh {
            Some(rotated) => {
                let profile = self.store.profile();
                self.store.save(Credential::new(data.access.clone(), Some(rotated.clone()), profile))
            }
            None => self.store.set_access_token(&data.access),
        };
        if let Err(e) = saved {
            warn!(error = %e, "unable to persist refreshed access token");
        }
    }

    /// Replays skip this middleware, so a second 401 goes straight back to the caller.
    /// Each replay is started only once the one before it in arrival order has been sent.
    async fn replay(&self, request: InMemoryRequest, access_token: &str, next: Next<'_>, turn: Turn) -> Result {
        let Turn { after, done } = turn;
        let request = self.authorize(request, Some(access_token))?;
        if let Some(after) = after {
            let _ = after.await;
        }
        let mut sent = pin!(next.run(request));
        let first = futures::poll!(sent.as_mut());
        let _ = done.send(());
        match first {
            Poll::Ready(res) => res,
            Poll::Pending => sent.await,
        }
    }
}

/// Settles the refresh cycle exactly once. Dropped without `settle` (the owning future was
/// cancelled), it still resets the flag; the waiters see their channel close.
struct RefreshGuard<'a> {
    auth: &'a SessionAuth,
    settled: bool,
}

impl RefreshGuard<'_> {
    /// Wake the waiters in arrival order. On success each gets the turn after the one before it,
    /// and the owner's replay, returned here, goes first.
    fn settle(mut self, outcome: std::result::Result<&str, &Error>) -> Turn {
        self.settled = true;
        let waiters = self.auth.release();
        debug!(waiters = waiters.len(), ok = outcome.is_ok(), "refresh settled");
        let (done, mut after) = oneshot::channel();
        let owner = Turn { after: None, done };
        for waiter in waiters {
            let message = match outcome {
                Ok(token) => {
                    let (done, next_after) = oneshot::channel();
                    let turn = Turn {
                        after: Some(std::mem::replace(&mut after, next_after)),
                        done,
                    };
                    Ok((token.to_string(), turn))
                }
                Err(e) => Err(e.duplicate()),
            };
            // the waiter may have been dropped; its turn goes with it
            let _ = waiter.send(message);
        }
        owner
    }
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!("token refresh abandoned");
            drop(self.auth.release());
        }
    }
}

fn is_unauthorized(res: &Result) -> bool {
    match res {
        Ok(res) => res.status() == StatusCode::UNAUTHORIZED,
        Err(e) => e.is_unauthorized(),
    }
}

#[async_trait]
impl Middleware for SessionAuth {
    async fn handle(&self, request: InMemoryRequest, next: Next<'_>) -> Result {
        let request = self.authorize(request, self.store.access_token().as_deref())?;
        let res = next.run(request.clone()).await;
        if !is_unauthorized(&res) || self.is_login_request(&request) {
            return res;
        }

        if let Some(waiter) = self.claim_or_wait() {
            debug!(url = %request.uri(), "refresh in progress, waiting");
            let (access_token, turn) = match waiter.await {
                Ok(outcome) => outcome?,
                Err(oneshot::Canceled) => {
                    return Err(ProtocolError::RefreshFailed("refresh was abandoned".to_string()).into())
                }
            };
            return self.replay(request, &access_token, next, turn).await;
        }

        let guard = RefreshGuard { auth: self, settled: false };
        let Some(refresh_token) = self.store.refresh_token() else {
            info!(url = %request.uri(), "access token rejected and no refresh token stored");
            self.clear_session();
            guard.settle(Err(&Error::Protocol(ProtocolError::MissingRefreshToken)));
            self.redirect_to_login();
            return res;
        };

        debug!(url = %request.uri(), "access token rejected, refreshing");
        match self.refresh(&refresh_token, next).await {
            Ok(data) => {
                self.persist(&data);
                let turn = guard.settle(Ok(&data.access));
                self.replay(request, &data.access, next, turn).await
            }
            Err(e) => {
                warn!(error = %e, "token refresh failed, ending session");
                self.clear_session();
                guard.settle(Err(&e));
                self.redirect_to_login();
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use serde_json::{json, Value};
    use tokio::sync::Notify;

    use crate::middleware::{json_response, Logger, Mock};
    use crate::session::MemoryStore;
    use crate::{Client, InMemoryBody, InMemoryResponseExt};

    use super::*;

    #[derive(Debug)]
    struct TestNavigator {
        location: Mutex<String>,
        redirects: AtomicUsize,
    }

    impl TestNavigator {
        fn at(location: &str) -> Arc<Self> {
            Arc::new(Self {
                location: Mutex::new(location.to_string()),
                redirects: AtomicUsize::new(0),
            })
        }

        fn redirects(&self) -> usize {
            self.redirects.load(Ordering::SeqCst)
        }
    }

    impl Navigator for TestNavigator {
        fn current_location(&self) -> String {
            self.location.lock().unwrap().clone()
        }

        fn redirect_to_login(&self) {
            self.redirects.fetch_add(1, Ordering::SeqCst);
            *self.location.lock().unwrap() = "/login".to_string();
        }
    }

    /// Protected endpoints accept only `Bearer a2`. The refresh endpoint answers after a delay.
    fn backend(refresh_status: StatusCode) -> Mock {
        Mock::new(move |req: InMemoryRequest| async move {
            match req.path() {
                "/api/auth/refresh/" => {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    let body: Value = req.body.clone().json().unwrap_or_default();
                    if refresh_status.is_success() && body["refresh"] == "r1" {
                        json_response(StatusCode::OK, json!({"access": "a2"}))
                    } else {
                        json_response(refresh_status, json!({"detail": "Token is invalid or expired", "code": "token_not_valid"}))
                    }
                }
                "/api/auth/login/" => json_response(StatusCode::UNAUTHORIZED, json!({"detail": "Invalid credentials."})),
                "/api/always-401/" => json_response(StatusCode::UNAUTHORIZED, json!({"detail": "Nope."})),
                path if req.bearer_token() == Some("a2") => json_response(StatusCode::OK, json!({
                    "path": path,
                    "method": req.method().as_str(),
                    "body": req.body.clone().json::<Value>().ok(),
                })),
                _ => json_response(StatusCode::UNAUTHORIZED, json!({"detail": "Given token not valid for any token type"})),
            }
        })
    }

    struct Harness {
        client: Client,
        auth: Arc<SessionAuth>,
        store: Arc<MemoryStore>,
        navigator: Arc<TestNavigator>,
        mock: Arc<Mock>,
    }

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    fn harness(credential: Credential, refresh_status: StatusCode, location: &str) -> Harness {
        init_tracing();
        let store = Arc::new(MemoryStore::with_credential(credential));
        let navigator = TestNavigator::at(location);
        let auth = Arc::new(SessionAuth::new(store.clone()).navigator(navigator.clone()));
        let mock = Arc::new(backend(refresh_status));
        let client = Client::new()
            .base_url("http://localhost:8000/api")
            .with_shared_middleware(auth.clone())
            .with_middleware(Logger)
            .with_shared_middleware(mock.clone());
        Harness { client, auth, store, navigator, mock }
    }

    fn expired_session() -> Credential {
        Credential::new("a1", Some("r1".to_string()), Some(json!({"id": 1, "username": "admin"})))
    }

    async fn get(client: &Client, path: &str) -> crate::InMemoryResult<Value> {
        let res = client.get(path).send_awaiting_body().await?;
        res.json()
    }

    #[tokio::test]
    async fn test_valid_token_passes_through() {
        let h = harness(Credential::new("a2", Some("r1".to_string()), None), StatusCode::OK, "/employees");
        let res = get(&h.client, "/employees/").await.unwrap();
        assert_eq!(res["path"], "/api/employees/");
        assert!(h.mock.requests_to("/auth/refresh/").is_empty());
        assert_eq!(h.mock.requests()[0].bearer_token(), Some("a2"));
    }

    #[tokio::test]
    async fn test_concurrent_401s_share_one_refresh() {
        let h = harness(expired_session(), StatusCode::OK, "/employees");
        let (a, b, c) = tokio::join!(
            get(&h.client, "/employees/"),
            get(&h.client, "/departments/"),
            get(&h.client, "/designations/"),
        );
        assert_eq!(a.unwrap()["path"], "/api/employees/");
        assert_eq!(b.unwrap()["path"], "/api/departments/");
        assert_eq!(c.unwrap()["path"], "/api/designations/");

        let refreshes = h.mock.requests_to("/auth/refresh/");
        assert_eq!(refreshes.len(), 1);
        assert_eq!(refreshes[0].body, InMemoryBody::Json(json!({"refresh": "r1"})));
        assert_eq!(refreshes[0].bearer_token(), None);
        assert_eq!(h.store.access_token().as_deref(), Some("a2"));
        assert_eq!(h.store.refresh_token().as_deref(), Some("r1"));
        assert!(!h.auth.is_refreshing());
        assert_eq!(h.auth.queued(), 0);
        assert_eq!(h.navigator.redirects(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_single_flight_across_threads() {
        let h = harness(expired_session(), StatusCode::OK, "/employees");
        let client = Arc::new(h.client);
        let tasks = (0..8)
            .map(|i| {
                let client = client.clone();
                tokio::spawn(async move { get(&client, &format!("/employees/{i}/")).await })
            })
            .collect::<Vec<_>>();
        for (i, task) in tasks.into_iter().enumerate() {
            let res = task.await.unwrap().unwrap();
            assert_eq!(res["path"], format!("/api/employees/{i}/"));
        }
        assert_eq!(h.mock.requests_to("/auth/refresh/").len(), 1);
    }

    #[tokio::test]
    async fn test_replays_follow_arrival_order() {
        let h = harness(expired_session(), StatusCode::OK, "/employees");
        let (a, b, c, d) = tokio::join!(
            get(&h.client, "/a/"),
            get(&h.client, "/b/"),
            get(&h.client, "/c/"),
            get(&h.client, "/d/"),
        );
        for res in [a, b, c, d] {
            res.unwrap();
        }
        let replayed = h.mock
            .requests()
            .into_iter()
            .filter(|r| r.bearer_token() == Some("a2"))
            .map(|r| r.path().to_string())
            .collect::<Vec<_>>();
        assert_eq!(replayed, ["/api/a/", "/api/b/", "/api/c/", "/api/d/"]);
    }

    /// Clearing takes a while, and signals `cleared` when it starts.
    #[derive(Debug)]
    struct SlowClearStore {
        inner: MemoryStore,
        cleared: Arc<Notify>,
    }

    impl CredentialStore for SlowClearStore {
        fn load(&self) -> Credential {
            self.inner.load()
        }

        fn save(&self, credential: Credential) -> std::io::Result<()> {
            self.inner.save(credential)
        }

        fn set_access_token(&self, token: &str) -> std::io::Result<()> {
            self.inner.set_access_token(token)
        }

        fn clear(&self) -> std::io::Result<()> {
            self.cleared.notify_one();
            std::thread::sleep(Duration::from_millis(50));
            self.inner.clear()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_rejected_refresh_token_is_not_reused() {
        init_tracing();
        let cleared = Arc::new(Notify::new());
        let store = Arc::new(SlowClearStore {
            inner: MemoryStore::with_credential(expired_session()),
            cleared: cleared.clone(),
        });
        let navigator = TestNavigator::at("/employees");
        let mock = Arc::new(Mock::new(move |req: InMemoryRequest| {
            let cleared = cleared.clone();
            async move {
                match req.path() {
                    "/api/auth/refresh/" => {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        json_response(StatusCode::UNAUTHORIZED, json!({"detail": "Token is blacklisted"}))
                    }
                    // answers only once teardown has begun
                    "/api/late/" => {
                        cleared.notified().await;
                        json_response(StatusCode::UNAUTHORIZED, json!({"detail": "Token expired"}))
                    }
                    _ => json_response(StatusCode::UNAUTHORIZED, json!({"detail": "Token expired"})),
                }
            }
        }));
        let client = Arc::new(
            Client::new()
                .base_url("http://localhost:8000/api")
                .with_middleware(SessionAuth::new(store.clone()).navigator(navigator.clone()))
                .with_shared_middleware(mock.clone()),
        );

        let early = tokio::spawn({
            let client = client.clone();
            async move { get(&client, "/employees/").await }
        });
        let late = tokio::spawn({
            let client = client.clone();
            async move { get(&client, "/late/").await }
        });
        assert!(early.await.unwrap().is_err());
        assert!(late.await.unwrap().is_err());

        let refreshes = mock.requests_to("/auth/refresh/");
        assert_eq!(refreshes.len(), 1);
        assert_eq!(refreshes[0].body, InMemoryBody::Json(json!({"refresh": "r1"})));
        assert!(store.load().is_empty());
        assert_eq!(navigator.redirects(), 1);
    }

    #[tokio::test]
    async fn test_replay_keeps_method_body_and_headers() {
        let h = harness(expired_session(), StatusCode::OK, "/attendance");
        let res = h.client
            .post("/attendance/")
            .header("x-request-id", "42")
            .json(json!({"employee": 7, "status": "present"}))
            .send_awaiting_body()
            .await
            .unwrap();
        assert_eq!(res.json::<Value>().unwrap()["body"], json!({"employee": 7, "status": "present"}));

        let sent = h.mock.requests_to("/attendance/");
        assert_eq!(sent.len(), 2);
        let (first, replay) = (&sent[0], &sent[1]);
        assert_eq!(first.bearer_token(), Some("a1"));
        assert_eq!(replay.bearer_token(), Some("a2"));
        assert_eq!(first.method(), replay.method());
        assert_eq!(first.uri(), replay.uri());
        assert_eq!(first.body, replay.body);
        assert_eq!(replay.headers()["x-request-id"], "42");
        let mut expected = first.clone();
        expected.headers_mut().insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer a2"));
        assert_eq!(&expected, replay);
    }

    #[tokio::test]
    async fn test_login_401_never_refreshes() {
        let h = harness(expired_session(), StatusCode::OK, "/login");
        let err = h.client
            .post("/auth/login/")
            .json(json!({"username": "admin", "password": "wrong"}))
            .send_awaiting_body()
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
        assert_eq!(err.detail().as_deref(), Some("Invalid credentials."));
        assert!(h.mock.requests_to("/auth/refresh/").is_empty());
        assert_eq!(h.store.access_token().as_deref(), Some("a1"));
    }

    #[tokio::test]
    async fn test_second_401_is_not_retried() {
        let h = harness(expired_session(), StatusCode::OK, "/employees");
        let err = get(&h.client, "/always-401/").await.unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
        assert_eq!(err.detail().as_deref(), Some("Nope."));
        assert_eq!(h.mock.requests_to("/always-401/").len(), 2);
        assert_eq!(h.mock.requests_to("/auth/refresh/").len(), 1);
        // the refresh itself worked, so the session stays
        assert_eq!(h.store.access_token().as_deref(), Some("a2"));
        assert_eq!(h.navigator.redirects(), 0);
    }

    #[tokio::test]
    async fn test_refresh_failure_ends_session_for_everyone() {
        let h = harness(expired_session(), StatusCode::UNAUTHORIZED, "/payroll");
        let (a, b, c) = tokio::join!(
            get(&h.client, "/payroll/"),
            get(&h.client, "/employees/"),
            get(&h.client, "/branches/"),
        );
        for res in [a, b, c] {
            let err = res.unwrap_err();
            assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
            assert_eq!(err.detail().as_deref(), Some("Token is invalid or expired"));
        }
        assert_eq!(h.mock.requests_to("/auth/refresh/").len(), 1);
        assert!(h.store.load().is_empty());
        assert_eq!(h.navigator.redirects(), 1);
        assert!(!h.auth.is_refreshing());
        // nothing was replayed
        assert_eq!(h.mock.requests().len(), 4);
    }

    #[tokio::test]
    async fn test_missing_refresh_token_redirects_without_refresh() {
        let h = harness(Credential::new("a1", None, Some(json!({"id": 1}))), StatusCode::OK, "/employees");
        let err = get(&h.client, "/employees/").await.unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
        assert_eq!(err.detail().as_deref(), Some("Given token not valid for any token type"));
        assert!(h.mock.requests_to("/auth/refresh/").is_empty());
        assert!(h.store.load().is_empty());
        assert_eq!(h.navigator.redirects(), 1);
        assert!(!h.auth.is_refreshing());

        // a new episode starts from scratch
        h.store.save(expired_session()).unwrap();
        get(&h.client, "/employees/").await.unwrap();
        assert_eq!(h.mock.requests_to("/auth/refresh/").len(), 1);
    }

    #[tokio::test]
    async fn test_no_redirect_when_already_on_login() {
        let h = harness(expired_session(), StatusCode::BAD_REQUEST, "/login");
        let err = get(&h.client, "/employees/").await.unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));
        assert!(h.store.load().is_empty());
        assert_eq!(h.navigator.redirects(), 0);

        let h = harness(Credential::default(), StatusCode::OK, "/login");
        get(&h.client, "/employees/").await.unwrap_err();
        assert_eq!(h.navigator.redirects(), 0);
    }

    #[tokio::test]
    async fn test_other_failures_pass_through() {
        let h = harness(expired_session(), StatusCode::OK, "/employees");
        let err = h.client.get("/auth/login/").send_awaiting_body().await.unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));

        let store = Arc::new(MemoryStore::with_credential(expired_session()));
        let mock = Arc::new(Mock::new(|_req: InMemoryRequest| async move {
            json_response(StatusCode::FORBIDDEN, json!({"detail": "You do not have permission to perform this action."}))
        }));
        let client = Client::new()
            .base_url("http://localhost:8000/api")
            .with_middleware(SessionAuth::new(store.clone()))
            .with_shared_middleware(mock.clone());
        let err = client.get("/payroll/").send_awaiting_body().await.unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::FORBIDDEN));
        assert_eq!(mock.requests().len(), 1);
        assert_eq!(store.access_token().as_deref(), Some("a1"));
    }

    #[tokio::test]
    async fn test_rotated_refresh_token_is_stored() {
        let store = Arc::new(MemoryStore::with_credential(expired_session()));
        let mock = Arc::new(Mock::new(|req: InMemoryRequest| async move {
            match (req.path(), req.bearer_token()) {
                ("/api/auth/refresh/", _) => json_response(StatusCode::OK, json!({"access": "a2", "refresh": "r2"})),
                (_, Some("a2")) => json_response(StatusCode::OK, json!({})),
                _ => json_response(StatusCode::UNAUTHORIZED, json!({})),
            }
        }));
        let client = Client::new()
            .base_url("http://localhost:8000/api")
            .with_middleware(SessionAuth::new(store.clone()))
            .with_shared_middleware(mock);
        get(&client, "/locations/").await.unwrap();
        assert_eq!(store.access_token().as_deref(), Some("a2"));
        assert_eq!(store.refresh_token().as_deref(), Some("r2"));
        assert_eq!(store.profile().unwrap()["username"], "admin");
    }

    #[tokio::test]
    async fn test_abandoned_refresh_releases_waiters() {
        let h = harness(expired_session(), StatusCode::OK, "/employees");
        let leader = get(&h.client, "/employees/");
        let follower = get(&h.client, "/departments/");
        let (leader_out, follower_out) = tokio::join!(
            tokio::time::timeout(Duration::from_millis(10), leader),
            follower,
        );
        // the leader was cancelled mid-refresh
        assert!(leader_out.is_err());
        let err = follower_out.unwrap_err();
        assert!(matches!(err, Error::Protocol(ProtocolError::RefreshFailed(_))));
        assert!(!h.auth.is_refreshing());
        assert_eq!(h.auth.queued(), 0);

        // the next expiry starts a fresh refresh
        let res = get(&h.client, "/employees/").await.unwrap();
        assert_eq!(res["path"], "/api/employees/");
    }
}
