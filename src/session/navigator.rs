use std::fmt::Debug;

use tracing::info;

/// Where the hosting application is, and how to send it to the login screen.
///
/// The gateway calls `redirect_to_login` when the session can't be renewed, unless
/// `current_location` is already the login location.
pub trait Navigator: Send + Sync + Debug {
    fn current_location(&self) -> String;
    fn redirect_to_login(&self);
}

/// For hosts without a login screen. Only logs that the session ended.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNavigator;

impl Navigator for NoopNavigator {
    fn current_location(&self) -> String {
        String::new()
    }

    fn redirect_to_login(&self) {
        info!("session expired, login required");
    }
}
