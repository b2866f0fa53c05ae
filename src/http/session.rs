//! Session-expiry notification.
//!
//! The transport never touches application state directly. When a session
//! cannot be recovered it calls whatever the host registered here.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Callback run after a forced logout.
pub type SessionExpiredHook = Arc<dyn Fn() + Send + Sync>;

#[derive(Clone, Default)]
pub struct SessionEvents {
    hook: Arc<RwLock<Option<SessionExpiredHook>>>,
}

impl SessionEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the hook, replacing any previous one.
    pub fn on_session_expired<F>(&self, hook: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.hook.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(hook));
    }

    pub(crate) fn notify_expired(&self) {
        // Clone out so the hook runs without the lock held
        let hook = self
            .hook
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(hook) = hook {
            hook();
        }
    }
}

impl fmt::Debug for SessionEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registered = self
            .hook
            .read()
            .map(|h| h.is_some())
            .unwrap_or(false);
        f.debug_struct("SessionEvents")
            .field("registered", &registered)
            .finish()
    }
}
