//! Session credential
//!
//! The single owner of the bearer token. The engine client reads it for every
//! request and revokes it on `401`. Revocation names the token the failed
//! request carried, so a burst of queued `401`s clears the slot once and a
//! token issued after the first failure survives the rest. A `401` with no
//! credential held asks for a login once until a new token is issued.

use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::{debug, info};

/// Process-wide bearer token slot
#[derive(Debug, Default)]
pub struct Session {
    token: RwLock<Option<String>>,
    clears: AtomicUsize,
    reauth_pending: AtomicBool,
}

impl Session {
    /// Session with no credential
    pub fn new() -> Self {
        Self::default()
    }

    /// Session holding `token`
    pub fn with_token(token: impl Into<String>) -> Self {
        let session = Self::new();
        session.issue(token);
        session
    }

    /// Store a new credential, replacing any previous one
    pub fn issue(&self, token: impl Into<String>) {
        let token = token.into();
        debug!("Session::issue: called");
        let mut slot = self.token.write().unwrap_or_else(|e| e.into_inner());
        *slot = if token.is_empty() { None } else { Some(token) };
        self.reauth_pending.store(false, Ordering::SeqCst);
    }

    /// Current credential, if any
    pub fn token(&self) -> Option<String> {
        self.token.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.read().unwrap_or_else(|e| e.into_inner()).is_some()
    }

    /// Clear the credential because a request carrying `used` was rejected
    ///
    /// Returns true when the operator must now be sent to log in: either
    /// this call cleared the token the request used, or the request carried
    /// no token, none is held, and no login has been asked for since the
    /// last `issue`. A request sent without a token never clears a token
    /// issued since.
    pub fn revoke(&self, used: Option<&str>) -> bool {
        let mut slot = self.token.write().unwrap_or_else(|e| e.into_inner());
        match (slot.as_deref(), used) {
            (Some(current), Some(used)) if current == used => {
                *slot = None;
                self.reauth_pending.store(true, Ordering::SeqCst);
                let clears = self.clears.fetch_add(1, Ordering::SeqCst) + 1;
                info!(clears, "Session::revoke: credential cleared");
                true
            }
            (None, None) if !self.reauth_pending.swap(true, Ordering::SeqCst) => {
                info!("Session::revoke: no credential held, login required");
                true
            }
            _ => {
                debug!("Session::revoke: stale or absent credential, nothing to clear");
                false
            }
        }
    }

    /// A login has been asked for and no token issued since
    pub fn reauth_pending(&self) -> bool {
        self.reauth_pending.load(Ordering::SeqCst)
    }

    /// How many times a credential has been cleared
    pub fn clear_count(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }
}
