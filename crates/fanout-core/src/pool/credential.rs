use std::{fmt, sync::Arc};

use tokio::time::Instant;

/// Opaque handle to one access token in a [`CredentialPool`](super::CredentialPool).
///
/// Handles compare by key. `Debug` never prints the full key.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Credential {
    key: Arc<str>,
}

impl Credential {
    pub(crate) fn new(key: &str) -> Self {
        Self { key: Arc::from(key) }
    }

    /// Raw key, for the worker to put on the wire.
    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Key with everything but the last four characters hidden.
    pub fn masked(&self) -> String {
        let count = self.key.chars().count();
        if count <= 4 {
            return "*".repeat(count);
        }
        let tail: String = self.key.chars().skip(count - 4).collect();
        format!("***{tail}")
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Credential").field(&self.masked()).finish()
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CredentialState {
    Available,
    Reserved,
    RateLimited { until: Instant },
}

impl CredentialState {
    /// Available now, including a rate limit whose window has elapsed.
    #[inline]
    pub(crate) fn is_free_at(&self, now: Instant) -> bool {
        match self {
            CredentialState::Available => true,
            CredentialState::Reserved => false,
            CredentialState::RateLimited { until } => *until <= now,
        }
    }
}

#[derive(Debug)]
pub(crate) struct Slot {
    pub(crate) credential: Credential,
    pub(crate) state: CredentialState,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn debug_masks_key() {
        let c = Credential::new("sk-live-0123456789");
        assert_eq!(c.masked(), "***6789");
        assert_eq!(format!("{c:?}"), r#"Credential("***6789")"#);
        assert_eq!(c.key(), "sk-live-0123456789");
        assert_eq!(Credential::new("abc").masked(), "***");
    }

    #[test]
    fn rate_limit_frees_after_deadline() {
        let now = Instant::now();
        let state = CredentialState::RateLimited {
            until: now + Duration::from_millis(50),
        };
        assert!(!state.is_free_at(now));
        assert!(state.is_free_at(now + Duration::from_millis(50)));
        assert!(!CredentialState::Reserved.is_free_at(now));
        assert!(CredentialState::Available.is_free_at(now));
    }
}
