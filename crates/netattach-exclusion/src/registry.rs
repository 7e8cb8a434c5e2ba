use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{ExclusionError, Result};
use crate::semaphore::{BinarySemaphore, Ticket};

static GLOBAL: LazyLock<Arc<ResourceRegistry>> = LazyLock::new(|| Arc::new(ResourceRegistry::new()));

/// Maps resource keys to single-token semaphores.
///
/// Holding the token for a key grants exclusive access to decisions about
/// that resource, for example whether a shared tenant network must be
/// created or torn down. Entries are created on first use and live as long
/// as the registry, so repeated attach/detach cycles reuse the same token.
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    entries: Mutex<HashMap<String, Arc<BinarySemaphore>>>,
}

impl ResourceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    #[must_use]
    pub fn global() -> Arc<ResourceRegistry> {
        Arc::clone(&GLOBAL)
    }

    fn semaphore(&self, key: &str) -> Arc<BinarySemaphore> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let sem = entries
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(BinarySemaphore::new()));
        Arc::clone(sem)
    }

    fn existing(&self, key: &str) -> Option<Arc<BinarySemaphore>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).map(Arc::clone)
    }

    /// Takes the token for `key`, blocking while another holder has it.
    ///
    /// The wait happens outside the registry lock, so waiters on one key do
    /// not hold up acquisitions of other keys.
    #[must_use = "dropping the guard releases the resource immediately"]
    pub fn acquire(&self, key: &str) -> ResourceGuard {
        let sem = self.semaphore(key);
        let ticket = match sem.try_take() {
            Some(ticket) => ticket,
            None => {
                debug!(resource = key, "waiting for exclusion token");
                sem.take()
            }
        };
        debug!(resource = key, "exclusion token acquired");
        ResourceGuard::new(key, sem, ticket)
    }

    /// Takes the token for `key` only if nobody holds it.
    #[must_use]
    pub fn try_acquire(&self, key: &str) -> Option<ResourceGuard> {
        let sem = self.semaphore(key);
        let ticket = sem.try_take()?;
        Some(ResourceGuard::new(key, sem, ticket))
    }

    /// Waits at most `timeout` for the token for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`ExclusionError::Timeout`] if the token did not come back in time.
    pub fn acquire_timeout(&self, key: &str, timeout: Duration) -> Result<ResourceGuard> {
        let sem = self.semaphore(key);
        match sem.take_timeout(timeout) {
            Some(ticket) => {
                debug!(resource = key, "exclusion token acquired");
                Ok(ResourceGuard::new(key, sem, ticket))
            }
            None => Err(ExclusionError::Timeout {
                key: key.to_string(),
                timeout,
            }),
        }
    }

    /// Pushes the token for `key` back by hand, on behalf of whoever holds it.
    ///
    /// Only needed for tokens handed off with [`ResourceGuard::leak`]. A
    /// guard that still exists for the key becomes stale and will not
    /// return the token a second time.
    ///
    /// # Errors
    ///
    /// Returns [`ExclusionError::UnknownResource`] if `key` was never
    /// acquired, or [`ExclusionError::AlreadyReleased`] if its token is
    /// already available.
    pub fn release(&self, key: &str) -> Result<()> {
        let sem = self
            .existing(key)
            .ok_or_else(|| ExclusionError::UnknownResource(key.to_string()))?;
        if sem.force_give() {
            debug!(resource = key, "exclusion token released");
            Ok(())
        } else {
            warn!(resource = key, "refusing to release a token that is not held");
            Err(ExclusionError::AlreadyReleased(key.to_string()))
        }
    }

    /// Whether the token for `key` is currently held.
    #[must_use]
    pub fn is_held(&self, key: &str) -> bool {
        self.existing(key).is_some_and(|sem| !sem.is_available())
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.existing(key).is_some()
    }

    /// Number of resource keys seen so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exclusive hold on one resource key.
///
/// The token goes back exactly once: on [`release`](Self::release) or when
/// the guard is dropped, whichever comes first. Parking the guard in a
/// workflow payload therefore releases it on every exit path.
#[derive(Debug)]
pub struct ResourceGuard {
    key: String,
    token: Option<(Arc<BinarySemaphore>, Ticket)>,
}

impl ResourceGuard {
    fn new(key: &str, sem: Arc<BinarySemaphore>, ticket: Ticket) -> Self {
        Self {
            key: key.to_string(),
            token: Some((sem, ticket)),
        }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the token now.
    pub fn release(mut self) {
        self.give_back();
    }

    /// Gives up automatic release and returns the key.
    ///
    /// The token stays taken until [`ResourceRegistry::release`] is called
    /// for the key. If that never happens, every later acquisition of the
    /// key blocks forever.
    #[must_use = "the key is needed to release the token later"]
    pub fn leak(mut self) -> String {
        self.token = None;
        warn!(resource = %self.key, "exclusion token leaked to manual release");
        std::mem::take(&mut self.key)
    }

    fn give_back(&mut self) {
        if let Some((sem, ticket)) = self.token.take() {
            if sem.give(ticket) {
                debug!(resource = %self.key, "exclusion token released");
            } else {
                warn!(resource = %self.key, "exclusion token was already returned by hand");
            }
        }
    }
}

impl Drop for ResourceGuard {
    fn drop(&mut self) {
        self.give_back();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_are_created_lazily() {
        let registry = ResourceRegistry::new();
        assert!(registry.is_empty());

        let guard = registry.acquire("net-a");

        assert!(registry.contains("net-a"));
        assert!(!registry.contains("net-b"));
        assert_eq!(guard.key(), "net-a");
    }

    #[test]
    fn entries_survive_release() {
        let registry = ResourceRegistry::new();

        registry.acquire("net-a").release();
        registry.acquire("net-a").release();

        assert_eq!(registry.len(), 1);
        assert!(!registry.is_held("net-a"));
    }

    #[test]
    fn try_acquire_fails_while_held() {
        let registry = ResourceRegistry::new();
        let guard = registry.acquire("net-a");

        assert!(registry.try_acquire("net-a").is_none());
        assert!(registry.try_acquire("net-b").is_some());
        drop(guard);
        assert!(registry.try_acquire("net-a").is_some());
    }

    #[test]
    fn manual_release_of_unknown_key_is_rejected() {
        let registry = ResourceRegistry::new();

        assert_eq!(
            registry.release("missing"),
            Err(ExclusionError::UnknownResource("missing".to_string()))
        );
    }

    #[test]
    fn manual_release_refuses_double_release() {
        let registry = ResourceRegistry::new();
        let key = registry.acquire("net-a").leak();

        assert_eq!(registry.release(&key), Ok(()));
        assert_eq!(
            registry.release(&key),
            Err(ExclusionError::AlreadyReleased("net-a".to_string()))
        );
    }

    #[test]
    fn guard_drop_after_manual_release_does_not_add_a_token() {
        let registry = ResourceRegistry::new();
        let guard = registry.acquire("net-a");

        assert_eq!(registry.release("net-a"), Ok(()));
        let second = registry.try_acquire("net-a");
        drop(guard);

        assert!(second.is_some());
        assert!(registry.is_held("net-a"));
    }

    #[test]
    fn global_registry_is_shared() {
        let key = "registry-tests-global-key";
        let guard = ResourceRegistry::global().acquire(key);

        let other_handle = ResourceRegistry::global();
        assert!(other_handle.is_held(key));
        guard.release();
        assert!(!other_handle.is_held(key));
    }
}
