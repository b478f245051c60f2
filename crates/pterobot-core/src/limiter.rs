//! Shared cap on simultaneously in-flight panel calls.
//!
//! The panel rate-limits per API key, so every request handled by the
//! process draws from one semaphore. A permit covers exactly one HTTP
//! attempt; it is released before any backoff sleep so a throttled request
//! never holds a slot while waiting.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Cloneable handle to the process-wide call cap.
#[derive(Debug, Clone)]
pub struct CallLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl CallLimiter {
    /// Create a limiter allowing `capacity` concurrent calls (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait for a free slot.
    ///
    /// Returns `None` only if the limiter was closed, which never happens
    /// while a handle is alive.
    pub async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        Arc::clone(&self.semaphore).acquire_owned().await.ok()
    }

    /// Configured capacity.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Calls currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.capacity
            .saturating_sub(self.semaphore.available_permits())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn permits_are_counted_and_released() {
        let limiter = CallLimiter::new(2);
        let first = limiter.acquire().await;
        let second = limiter.acquire().await;
        assert!(first.is_some() && second.is_some());
        assert_eq!(limiter.in_flight(), 2);

        drop(first);
        assert_eq!(limiter.in_flight(), 1);
    }

    #[tokio::test]
    async fn zero_capacity_is_raised_to_one() {
        let limiter = CallLimiter::new(0);
        assert_eq!(limiter.capacity(), 1);
        assert!(limiter.acquire().await.is_some());
    }

    #[tokio::test]
    async fn third_caller_waits_for_a_slot() {
        let limiter = CallLimiter::new(1);
        let held = limiter.acquire().await;
        let waiting = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            limiter.acquire(),
        )
        .await;
        assert!(waiting.is_err(), "second acquire should block while the slot is held");
        drop(held);
        assert!(limiter.acquire().await.is_some());
    }
}
