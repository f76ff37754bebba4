//! Admission gate bounding concurrently running jobs
//!
//! Requests beyond capacity wait for a slot; they are never rejected and
//! there is no bound on how many may wait.

use patchwork_core::{CalcError, Result};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Counting gate of fixed capacity
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    slots: Arc<Semaphore>,
    capacity: usize,
}

impl AdmissionGate {
    /// A capacity of zero is raised to one so the gate can always admit
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait for a free slot; the slot is released when the permit drops
    pub async fn admit(&self) -> Result<OwnedSemaphorePermit> {
        self.slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| CalcError::Config("Admission gate closed".to_string()))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots not currently held
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_permits_are_released_on_drop() {
        let gate = AdmissionGate::new(2);
        assert_eq!(gate.available(), 2);

        let first = gate.admit().await.unwrap();
        let second = gate.admit().await.unwrap();
        assert_eq!(gate.available(), 0);

        drop(first);
        assert_eq!(gate.available(), 1);
        drop(second);
        assert_eq!(gate.available(), 2);
    }

    #[tokio::test]
    async fn test_waiter_blocks_until_slot_frees() {
        let gate = AdmissionGate::new(1);
        let held = gate.admit().await.unwrap();

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.admit().await.map(|_| ()) })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!waiter.is_finished());

        drop(held);
        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_zero_capacity_admits_one() {
        assert_eq!(AdmissionGate::new(0).capacity(), 1);
    }
}
