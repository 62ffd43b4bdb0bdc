use tokio::sync::{
    Mutex,
    mpsc::{self, error::TrySendError},
};

use super::{LimiterClosed, Permit};

/// Create a bounded permit store and the (single) handle used to fill it.
///
/// The store closes once the [`PermitRefill`] is dropped,
/// which is what ends a limiter or proxy when its loop exits.
pub(super) fn permit_store(capacity: usize) -> (PermitRefill, PermitStore) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        PermitRefill { tx },
        PermitStore {
            rx: Mutex::new(rx),
            capacity,
        },
    )
}

pub(super) struct PermitRefill {
    tx: mpsc::Sender<Permit>,
}

impl PermitRefill {
    /// Push up to `n` new permits without waiting.
    ///
    /// Stops at the first push that finds the store full
    /// and returns how many permits were added.
    pub(super) fn top_up(&self, n: u32) -> Result<u32, LimiterClosed> {
        for pushed in 0..n {
            match self.tx.try_send(Permit::new()) {
                Ok(()) => (),
                Err(TrySendError::Full(_)) => return Ok(pushed),
                Err(TrySendError::Closed(_)) => return Err(LimiterClosed),
            }
        }
        Ok(n)
    }

    /// Push a single permit, waiting for room if the store is full.
    pub(super) async fn push(&self, permit: Permit) -> Result<(), LimiterClosed> {
        self.tx.send(permit).await.map_err(|_| LimiterClosed)
    }
}

pub(super) struct PermitStore {
    rx: Mutex<mpsc::Receiver<Permit>>,
    capacity: usize,
}

impl PermitStore {
    pub(super) async fn acquire(&self) -> Result<Permit, LimiterClosed> {
        self.rx.lock().await.recv().await.ok_or(LimiterClosed)
    }

    pub(super) fn try_acquire(&self) -> Option<Permit> {
        // a held lock means another consumer is already waiting on an empty store
        self.rx.try_lock().ok()?.try_recv().ok()
    }

    /// Snapshot of the number of buffered permits.
    ///
    /// Reports zero while a consumer is parked on the store,
    /// which only happens when the store was empty.
    pub(super) fn len(&self) -> usize {
        self.rx.try_lock().map(|rx| rx.len()).unwrap_or_default()
    }

    pub(super) fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_top_up_skips_when_full() {
        let (refill, store) = permit_store(3);

        assert_eq!(refill.top_up(2), Ok(2));
        assert_eq!(store.len(), 2);

        assert_eq!(refill.top_up(5), Ok(1));
        assert_eq!(store.len(), 3);

        assert_eq!(refill.top_up(1), Ok(0));
        assert_eq!(store.len(), store.capacity());
    }

    #[tokio::test]
    async fn test_each_permit_is_delivered_once() {
        let (refill, store) = permit_store(4);
        assert_eq!(refill.top_up(4), Ok(4));

        for _ in 0..4 {
            assert!(store.try_acquire().is_some());
        }
        assert!(store.try_acquire().is_none());
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_drained_then_closed_after_refill_dropped() {
        let (refill, store) = permit_store(2);
        assert_eq!(refill.top_up(2), Ok(2));
        drop(refill);

        assert!(store.acquire().await.is_ok());
        assert!(store.acquire().await.is_ok());
        assert_eq!(store.acquire().await.unwrap_err(), LimiterClosed);
    }

    #[tokio::test]
    async fn test_top_up_on_closed_store() {
        let (refill, store) = permit_store(2);
        drop(store);
        assert_eq!(refill.top_up(1), Err(LimiterClosed));
        assert_eq!(refill.push(Permit::new()).await, Err(LimiterClosed));
    }
}
