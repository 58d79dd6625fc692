//! Correlation of in-flight hardware operations with their callers

use crate::check_invariant;
use crate::hardware::RequestId;
use crate::invariants;
use std::collections::BTreeMap;
use tokio::sync::oneshot;

pub type Responder<T, E> = oneshot::Sender<Result<T, E>>;

/// What happened to a completion handed to [`PendingTable::resolve`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The waiting caller received the result
    Delivered,
    /// The slot was resolved but the caller stopped waiting
    CallerGone,
    /// No slot: the request was already resolved or never registered
    Ignored,
}

/// Issues request ids; never repeats and never goes backwards
#[derive(Debug, Default)]
pub struct RequestSequence {
    last: u64,
}

impl RequestSequence {
    pub fn next(&mut self) -> RequestId {
        self.last += 1;
        RequestId(self.last)
    }

    pub fn last(&self) -> Option<RequestId> {
        (self.last > 0).then_some(RequestId(self.last))
    }
}

/// Resolvable slots keyed by request id, each resolved exactly once
pub struct PendingTable<T, E> {
    label: &'static str,
    slots: BTreeMap<RequestId, Responder<T, E>>,
}

impl<T, E> PendingTable<T, E> {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            slots: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, id: RequestId, responder: Responder<T, E>) {
        let fresh = !self.slots.contains_key(&id);
        check_invariant!(fresh, invariants::SINGLE_RESOLUTION);
        self.slots.insert(id, responder);
    }

    pub fn contains(&self, id: RequestId) -> bool {
        self.slots.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn resolve(&mut self, id: RequestId, result: Result<T, E>) -> Resolution {
        let Some(responder) = self.slots.remove(&id) else {
            log::warn!(
                "Ignoring {} completion for {}: already resolved or never issued",
                self.label,
                id
            );
            return Resolution::Ignored;
        };

        if responder.send(result).is_err() {
            log::debug!("Caller of {} {} stopped waiting", self.label, id);
            return Resolution::CallerGone;
        }
        Resolution::Delivered
    }

    /// Resolve every outstanding slot with `error`, returning how many there were
    pub fn fail_all(&mut self, error: E) -> usize
    where
        E: Clone,
    {
        let slots = std::mem::take(&mut self.slots);
        let count = slots.len();
        for (id, responder) in slots {
            log::debug!("Failing {} {}", self.label, id);
            let _ = responder.send(Err(error.clone()));
        }
        count
    }
}

impl<T, E> std::fmt::Debug for PendingTable<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingTable")
            .field("label", &self.label)
            .field("outstanding", &self.slots.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolves_exactly_once() {
        let mut table: PendingTable<u32, String> = PendingTable::new("capture");
        let (tx, rx) = oneshot::channel();
        table.register(RequestId(1), tx);

        assert_eq!(table.resolve(RequestId(1), Ok(5)), Resolution::Delivered);
        assert_eq!(table.resolve(RequestId(1), Ok(6)), Resolution::Ignored);
        assert_eq!(rx.await.unwrap(), Ok(5));
    }

    #[tokio::test]
    async fn test_fail_all_drains_every_slot() {
        let mut table: PendingTable<(), String> = PendingTable::new("configure");
        let (tx1, rx1) = oneshot::channel();
        let (tx2, rx2) = oneshot::channel();
        table.register(RequestId(1), tx1);
        table.register(RequestId(2), tx2);

        assert_eq!(table.fail_all("disconnected".to_string()), 2);
        assert!(table.is_empty());
        assert_eq!(rx1.await.unwrap(), Err("disconnected".to_string()));
        assert_eq!(rx2.await.unwrap(), Err("disconnected".to_string()));
    }

    #[test]
    fn test_dropped_caller_is_reported() {
        let mut table: PendingTable<(), ()> = PendingTable::new("open");
        let (tx, rx) = oneshot::channel();
        table.register(RequestId(9), tx);
        drop(rx);
        assert_eq!(table.resolve(RequestId(9), Ok(())), Resolution::CallerGone);
    }

    #[test]
    fn test_sequence_is_monotonic() {
        let mut seq = RequestSequence::default();
        assert_eq!(seq.last(), None);
        let a = seq.next();
        let b = seq.next();
        assert!(b > a);
        assert_eq!(seq.last(), Some(b));
    }
}
