//! Pending-call table: call id → single-use completion channel.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use crate::errors::{ClientError, ErrorPayload};

type Settlement = Result<Value, ErrorPayload>;

/// Future returned by a call; settles once the matching reply is dispatched.
///
/// Resolves to the reply's `result`, to [`ClientError::Remote`] for an error
/// reply, or to [`ClientError::Abandoned`] if the owning client is dropped (or
/// its table cleared) first. Dropping this future does not cancel the call.
#[derive(Debug)]
pub struct ResponseFuture {
    id: u64,
    rx: oneshot::Receiver<Settlement>,
}

impl ResponseFuture {
    /// The id of the request this future belongs to.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Future for ResponseFuture {
    type Output = Result<Value, ClientError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(Ok(value))) => Poll::Ready(Ok(value)),
            Poll::Ready(Ok(Err(payload))) => Poll::Ready(Err(ClientError::Remote(payload))),
            Poll::Ready(Err(_)) => Poll::Ready(Err(ClientError::Abandoned)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// A settle attempt for an id that has no live entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unmatched(pub u64);

/// Table of in-flight calls.
#[derive(Debug, Default)]
pub struct PendingCalls {
    entries: HashMap<u64, oneshot::Sender<Settlement>>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry for `id` and hand back its future.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::DuplicateId`] if `id` is still pending.
    pub fn register(&mut self, id: u64) -> Result<ResponseFuture, ClientError> {
        if self.entries.contains_key(&id) {
            return Err(ClientError::DuplicateId(id));
        }
        let (tx, rx) = oneshot::channel();
        self.entries.insert(id, tx);
        debug!(id, pending = self.entries.len(), "registered pending call");
        Ok(ResponseFuture { id, rx })
    }

    /// Fulfill the call `id` with `result` and remove its entry.
    pub fn resolve(&mut self, id: u64, result: Value) -> Result<(), Unmatched> {
        self.settle(id, Ok(result))
    }

    /// Fail the call `id` with `payload` and remove its entry.
    pub fn reject(&mut self, id: u64, payload: ErrorPayload) -> Result<(), Unmatched> {
        self.settle(id, Err(payload))
    }

    /// Drop an entry without settling it; its future sees `Abandoned`.
    pub fn forget(&mut self, id: u64) -> bool {
        self.entries.remove(&id).is_some()
    }

    /// Drop every entry; all outstanding futures see `Abandoned`.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn contains(&self, id: u64) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pending ids in ascending order (for diagnostics).
    pub fn ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.entries.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    fn settle(&mut self, id: u64, outcome: Settlement) -> Result<(), Unmatched> {
        let tx = self.entries.remove(&id).ok_or(Unmatched(id))?;
        if tx.send(outcome).is_err() {
            debug!(id, "caller dropped the response future before settlement");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_resolve_settles_future_and_removes_entry() {
        let mut table = PendingCalls::new();
        let fut = table.register(1).unwrap();
        assert!(table.contains(1));

        table.resolve(1, json!("pong")).unwrap();
        assert!(table.is_empty());
        assert_eq!(fut.await.unwrap(), json!("pong"));
    }

    #[tokio::test]
    async fn test_reject_fails_future_with_payload() {
        let mut table = PendingCalls::new();
        let fut = table.register(4).unwrap();
        let payload = ErrorPayload {
            code: -32601,
            message: "Method not found.".to_string(),
            data: None,
        };

        table.reject(4, payload.clone()).unwrap();
        assert!(table.is_empty());
        match fut.await {
            Err(ClientError::Remote(p)) => assert_eq!(p, payload),
            other => panic!("Expected Remote error, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_id_is_unmatched() {
        let mut table = PendingCalls::new();
        let _fut = table.register(1).unwrap();
        assert_eq!(table.resolve(2, json!(null)), Err(Unmatched(2)));
        assert_eq!(table.ids(), vec![1]);
    }

    #[test]
    fn test_settles_exactly_once() {
        let mut table = PendingCalls::new();
        let _fut = table.register(1).unwrap();
        assert!(table.resolve(1, json!(1)).is_ok());
        assert_eq!(table.resolve(1, json!(2)), Err(Unmatched(1)));
    }

    #[test]
    fn test_duplicate_registration_refused() {
        let mut table = PendingCalls::new();
        let _fut = table.register(9).unwrap();
        assert!(matches!(table.register(9), Err(ClientError::DuplicateId(9))));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_dropped_future_still_removes_entry() {
        let mut table = PendingCalls::new();
        drop(table.register(3).unwrap());
        assert!(table.resolve(3, json!({})).is_ok());
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_clear_abandons_outstanding_calls() {
        let mut table = PendingCalls::new();
        let a = table.register(1).unwrap();
        let b = table.register(2).unwrap();
        table.clear();
        assert!(matches!(a.await, Err(ClientError::Abandoned)));
        assert!(matches!(b.await, Err(ClientError::Abandoned)));
    }
}
