//! Pending-request bookkeeping.
//!
//! Every request id maps to a one-shot channel that is settled exactly once:
//! by its response, by its timeout (the caller removes the entry), or by
//! [`PendingRequests::fail_all`] when the connection goes away.

use crate::error::{ClientError, CloseReason};
use scenewright_core::Response;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;
use tokio::sync::oneshot;

type Settle = oneshot::Sender<Result<Response, ClientError>>;

struct PendingRequest {
    method: String,
    deadline: Instant,
    settle: Settle,
}

struct State {
    /// `Some` once the connection is gone; new registrations fail with it.
    closed: Option<CloseReason>,
    entries: HashMap<u64, PendingRequest>,
}

/// In-flight requests keyed by id.
pub struct PendingRequests {
    state: Mutex<State>,
}

impl Default for PendingRequests {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingRequests {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                closed: None,
                entries: HashMap::new(),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // Critical sections are single insert/remove/drain calls, so a
        // poisoned map is still consistent.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start tracking `id`. Fails once the connection has been closed.
    pub fn register(
        &self,
        id: u64,
        method: &str,
        deadline: Instant,
    ) -> Result<oneshot::Receiver<Result<Response, ClientError>>, ClientError> {
        let mut state = self.lock();
        if let Some(reason) = &state.closed {
            return Err(ClientError::Closed(reason.clone()));
        }
        let (settle, rx) = oneshot::channel();
        state.entries.insert(
            id,
            PendingRequest {
                method: method.to_string(),
                deadline,
                settle,
            },
        );
        Ok(rx)
    }

    /// Deliver a response. Returns `false` when the id is not tracked
    /// (already timed out, or never issued), in which case it is ignored.
    pub fn resolve(&self, response: Response) -> bool {
        let entry = self.lock().entries.remove(&response.id);
        match entry {
            Some(pending) => {
                tracing::trace!(
                    "settled {} (id {}), {:?} before deadline",
                    pending.method,
                    response.id,
                    pending.deadline.saturating_duration_since(Instant::now())
                );
                // The receiver may already be gone if the caller was dropped.
                let _ = pending.settle.send(Ok(response));
                true
            }
            None => false,
        }
    }

    /// Stop tracking `id` without settling it. Returns `false` if it was
    /// already settled.
    pub fn forget(&self, id: u64) -> bool {
        self.lock().entries.remove(&id).is_some()
    }

    /// Reject everything in flight and refuse new registrations.
    ///
    /// Returns how many requests were rejected. Only the first close reason
    /// is kept.
    pub fn fail_all(&self, reason: CloseReason) -> usize {
        let drained: Vec<PendingRequest> = {
            let mut state = self.lock();
            if state.closed.is_none() {
                state.closed = Some(reason.clone());
            }
            state.entries.drain().map(|(_, p)| p).collect()
        };
        let count = drained.len();
        for pending in drained {
            let _ = pending
                .settle
                .send(Err(ClientError::Closed(reason.clone())));
        }
        count
    }

    pub fn is_tracked(&self, id: u64) -> bool {
        self.lock().entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.lock().closed.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    #[tokio::test]
    async fn out_of_order_responses_settle_the_right_request() {
        let pending = PendingRequests::new();
        let rx1 = pending.register(1, "a", deadline()).unwrap();
        let rx2 = pending.register(2, "b", deadline()).unwrap();

        assert!(pending.resolve(Response::success(2, json!("second"))));
        assert!(pending.resolve(Response::success(1, json!("first"))));

        assert_eq!(rx1.await.unwrap().unwrap().result, Some(json!("first")));
        assert_eq!(rx2.await.unwrap().unwrap().result, Some(json!("second")));
        assert!(pending.is_empty());
    }

    #[test]
    fn late_response_is_ignored() {
        let pending = PendingRequests::new();
        let _rx = pending.register(5, "slow", deadline()).unwrap();
        assert!(pending.forget(5));
        assert!(!pending.is_tracked(5));
        assert!(!pending.resolve(Response::success(5, json!(null))));
    }

    #[tokio::test]
    async fn fail_all_rejects_everything_once() {
        let pending = PendingRequests::new();
        let receivers: Vec<_> = (1..=3)
            .map(|id| pending.register(id, "m", deadline()).unwrap())
            .collect();

        assert_eq!(pending.fail_all(CloseReason::SocketClosed), 3);
        assert_eq!(pending.fail_all(CloseReason::Disposed), 0);

        for rx in receivers {
            let err = rx.await.unwrap().unwrap_err();
            assert!(matches!(err, ClientError::Closed(CloseReason::SocketClosed)));
        }
        assert!(matches!(
            pending.register(9, "m", deadline()),
            Err(ClientError::Closed(CloseReason::SocketClosed))
        ));
    }
}
