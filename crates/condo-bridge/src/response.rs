//! Future resolving a single bridge request.

use crate::domain::error::{BridgeError, BridgeResult, RemoteError};
use crate::domain::pending::{CorrelationRegistry, Settlement};
use crate::domain::request_id::RequestId;
use pin_project_lite::pin_project;
use serde_json::Value;
use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::{sleep, Sleep};

/// A registered request's receiving end.
///
/// Dropping it closes the receiver and removes the registry entry, unless
/// the entry has already been settled or taken over by a newer request.
struct Registration {
    registry: Arc<CorrelationRegistry>,
    request_id: RequestId,
    method: String,
    rx: oneshot::Receiver<Settlement>,
}

impl Registration {
    fn outcome(&self, settlement: Result<Settlement, oneshot::error::RecvError>) -> BridgeResult<Value> {
        match settlement {
            Ok(Settlement::Resolved(envelope)) => Ok(envelope.into_payload()),
            Ok(Settlement::Rejected(envelope)) => {
                let error_type = envelope.error_type().unwrap_or_default();
                Err(BridgeError::Remote(RemoteError::new(
                    error_type,
                    envelope.into_payload(),
                )))
            }
            Ok(Settlement::Expired { after }) => Err(BridgeError::Timeout {
                method: self.method.clone(),
                request_id: self.request_id.clone(),
                after,
            }),
            Ok(Settlement::Cancelled) | Err(_) => Err(BridgeError::Cancelled {
                request_id: self.request_id.clone(),
            }),
        }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.rx.close();
        self.registry.abandon(&self.request_id);
    }
}

enum State {
    Waiting(Registration),
    Failed(BridgeError),
    Done,
}

pin_project! {
    /// Response to a request posted with `Bridge::send`.
    ///
    /// The request is already on the wire when this is created. Dropping it
    /// before completion cancels the pending entry; a response arriving later
    /// is ignored.
    #[must_use = "the response is lost unless awaited"]
    pub struct PendingResponse {
        state: State,
        #[pin]
        deadline: Option<Sleep>,
    }
}

impl PendingResponse {
    pub(crate) fn waiting(
        registry: Arc<CorrelationRegistry>,
        request_id: RequestId,
        method: &str,
        rx: oneshot::Receiver<Settlement>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            state: State::Waiting(Registration {
                registry,
                request_id,
                method: method.to_string(),
                rx,
            }),
            deadline: timeout.map(sleep),
        }
    }

    pub(crate) fn failed(error: BridgeError) -> Self {
        Self {
            state: State::Failed(error),
            deadline: None,
        }
    }

    /// Id of the request, unless it failed before being registered.
    pub fn request_id(&self) -> Option<&RequestId> {
        match &self.state {
            State::Waiting(registration) => Some(&registration.request_id),
            _ => None,
        }
    }
}

impl Future for PendingResponse {
    type Output = BridgeResult<Value>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut this = self.project();

        let mut registration = match mem::replace(this.state, State::Done) {
            State::Waiting(registration) => registration,
            State::Failed(error) => return Poll::Ready(Err(error)),
            State::Done => panic!("PendingResponse polled after completion"),
        };

        if let Some(deadline) = this.deadline.as_mut().as_pin_mut() {
            if deadline.poll(cx).is_ready() {
                this.deadline.set(None);
                // Settles the receiver with `Expired` unless a response won the race
                registration
                    .registry
                    .expire(&registration.request_id);
            }
        }

        match Pin::new(&mut registration.rx).poll(cx) {
            Poll::Ready(settlement) => Poll::Ready(registration.outcome(settlement)),
            Poll::Pending => {
                *this.state = State::Waiting(registration);
                Poll::Pending
            }
        }
    }
}
