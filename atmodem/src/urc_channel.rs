use core::time::Duration;
use std::{
    collections::VecDeque,
    future::Future,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use futures::{future::BoxFuture, FutureExt};

use crate::Urc;

/// Error type returned by notification handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Receives unsolicited notifications, one at a time and in arrival order.
///
/// Implemented for any `FnMut(Urc) -> impl Future<Output = Result<(), HandlerError>>`.
///
/// ```
/// use atmodem::{HandlerError, NotificationHandler, Urc};
///
/// fn assert_handler(_: impl NotificationHandler) {}
///
/// assert_handler(|urc: Urc| async move {
///     println!("{}", urc);
///     Ok::<_, HandlerError>(())
/// });
/// ```
pub trait NotificationHandler: Send + 'static {
    fn handle(&mut self, urc: Urc) -> BoxFuture<'static, Result<(), HandlerError>>;
}

impl<F, Fut> NotificationHandler for F
where
    F: FnMut(Urc) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    fn handle(&mut self, urc: Urc) -> BoxFuture<'static, Result<(), HandlerError>> {
        self(urc).boxed()
    }
}

pub(crate) type HandlerSlot = Arc<tokio::sync::Mutex<Option<Box<dyn NotificationHandler>>>>;

/// Bounded FIFO of notifications waiting for delivery.
///
/// Pushed to by the command engine and the background monitor, popped by the
/// delivery loop. When full, the oldest notification is dropped.
#[derive(Debug)]
pub struct UrcQueue {
    inner: Mutex<VecDeque<Urc>>,
    capacity: usize,
}

impl UrcQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            capacity,
        }
    }

    pub fn push(&self, urc: Urc) {
        let mut queue = self.lock();
        if queue.len() >= self.capacity {
            if let Some(dropped) = queue.pop_front() {
                error!("URC queue full! Dropping {}", dropped);
            }
        }
        queue.push_back(urc);
    }

    pub fn pop(&self) -> Option<Urc> {
        self.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Remove and return everything currently queued.
    pub fn drain(&self) -> Vec<Urc> {
        self.lock().drain(..).collect()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Urc>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Deliver queued notifications to the registered handler until the task is
/// aborted.
///
/// Notifications stay queued while no handler is registered. Handler errors
/// and panics are logged and the loop carries on with the next notification.
pub(crate) async fn deliver(queue: Arc<UrcQueue>, handler: HandlerSlot, poll_interval: Duration) {
    loop {
        let mut slot = handler.lock().await;
        let Some(current) = slot.as_mut() else {
            drop(slot);
            tokio::time::sleep(poll_interval).await;
            continue;
        };
        let Some(urc) = queue.pop() else {
            drop(slot);
            tokio::time::sleep(poll_interval).await;
            continue;
        };

        debug!("Delivering {}", urc);
        let code = urc.code().to_vec();
        let fut = match catch_unwind(AssertUnwindSafe(|| current.handle(urc))) {
            Ok(fut) => fut,
            Err(_) => {
                error!(
                    "Notification handler panicked on {}",
                    crate::helpers::LossyStr(&code)
                );
                continue;
            }
        };

        match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(
                "Notification handler failed on {}: {}",
                crate::helpers::LossyStr(&code),
                e
            ),
            Err(_) => error!(
                "Notification handler panicked on {}",
                crate::helpers::LossyStr(&code)
            ),
        }
    }
}
