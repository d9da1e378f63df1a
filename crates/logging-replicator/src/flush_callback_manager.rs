//! `FlushCallbackManager` (component C, spec §4.2).
//!
//! Guarantees serial delivery, in PSN order, of flush completions to a
//! registered processor, even when multiple flushes race to report. The
//! first caller to arrive becomes the drainer; later callers just enqueue
//! and return, matching the "mutex-protected queue, first caller drains"
//! design in the spec.

use crate::operation_processor::OperationProcessor;
use crate::physical_log_writer::LoggedRecords;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Weak};
use tracing::{error, instrument};

struct Inner {
    queue: VecDeque<LoggedRecords>,
    draining: bool,
}

pub struct FlushCallbackManager {
    inner: Mutex<Inner>,
    processor: Weak<OperationProcessor>,
}

impl FlushCallbackManager {
    #[must_use]
    pub fn new(processor: &Arc<OperationProcessor>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                draining: false,
            }),
            processor: Arc::downgrade(processor),
        }
    }

    /// Enqueues a completed flush batch. If no drain is in progress, this
    /// call becomes the drainer and processes the queue (including batches
    /// enqueued by other callers while draining) before returning.
    #[instrument(skip_all)]
    pub async fn on_flush_completed(&self, batch: LoggedRecords) {
        let should_drain = {
            let mut inner = self.inner.lock().expect("flush callback queue poisoned");
            inner.queue.push_back(batch);
            if inner.draining {
                false
            } else {
                inner.draining = true;
                true
            }
        };

        if !should_drain {
            return;
        }

        loop {
            let next = {
                let mut inner = self.inner.lock().expect("flush callback queue poisoned");
                match inner.queue.pop_front() {
                    Some(batch) => Some(batch),
                    None => {
                        inner.draining = false;
                        None
                    }
                }
            };

            let Some(batch) = next else { break };
            self.deliver(batch).await;
        }
    }

    async fn deliver(&self, batch: LoggedRecords) {
        match self.processor.upgrade() {
            Some(processor) => processor.on_logged_records(batch).await,
            None if batch.log_error.is_some() => {
                error!(error = ?batch.log_error, "flush failed after processor was dropped");
            }
            None => {
                debug_assert!(false, "successful flush delivered after processor dropped");
            }
        }
    }
}
