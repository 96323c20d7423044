use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::frame::{CommandFrame, FeedbackFrame};
use crate::transport::Bus;
use crate::BusError;

/// An in-memory [`Bus`] driven by a script of received frames.
///
/// Each `receive` call pops one script entry: a queued frame, or a queued silence which reports a
/// timeout. An empty script also reports a timeout. Every transmitted frame is recorded.
#[derive(Debug, Default)]
pub struct MockBus {
    script: Mutex<VecDeque<Option<FeedbackFrame>>>,
    sent: Mutex<Vec<CommandFrame>>,
    receive_calls: AtomicUsize,
    fail_sends: AtomicBool,
}

impl MockBus {
    /// Creates a bus with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a frame for a later `receive`.
    pub fn queue(&self, frame: FeedbackFrame) {
        self.lock_script().push_back(Some(frame));
    }

    /// Queues a timeout for a later `receive`.
    pub fn queue_silence(&self) {
        self.lock_script().push_back(None);
    }

    /// Number of script entries not consumed yet.
    pub fn pending(&self) -> usize {
        self.lock_script().len()
    }

    /// Frames transmitted so far, oldest first.
    pub fn sent(&self) -> Vec<CommandFrame> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Number of `receive` calls made so far.
    pub fn receive_calls(&self) -> usize {
        self.receive_calls.load(Ordering::SeqCst)
    }

    /// Makes every following `send` fail.
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    fn lock_script(&self) -> std::sync::MutexGuard<'_, VecDeque<Option<FeedbackFrame>>> {
        self.script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Bus for MockBus {
    fn send(&self, frame: &CommandFrame) -> Result<(), BusError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(BusError::msg("mock bus: send failed"));
        }
        self.sent
            .lock()
            .map_err(|_| BusError::msg("mock bus: sent log poisoned"))?
            .push(*frame);
        Ok(())
    }

    fn receive(&self, _wait: Duration) -> Result<Option<FeedbackFrame>, BusError> {
        self.receive_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.lock_script().pop_front().flatten())
    }
}
