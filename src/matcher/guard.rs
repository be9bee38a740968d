//! Single-delivery arbitration
//!
//! A matcher run has two finishers that race: the process watcher and the
//! timeout timer. Both hold the same [`DeliveryGuard`]; the first to flip the
//! delivered flag hands its value to the waiting request, the loser gets its
//! value back and must not render anything.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;

use super::invoker::{Completion, ProcessRun};
use super::MatchOutcome;
use crate::logger;

/// First-writer-wins slot shared by the finishers of one request
pub struct DeliveryGuard<T> {
    delivered: AtomicBool,
    slot: Mutex<Option<oneshot::Sender<T>>>,
}

impl<T> DeliveryGuard<T> {
    /// Create a guard and the receiver the request waits on
    pub fn new() -> (Arc<Self>, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        let guard = Self {
            delivered: AtomicBool::new(false),
            slot: Mutex::new(Some(tx)),
        };
        (Arc::new(guard), rx)
    }

    /// Deliver `value` if nobody has yet.
    ///
    /// Check and set happen in one compare-exchange; a loser gets its value
    /// back in `Err`.
    pub fn try_deliver(&self, value: T) -> Result<(), T> {
        if self
            .delivered
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(value);
        }

        let sender = self.slot.lock().ok().and_then(|mut slot| slot.take());
        if let Some(sender) = sender {
            // The request may have gone away; the value is still the one
            // and only delivery.
            let _ = sender.send(value);
        }
        Ok(())
    }
}

/// Race `run` against `timeout` and return the single winning outcome.
///
/// The watcher task always reaps the child, including after a timeout kill,
/// and the timer is aborted as soon as the process outcome wins. Returns
/// `None` only if both finishers disappeared without delivering.
pub async fn resolve<F>(run: ProcessRun, timeout: Duration, interpret: F) -> Option<MatchOutcome>
where
    F: FnOnce(&Completion) -> MatchOutcome + Send + 'static,
{
    let (guard, delivered) = DeliveryGuard::new();
    let killer = run.kill_handle();
    let pid = run.pid();

    let timer = {
        let guard = Arc::clone(&guard);
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if guard.try_deliver(MatchOutcome::TimedOut).is_ok() {
                logger::log_warning(&format!(
                    "Matcher pid {pid:?} timed out after {}ms, killing",
                    timeout.as_millis()
                ));
                killer.kill();
            }
        })
    };

    tokio::spawn(async move {
        let completion = run.wait().await;
        let outcome = interpret(&completion);
        match guard.try_deliver(outcome) {
            Ok(()) => timer.abort(),
            Err(late) => logger::log_info(&format!(
                "[Matcher] Discarded late completion of pid {pid:?} (exit {:?}, killed {}): {}",
                completion.exit_code,
                completion.killed,
                late.label()
            )),
        }
    });

    delivered.await.ok()
}
