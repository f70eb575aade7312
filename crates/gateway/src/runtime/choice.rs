//! Human-in-the-loop choice gate.
//!
//! The orchestrator presents a binary prompt bound to a conversation id
//! and suspends; an out-of-band HTTP handler resolves it. The decision is
//! parked in the slot when `resolve` arrives before `wait`, so there is no
//! missed-wakeup window. An unanswered prompt auto-declines after the
//! configured timeout instead of pinning the turn forever.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use acre_domain::error::{Error, Result};
use acre_domain::ui::UiFragment;

enum Slot {
    /// Prompt rendered, nobody waiting yet.
    Presented,
    /// A turn task is suspended on this sender.
    Waiting(oneshot::Sender<bool>),
    /// Resolved before anyone waited; decision parked.
    Decided(bool),
}

pub struct ChoiceGate {
    slots: Mutex<HashMap<String, Slot>>,
    timeout: Duration,
}

impl ChoiceGate {
    pub fn new(timeout: Duration) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    /// Register a pending choice and return the prompt fragment.
    ///
    /// Conversations are processed one turn at a time, so a second
    /// `present` for the same id before resolution is a programming error.
    pub fn present(&self, conversation_id: &str) -> Result<UiFragment> {
        let mut slots = self.slots.lock();
        if slots.contains_key(conversation_id) {
            return Err(Error::GateBusy(conversation_id.to_string()));
        }
        slots.insert(conversation_id.to_string(), Slot::Presented);
        Ok(UiFragment::ChoicePrompt {
            conversation_id: conversation_id.to_string(),
        })
    }

    /// Deliver a decision from the out-of-band handler. The first
    /// resolution wins; later calls are no-ops returning `false`.
    pub fn resolve(&self, conversation_id: &str, decision: bool) -> bool {
        let mut slots = self.slots.lock();
        match slots.remove(conversation_id) {
            Some(Slot::Waiting(tx)) => {
                let _ = tx.send(decision);
                true
            }
            Some(Slot::Presented) => {
                slots.insert(conversation_id.to_string(), Slot::Decided(decision));
                true
            }
            Some(decided @ Slot::Decided(_)) => {
                // Already resolved; keep the parked value untouched.
                slots.insert(conversation_id.to_string(), decided);
                false
            }
            None => false,
        }
    }

    /// Suspend until the decision arrives. Returns the parked decision
    /// immediately if `resolve` ran first; auto-declines on timeout.
    pub async fn wait(&self, conversation_id: &str) -> bool {
        let rx = {
            let mut slots = self.slots.lock();
            match slots.remove(conversation_id) {
                Some(Slot::Decided(decision)) => return decision,
                Some(Slot::Presented) | None => {
                    let (tx, rx) = oneshot::channel();
                    slots.insert(conversation_id.to_string(), Slot::Waiting(tx));
                    rx
                }
                Some(Slot::Waiting(_)) => {
                    // A second concurrent wait violates the one-turn rule.
                    tracing::error!(
                        conversation_id = %conversation_id,
                        "duplicate choice wait; declining"
                    );
                    return false;
                }
            }
        };

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(decision)) => decision,
            Ok(Err(_)) => false,
            Err(_) => {
                tracing::info!(
                    conversation_id = %conversation_id,
                    timeout_secs = self.timeout.as_secs(),
                    "choice prompt timed out; auto-declining"
                );
                self.slots.lock().remove(conversation_id);
                false
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn gate() -> ChoiceGate {
        ChoiceGate::new(Duration::from_secs(300))
    }

    #[tokio::test]
    async fn resolve_then_wait_delivers_parked_decision() {
        let gate = gate();
        gate.present("c1").unwrap();
        assert!(gate.resolve("c1", true));
        assert!(gate.wait("c1").await);
    }

    #[tokio::test]
    async fn wait_then_resolve_unblocks() {
        let gate = Arc::new(gate());
        gate.present("c1").unwrap();

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.wait("c1").await })
        };
        tokio::task::yield_now().await;
        assert!(gate.resolve("c1", false));
        assert!(!waiter.await.unwrap());
    }

    #[tokio::test]
    async fn second_resolution_does_not_change_the_decision() {
        let gate = gate();
        gate.present("c1").unwrap();
        assert!(gate.resolve("c1", true));
        assert!(!gate.resolve("c1", false));
        assert!(gate.wait("c1").await);
    }

    #[tokio::test]
    async fn double_present_is_an_error() {
        let gate = gate();
        gate.present("c1").unwrap();
        assert!(matches!(gate.present("c1"), Err(Error::GateBusy(_))));
        // A different conversation is unaffected.
        gate.present("c2").unwrap();
    }

    #[tokio::test]
    async fn timeout_auto_declines() {
        let gate = ChoiceGate::new(Duration::from_millis(20));
        gate.present("c1").unwrap();
        assert!(!gate.wait("c1").await);
        // Slot is cleared; the conversation can present again next turn.
        gate.present("c1").unwrap();
    }
}
