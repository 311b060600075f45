use std::collections::HashMap;
use std::sync::Mutex;

use crate::menu;
use crate::message::OutgoingMessage;

/// Destructive operations that need an explicit yes before running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuardedAction {
    UpdateSite,
    ShutdownPc,
}

impl GuardedAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UpdateSite => "update_site",
            Self::ShutdownPc => "shutdown_pc",
        }
    }

    fn prompt(&self) -> &'static str {
        match self {
            Self::UpdateSite => "🌐 Update the site now? The deploy script will run.",
            Self::ShutdownPc => "⏻ Shut down the PC now?",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Confirmed(GuardedAction),
    Cancelled(GuardedAction),
    /// A reply arrived while pending but matched neither button. The entry is
    /// gone and nothing runs.
    Discarded(GuardedAction),
    NotPending,
}

/// Pending yes/no confirmations, at most one per caller.
#[derive(Debug, Default)]
pub struct ConfirmationBroker {
    pending: Mutex<HashMap<i64, GuardedAction>>,
}

impl ConfirmationBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the caller's pending confirmation and returns
    /// the prompt to show.
    pub fn request(&self, caller_id: i64, action: GuardedAction) -> OutgoingMessage {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.insert(caller_id, action);
        OutgoingMessage::plain(action.prompt()).with_keyboard(menu::confirm_keyboard())
    }

    /// Consumes the caller's pending entry, if any, and interprets `reply`.
    ///
    /// Lookup and removal happen under one lock acquisition, so two replies
    /// from the same caller can never both observe the entry.
    pub fn resolve(&self, caller_id: i64, reply: &str) -> Decision {
        let taken = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending.remove(&caller_id)
        };
        let Some(action) = taken else {
            return Decision::NotPending;
        };
        match reply.trim() {
            menu::CONFIRM_YES => Decision::Confirmed(action),
            menu::CONFIRM_NO => Decision::Cancelled(action),
            _ => Decision::Discarded(action),
        }
    }

    pub fn is_pending(&self, caller_id: i64) -> bool {
        let pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.contains_key(&caller_id)
    }

    pub fn pending_count(&self) -> usize {
        let pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::KeyboardAction;

    #[test]
    fn yes_confirms_and_clears() {
        let broker = ConfirmationBroker::new();
        broker.request(1, GuardedAction::UpdateSite);
        assert_eq!(
            broker.resolve(1, menu::CONFIRM_YES),
            Decision::Confirmed(GuardedAction::UpdateSite)
        );
        assert!(!broker.is_pending(1));
        assert_eq!(broker.resolve(1, menu::CONFIRM_YES), Decision::NotPending);
    }

    #[test]
    fn no_cancels_and_clears() {
        let broker = ConfirmationBroker::new();
        broker.request(1, GuardedAction::ShutdownPc);
        assert_eq!(
            broker.resolve(1, menu::CONFIRM_NO),
            Decision::Cancelled(GuardedAction::ShutdownPc)
        );
        assert_eq!(broker.pending_count(), 0);
    }

    #[test]
    fn unrecognized_reply_still_clears() {
        let broker = ConfirmationBroker::new();
        broker.request(1, GuardedAction::UpdateSite);
        assert_eq!(
            broker.resolve(1, "maybe"),
            Decision::Discarded(GuardedAction::UpdateSite)
        );
        assert!(!broker.is_pending(1));
    }

    #[test]
    fn second_request_overwrites_first() {
        let broker = ConfirmationBroker::new();
        broker.request(1, GuardedAction::UpdateSite);
        broker.request(1, GuardedAction::UpdateSite);
        assert_eq!(broker.pending_count(), 1);

        broker.request(1, GuardedAction::ShutdownPc);
        assert_eq!(
            broker.resolve(1, menu::CONFIRM_YES),
            Decision::Confirmed(GuardedAction::ShutdownPc)
        );
    }

    #[test]
    fn entries_are_per_caller() {
        let broker = ConfirmationBroker::new();
        broker.request(1, GuardedAction::UpdateSite);
        assert_eq!(broker.resolve(2, menu::CONFIRM_YES), Decision::NotPending);
        assert!(broker.is_pending(1));
    }

    #[test]
    fn prompt_offers_yes_and_no() {
        let broker = ConfirmationBroker::new();
        let prompt = broker.request(1, GuardedAction::UpdateSite);
        let KeyboardAction::Show(keyboard) = prompt.keyboard else {
            panic!("prompt must show a keyboard");
        };
        assert!(keyboard.contains(menu::CONFIRM_YES));
        assert!(keyboard.contains(menu::CONFIRM_NO));
    }
}
