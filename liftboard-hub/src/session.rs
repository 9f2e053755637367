use serde::Serialize;

/// The UI event value that closes out a session on a platform.
pub const GROUP_DONE_EVENT: &str = "GroupDone";

/// Per-platform session lifecycle. A session goes done when the platform
/// announces the group is finished, and reopens the moment anything
/// starts moving again (a clock, a decision, or any other update).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    #[default]
    Active,
    Done,
}

/// What a phase transition wants announced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseChange {
    BecameDone,
    Reopened,
}

impl SessionPhase {
    /// Apply an `update` frame's ui event. Returns the announcement this
    /// transition requires, if any.
    pub fn on_update(&mut self, ui_event: &str) -> Option<PhaseChange> {
        if ui_event == GROUP_DONE_EVENT {
            match self {
                SessionPhase::Done => None,
                SessionPhase::Active => {
                    *self = SessionPhase::Done;
                    Some(PhaseChange::BecameDone)
                }
            }
        } else {
            self.reopen()
        }
    }

    /// Timer and decision frames always signal live activity.
    pub fn on_activity(&mut self) -> Option<PhaseChange> {
        self.reopen()
    }

    fn reopen(&mut self) -> Option<PhaseChange> {
        match self {
            SessionPhase::Active => None,
            SessionPhase::Done => {
                *self = SessionPhase::Active;
                Some(PhaseChange::Reopened)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_done_closes_and_timer_reopens() {
        let mut phase = SessionPhase::default();
        assert_eq!(phase.on_update(GROUP_DONE_EVENT), Some(PhaseChange::BecameDone));
        assert_eq!(phase, SessionPhase::Done);

        assert_eq!(phase.on_activity(), Some(PhaseChange::Reopened));
        assert_eq!(phase, SessionPhase::Active);
    }

    #[test]
    fn non_done_update_reopens() {
        let mut phase = SessionPhase::Done;
        assert_eq!(
            phase.on_update("LiftingOrderUpdated"),
            Some(PhaseChange::Reopened)
        );
        assert_eq!(phase, SessionPhase::Active);
    }

    #[test]
    fn transitions_are_idempotent() {
        let mut phase = SessionPhase::default();
        assert_eq!(phase.on_update("LiftingOrderUpdated"), None);
        phase.on_update(GROUP_DONE_EVENT);
        assert_eq!(phase.on_update(GROUP_DONE_EVENT), None);
    }
}
