use thiserror::Error;

use crate::dao::models::PollStatus;

/// Creator-initiated actions that close a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollAction {
    /// Close the poll and keep it in the archive.
    End,
    /// Discard the poll.
    Delete,
}

impl PollAction {
    /// Lowercase verb for user-facing messages.
    pub fn as_str(self) -> &'static str {
        match self {
            PollAction::End => "end",
            PollAction::Delete => "delete",
        }
    }
}

/// Result of applying a [`PollAction`] to a poll status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// The status moves to a new terminal value.
    Changed(PollStatus),
    /// The action is a repeat of one already applied; nothing to write.
    Unchanged,
}

/// Error returned when attempting an invalid lifecycle transition.
///
/// The message is shown to users as-is, so it sticks to plain words.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Poll is not active, cannot {}.", .action.as_str())]
pub struct InvalidTransition {
    /// The status the poll was in when the invalid action was received.
    pub from: PollStatus,
    /// The action that cannot be applied from this status.
    pub action: PollAction,
}

/// Compute the lifecycle transition for an action.
///
/// Statuses only move forward: an active poll can end or be deleted, and
/// neither terminal status can be left again. Deleting an already deleted
/// poll is accepted as a repeat so retried requests stay harmless.
pub fn advance(from: PollStatus, action: PollAction) -> Result<Advance, InvalidTransition> {
    let next = match (from, action) {
        (PollStatus::Active, PollAction::End) => Advance::Changed(PollStatus::Ended),
        (PollStatus::Active, PollAction::Delete) => Advance::Changed(PollStatus::Deleted),
        (PollStatus::Deleted, PollAction::Delete) => Advance::Unchanged,
        (from, action) => return Err(InvalidTransition { from, action }),
    };

    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ending_an_active_poll_moves_to_ended() {
        assert_eq!(
            advance(PollStatus::Active, PollAction::End),
            Ok(Advance::Changed(PollStatus::Ended))
        );
    }

    #[test]
    fn deleting_an_active_poll_moves_to_deleted() {
        assert_eq!(
            advance(PollStatus::Active, PollAction::Delete),
            Ok(Advance::Changed(PollStatus::Deleted))
        );
    }

    #[test]
    fn deleting_twice_is_a_repeat() {
        assert_eq!(
            advance(PollStatus::Deleted, PollAction::Delete),
            Ok(Advance::Unchanged)
        );
    }

    #[test]
    fn ended_polls_cannot_be_ended_again() {
        let err = advance(PollStatus::Ended, PollAction::End).unwrap_err();
        assert_eq!(err.from, PollStatus::Ended);
        assert_eq!(err.action, PollAction::End);
    }

    #[test]
    fn ended_polls_cannot_be_deleted() {
        let err = advance(PollStatus::Ended, PollAction::Delete).unwrap_err();
        assert_eq!(err.from, PollStatus::Ended);
        assert_eq!(err.action, PollAction::Delete);
    }

    #[test]
    fn deleted_polls_cannot_be_ended() {
        let err = advance(PollStatus::Deleted, PollAction::End).unwrap_err();
        assert_eq!(err.from, PollStatus::Deleted);
        assert_eq!(err.action, PollAction::End);
    }

    #[test]
    fn rejections_read_as_plain_sentences() {
        let ended = advance(PollStatus::Ended, PollAction::End).unwrap_err();
        assert_eq!(ended.to_string(), "Poll is not active, cannot end.");

        let deleted = advance(PollStatus::Ended, PollAction::Delete).unwrap_err();
        assert_eq!(deleted.to_string(), "Poll is not active, cannot delete.");
    }
}
