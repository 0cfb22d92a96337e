use std::fmt;

/// Lifecycle state of a task.
///
/// The state is always read as a single value, so impossible flag
/// combinations (active *and* cancelled, ...) cannot be observed.
///
/// ```text
/// New ──► Active ──► Completing ──► Completed
///           │            │
///           └────────────┴──► Cancelling ──► Cancelled
/// ```
///
/// `Completing` and `Cancelling` are transient: the task's own body is done
/// (or is being abandoned) and it waits for its children to terminate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    /// Created but not yet scheduled.
    New,

    /// Scheduled; its body may run.
    Active,

    /// Body finished; waiting for children.
    Completing,

    /// Cancelled or failed; waiting for children to stop.
    Cancelling,

    /// Terminal: stopped through cancellation or failure.
    Cancelled,

    /// Terminal: body and all children completed.
    Completed,
}

impl JobState {
    /// Returns `true` for `Cancelled` and `Completed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Cancelled | JobState::Completed)
    }

    /// Returns `true` once cancellation has been requested, terminal or not.
    pub fn is_cancelling(self) -> bool {
        matches!(self, JobState::Cancelling | JobState::Cancelled)
    }

    /// Checks an edge of the lifecycle graph.
    pub(crate) fn can_transition_to(self, next: JobState) -> bool {
        use JobState::*;

        matches!(
            (self, next),
            (New, Active)
                | (New, Cancelling)
                | (Active, Completing)
                | (Active, Completed)
                | (Active, Cancelling)
                | (Completing, Completed)
                | (Completing, Cancelling)
                | (Cancelling, Cancelled)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            JobState::New => "new",
            JobState::Active => "active",
            JobState::Completing => "completing",
            JobState::Cancelling => "cancelling",
            JobState::Cancelled => "cancelled",
            JobState::Completed => "completed",
        };

        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::JobState::{self, *};

    const ALL: [JobState; 6] = [New, Active, Completing, Cancelling, Cancelled, Completed];

    fn rank(state: JobState) -> u8 {
        match state {
            New => 0,
            Active => 1,
            Completing => 2,
            Cancelling => 3,
            Cancelled | Completed => 4,
        }
    }

    #[test]
    fn transitions_only_move_forward() {
        for from in ALL {
            for to in ALL {
                if from.can_transition_to(to) {
                    assert!(rank(to) > rank(from), "{from} -> {to} goes backwards");
                }
            }
        }
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for to in ALL {
            assert!(!Cancelled.can_transition_to(to));
            assert!(!Completed.can_transition_to(to));
        }
    }

    #[test]
    fn completed_is_unreachable_from_cancelling() {
        assert!(!Cancelling.can_transition_to(Completed));
        assert!(Completing.can_transition_to(Cancelling));
    }
}
