use crate::models::{OrderStatus, StockEventKind};

// ============================================================================
// Status Transition Function
// ============================================================================
//
// pending is the only state a stock event may move an order out of;
// validated and failed are terminal. Re-delivery of an already-applied
// event must be a clean no-op, and a terminal order receiving the opposite
// outcome is an anomaly whose handling is a deployment decision, not an
// automatic overwrite.
//
// ============================================================================

/// What to do when a terminal order receives a conflicting terminal event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Keep the stored status and log the conflict (default)
    KeepFirst,
    /// Let the later event win
    Overwrite,
}

impl std::str::FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "keep-first" => Ok(ConflictPolicy::KeepFirst),
            "overwrite" => Ok(ConflictPolicy::Overwrite),
            other => Err(format!(
                "unknown conflict policy {other:?} (expected \"keep-first\" or \"overwrite\")"
            )),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransitionPlan {
    /// Write the new status to the store
    Apply(OrderStatus),
    /// The event's target status is already in place; nothing to write
    AlreadyApplied,
    /// Conflicting terminal outcome held back by ConflictPolicy::KeepFirst
    Rejected { current: OrderStatus },
}

pub fn plan_transition(
    current: OrderStatus,
    kind: StockEventKind,
    policy: ConflictPolicy,
) -> TransitionPlan {
    let target = kind.target_status();

    if current == target {
        return TransitionPlan::AlreadyApplied;
    }

    if !current.is_terminal() {
        return TransitionPlan::Apply(target);
    }

    match policy {
        ConflictPolicy::Overwrite => TransitionPlan::Apply(target),
        ConflictPolicy::KeepFirst => TransitionPlan::Rejected { current },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_moves_to_validated() {
        assert_eq!(
            plan_transition(
                OrderStatus::Pending,
                StockEventKind::Validated,
                ConflictPolicy::KeepFirst
            ),
            TransitionPlan::Apply(OrderStatus::Validated)
        );
    }

    #[test]
    fn test_pending_moves_to_failed() {
        assert_eq!(
            plan_transition(
                OrderStatus::Pending,
                StockEventKind::Failed,
                ConflictPolicy::KeepFirst
            ),
            TransitionPlan::Apply(OrderStatus::Failed)
        );
    }

    #[test]
    fn test_reapplying_terminal_status_is_a_noop() {
        assert_eq!(
            plan_transition(
                OrderStatus::Validated,
                StockEventKind::Validated,
                ConflictPolicy::KeepFirst
            ),
            TransitionPlan::AlreadyApplied
        );
        assert_eq!(
            plan_transition(
                OrderStatus::Failed,
                StockEventKind::Failed,
                ConflictPolicy::KeepFirst
            ),
            TransitionPlan::AlreadyApplied
        );
    }

    #[test]
    fn test_conflicting_terminal_is_held_back_by_default() {
        assert_eq!(
            plan_transition(
                OrderStatus::Validated,
                StockEventKind::Failed,
                ConflictPolicy::KeepFirst
            ),
            TransitionPlan::Rejected {
                current: OrderStatus::Validated
            }
        );
    }

    #[test]
    fn test_conflicting_terminal_wins_under_overwrite_policy() {
        assert_eq!(
            plan_transition(
                OrderStatus::Validated,
                StockEventKind::Failed,
                ConflictPolicy::Overwrite
            ),
            TransitionPlan::Apply(OrderStatus::Failed)
        );
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!(
            "keep-first".parse::<ConflictPolicy>().unwrap(),
            ConflictPolicy::KeepFirst
        );
        assert_eq!(
            "overwrite".parse::<ConflictPolicy>().unwrap(),
            ConflictPolicy::Overwrite
        );
        assert!("last-wins".parse::<ConflictPolicy>().is_err());
    }
}
