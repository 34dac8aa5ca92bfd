//! Per-entry annotations that decide what happens right before a stage is shown.

use serde::{Deserialize, Serialize};

use super::models::FlowStageBinding;

/// Attached to every plan entry at planning time.
///
/// The marker travels with the serialized plan, so a plan restored from the
/// session keeps its re-evaluation and retry behaviour.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StageMarker {
    /// Present the stage as-is.
    #[default]
    Plain,
    /// Re-run the binding's policies against the current plan context first.
    Reevaluate,
    /// Present the stage as-is; failed submissions may be retried up to `remaining` times.
    Retry { remaining: u32 },
}

impl StageMarker {
    /// Pick the marker a freshly planned binding gets.
    #[must_use]
    pub fn for_binding(binding: &FlowStageBinding) -> Self {
        if binding.re_evaluate_policies {
            Self::Reevaluate
        } else if let Some(remaining) = binding.re_evaluate_on_failure_limit {
            Self::Retry { remaining }
        } else {
            Self::Plain
        }
    }

    /// Marker to keep after a failed submission.
    ///
    /// `Retry` spends one unit of its budget; `None` means the budget was
    /// already spent and the flow must not be retried again.
    #[must_use]
    pub const fn after_failure(self) -> Option<Self> {
        match self {
            Self::Retry { remaining: 0 } => None,
            Self::Retry { remaining } => Some(Self::Retry {
                remaining: remaining - 1,
            }),
            Self::Plain | Self::Reevaluate => Some(self),
        }
    }
}
