//! Actions emitted by the position manager for the broker to execute.

use serde::{Deserialize, Serialize};

use crate::domain::{ExitReason, Ticket};

/// Which ATR trailing phase produced a stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrailPhase {
    Initial,
    Conservative,
    Aggressive,
    /// Aggressive phase capped by an MFE profit lock.
    MfeLock,
    Reversal,
    Consolidation,
}

/// Why a stop-loss move was proposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    BreakEven,
    TrailingStop,
    AtrTrailing(TrailPhase),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PositionAction {
    ModifyStopLoss {
        ticket: Ticket,
        new_sl: f64,
        reason: StopReason,
    },
    PartialClose {
        ticket: Ticket,
        volume: f64,
        threshold_pct: f64,
    },
    ClosePosition {
        ticket: Ticket,
        reason: ExitReason,
    },
}

impl PositionAction {
    pub fn ticket(&self) -> Ticket {
        match *self {
            PositionAction::ModifyStopLoss { ticket, .. }
            | PositionAction::PartialClose { ticket, .. }
            | PositionAction::ClosePosition { ticket, .. } => ticket,
        }
    }
}
