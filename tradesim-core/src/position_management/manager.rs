//! Position manager: one state machine per ticket.
//!
//! Priority per update, first applicable wins:
//! 1. partial profit (one level per update, ascending, never re-fires)
//! 2. break-even (one-shot)
//! 3. trailing stop (pluggable strategy)
//! 4. time exit (simulation time)
//!
//! The broker stays the source of truth for volume and protective levels.
//! The manager only proposes actions and mirrors what the broker accepted.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::action::{PositionAction, StopReason};
use super::config::{PartialProfitLevel, PositionManagerConfig};
use super::managed::{ManagedPosition, ManagedPositionError, PositionFill};
use super::trailing::{self, TrailingStrategy};
use crate::broker::TradingClient;
use crate::domain::{ExitReason, Position, Side, Ticket};

/// Snapshot of one managed position for reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSummary {
    pub ticket: Ticket,
    pub symbol: String,
    pub side: Side,
    pub entry_price: f64,
    pub current_price: f64,
    pub volume: f64,
    pub sl: Option<f64>,
    pub tp: Option<f64>,
    pub profit_pct: f64,
    pub risk_multiple: f64,
    pub max_profit_reached: f64,
    pub max_loss_reached: f64,
    pub break_even_activated: bool,
    pub partial_levels_taken: Vec<f64>,
    pub hours_held: f64,
}

#[derive(Debug, Clone)]
pub struct PositionManager {
    config: PositionManagerConfig,
    levels: Vec<PartialProfitLevel>,
    trailing: Option<Box<dyn TrailingStrategy>>,
    positions: BTreeMap<Ticket, ManagedPosition>,
}

impl PositionManager {
    pub fn new(config: PositionManagerConfig) -> Self {
        let trailing = trailing::from_config(&config.trailing);
        Self::build(config, trailing)
    }

    /// Use a custom trailing strategy instead of the configured one.
    pub fn with_trailing(config: PositionManagerConfig, strategy: Box<dyn TrailingStrategy>) -> Self {
        Self::build(config, Some(strategy))
    }

    fn build(config: PositionManagerConfig, trailing: Option<Box<dyn TrailingStrategy>>) -> Self {
        let levels = if config.partial_profit.enabled {
            config.partial_profit.sorted_levels()
        } else {
            Vec::new()
        };
        Self {
            config,
            levels,
            trailing,
            positions: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &PositionManagerConfig {
        &self.config
    }

    pub fn trailing_name(&self) -> Option<&str> {
        self.trailing.as_deref().map(|t| t.name())
    }

    // ── Tracking ───────────────────────────────────────────────────────

    /// Start tracking a freshly filled position. Already tracked tickets are left as they are.
    pub fn track(&mut self, fill: PositionFill) -> Result<&ManagedPosition, ManagedPositionError> {
        match self.positions.entry(fill.ticket) {
            Entry::Occupied(existing) => Ok(existing.into_mut()),
            Entry::Vacant(slot) => {
                let managed = ManagedPosition::new(fill)?;
                info!(
                    ticket = %managed.ticket,
                    side = ?managed.side,
                    entry = managed.entry_price,
                    initial_risk = managed.initial_risk_points,
                    "tracking position"
                );
                Ok(slot.insert(managed))
            }
        }
    }

    pub fn get(&self, ticket: Ticket) -> Option<&ManagedPosition> {
        self.positions.get(&ticket)
    }

    pub fn is_tracked(&self, ticket: Ticket) -> bool {
        self.positions.contains_key(&ticket)
    }

    pub fn tickets(&self) -> Vec<Ticket> {
        self.positions.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Stop tracking a ticket, returning its final state.
    pub fn remove(&mut self, ticket: Ticket) -> Option<ManagedPosition> {
        let removed = self.positions.remove(&ticket);
        if removed.is_some() {
            debug!(%ticket, "stopped tracking position");
        }
        removed
    }

    /// Drop every tracked ticket not in `open`. Returns the dropped states.
    pub fn retain_open(&mut self, open: &[Ticket]) -> Vec<ManagedPosition> {
        let gone: Vec<Ticket> = self
            .positions
            .keys()
            .filter(|t| !open.contains(t))
            .copied()
            .collect();
        gone.into_iter().filter_map(|t| self.remove(t)).collect()
    }

    /// Mirror the broker's volume and protective levels.
    pub fn sync_from_broker(&mut self, position: &Position) {
        if let Some(managed) = self.positions.get_mut(&position.ticket) {
            managed.volume = position.volume;
            managed.sl = position.sl;
            managed.tp = position.tp;
        }
    }

    // ── State machine ──────────────────────────────────────────────────

    /// Advance one ticket to `price` and return at most one action.
    pub fn update(
        &mut self,
        ticket: Ticket,
        price: f64,
        now: DateTime<Utc>,
        atr: Option<f64>,
    ) -> Option<PositionAction> {
        let levels = &self.levels;
        let config = &self.config;
        let trailing = self.trailing.as_deref();
        let position = self.positions.get_mut(&ticket)?;

        if !(price.is_finite() && price > 0.0) {
            warn!(%ticket, price, "update skipped, invalid price");
            return None;
        }
        if atr.is_some() && !position.observe_atr(atr) {
            debug!(%ticket, ?atr, "unusable ATR reading, keeping last good value");
        }
        position.observe(price);

        if let Some(action) = check_partial_profit(position, levels) {
            return Some(action);
        }

        if config.break_even.enabled && !position.break_even_activated {
            if let Some(action) = check_break_even(position, config) {
                return Some(action);
            }
        }

        if let Some(strategy) = trailing {
            if let Some(proposal) = strategy.propose(position) {
                debug!(
                    %ticket,
                    new_sl = proposal.new_sl,
                    reason = ?proposal.reason,
                    "trailing stop"
                );
                return Some(PositionAction::ModifyStopLoss {
                    ticket,
                    new_sl: proposal.new_sl,
                    reason: proposal.reason,
                });
            }
        }

        if let Some(max_hours) = config.max_position_hold_hours {
            let held = position.hours_held(now);
            if held >= max_hours {
                info!(%ticket, hours_held = held, "time exit");
                return Some(PositionAction::ClosePosition {
                    ticket,
                    reason: ExitReason::TimeExit,
                });
            }
        }

        None
    }

    /// Carry out an action through the trading client.
    pub fn execute(&mut self, action: &PositionAction, client: &mut dyn TradingClient) -> bool {
        match *action {
            PositionAction::ModifyStopLoss { ticket, new_sl, .. } => {
                let ok = client.modify_position(ticket, Some(new_sl), None);
                if ok {
                    if let Some(p) = self.positions.get_mut(&ticket) {
                        p.sl = Some(new_sl);
                    }
                }
                ok
            }
            PositionAction::PartialClose { ticket, volume, .. } => {
                let ok = client.close_position_partial(ticket, volume);
                match client.position(ticket) {
                    Some(p) => self.sync_from_broker(&p),
                    None => {
                        self.remove(ticket);
                    }
                }
                ok
            }
            PositionAction::ClosePosition { ticket, reason } => {
                let ok = client.close_position(ticket, reason);
                if ok {
                    self.remove(ticket);
                }
                ok
            }
        }
    }

    // ── Reporting ──────────────────────────────────────────────────────

    pub fn summary(&self, ticket: Ticket, now: DateTime<Utc>) -> Option<PositionSummary> {
        self.positions.get(&ticket).map(|p| summarize(p, now))
    }

    pub fn summaries(&self, now: DateTime<Utc>) -> Vec<PositionSummary> {
        self.positions.values().map(|p| summarize(p, now)).collect()
    }

    /// Mean hours held over tracked positions, 0 when none.
    pub fn average_hold_hours(&self, now: DateTime<Utc>) -> f64 {
        if self.positions.is_empty() {
            return 0.0;
        }
        self.positions.values().map(|p| p.hours_held(now)).sum::<f64>()
            / self.positions.len() as f64
    }
}

fn check_partial_profit(
    position: &mut ManagedPosition,
    levels: &[PartialProfitLevel],
) -> Option<PositionAction> {
    let level = levels.iter().find(|l| {
        position.profit_pct >= l.profit_threshold_pct
            && !position.has_taken_level(l.profit_threshold_pct)
    })?;
    position.partial_levels_taken.push(level.profit_threshold_pct);
    let volume = position.volume * level.close_pct / 100.0;
    info!(
        ticket = %position.ticket,
        threshold = level.profit_threshold_pct,
        volume,
        "partial profit"
    );
    Some(PositionAction::PartialClose {
        ticket: position.ticket,
        volume,
        threshold_pct: level.profit_threshold_pct,
    })
}

fn check_break_even(
    position: &mut ManagedPosition,
    config: &PositionManagerConfig,
) -> Option<PositionAction> {
    let be = &config.break_even;
    if position.profit_pct < be.activation_pct {
        return None;
    }
    position.break_even_activated = true;
    let new_sl = match position.side {
        Side::Buy => position.entry_price * (1.0 + be.buffer_pct / 100.0),
        Side::Sell => position.entry_price * (1.0 - be.buffer_pct / 100.0),
    };
    if !position.sl_improves(new_sl, 0.0) {
        debug!(ticket = %position.ticket, new_sl, "break-even reached, stop already tighter");
        return None;
    }
    info!(ticket = %position.ticket, from = ?position.sl, to = new_sl, "break-even");
    Some(PositionAction::ModifyStopLoss {
        ticket: position.ticket,
        new_sl,
        reason: StopReason::BreakEven,
    })
}

fn summarize(p: &ManagedPosition, now: DateTime<Utc>) -> PositionSummary {
    PositionSummary {
        ticket: p.ticket,
        symbol: p.symbol.clone(),
        side: p.side,
        entry_price: p.entry_price,
        current_price: p.current_price,
        volume: p.volume,
        sl: p.sl,
        tp: p.tp,
        profit_pct: p.profit_pct,
        risk_multiple: p.risk_multiple(),
        max_profit_reached: p.max_profit_reached,
        max_loss_reached: p.max_loss_reached,
        break_even_activated: p.break_even_activated,
        partial_levels_taken: p.partial_levels_taken.clone(),
        hours_held: p.hours_held(now),
    }
}
