//! Per-symbol losing-streak lockout.
//!
//! Each symbol is Clear, Accumulating (some stop-loss hits inside the window)
//! or Locked (cooldown running). A tracker is an explicit store shared by
//! reference (e.g. behind an `Arc`); one mutex guards the whole map so every
//! update is a single critical section.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::error::TradesimError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CooldownPolicy {
    /// Stop-loss hits inside the window that trigger a lock.
    pub threshold: usize,
    pub window_secs: i64,
    pub pause_secs: i64,
}

impl CooldownPolicy {
    /// Reject a policy that could never lock, or would lock into the past.
    pub fn validate(&self) -> Result<(), TradesimError> {
        if self.threshold == 0 {
            return Err(TradesimError::invalid("cooldown", "hits", "hits must be at least 1"));
        }
        for (key, value) in [("window_min", self.window_secs), ("pause_min", self.pause_secs)] {
            if value < 0 {
                return Err(TradesimError::invalid(
                    "cooldown",
                    key,
                    format!("{key} must be non-negative"),
                ));
            }
        }
        Ok(())
    }
}

impl Default for CooldownPolicy {
    fn default() -> Self {
        CooldownPolicy {
            threshold: 3,
            window_secs: 15 * 60,
            pause_secs: 20 * 60,
        }
    }
}

/// How a trade ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TradeOutcome {
    StopLoss,
    TakeProfit,
    Flat,
}

impl FromStr for TradeOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sl" | "stop_loss" => Ok(TradeOutcome::StopLoss),
            "tp" | "take_profit" => Ok(TradeOutcome::TakeProfit),
            "flat" => Ok(TradeOutcome::Flat),
            other => Err(format!("unknown trade outcome: {other}")),
        }
    }
}

impl fmt::Display for TradeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TradeOutcome::StopLoss => "sl",
            TradeOutcome::TakeProfit => "tp",
            TradeOutcome::Flat => "flat",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CooldownPhase {
    Clear,
    Accumulating,
    Locked,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CooldownState {
    /// Stop-loss timestamps inside the window, oldest first.
    pub hits: Vec<i64>,
    /// Epoch seconds; 0 when no lock was ever set.
    pub cooldown_until: i64,
}

impl CooldownState {
    pub fn is_locked(&self, now: i64) -> bool {
        now < self.cooldown_until
    }

    pub fn phase(&self, now: i64) -> CooldownPhase {
        if self.is_locked(now) {
            CooldownPhase::Locked
        } else if self.hits.is_empty() {
            CooldownPhase::Clear
        } else {
            CooldownPhase::Accumulating
        }
    }

    fn prune(&mut self, window_secs: i64, now: i64) {
        let cutoff = now.saturating_sub(window_secs);
        self.hits.retain(|&t| t >= cutoff);
    }
}

/// Answer to "may this symbol trade now?".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CooldownStatus {
    pub active: bool,
    pub seconds_remaining: i64,
}

#[derive(Debug, Default)]
pub struct CooldownTracker {
    policy: CooldownPolicy,
    states: Mutex<HashMap<String, CooldownState>>,
}

impl CooldownTracker {
    pub fn new(policy: CooldownPolicy) -> Result<Self, TradesimError> {
        policy.validate()?;
        Ok(CooldownTracker {
            policy,
            states: Mutex::new(HashMap::new()),
        })
    }

    pub fn policy(&self) -> CooldownPolicy {
        self.policy
    }

    // Every mutation finishes inside one guard, so a poisoned map is still whole.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, CooldownState>> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a trade outcome at `now` and return the symbol's new state.
    ///
    /// A stop-loss while a lock is running does not count towards a new
    /// streak; a win or flat exit clears the streak but leaves a running lock
    /// in place.
    pub fn record_outcome(&self, symbol: &str, outcome: TradeOutcome, now: i64) -> CooldownState {
        let mut states = self.lock();
        let state = states.entry(symbol.to_string()).or_default();
        match outcome {
            TradeOutcome::StopLoss => {
                if !state.is_locked(now) {
                    state.prune(self.policy.window_secs, now);
                    state.hits.push(now);
                    if state.hits.len() >= self.policy.threshold {
                        state.cooldown_until = now.saturating_add(self.policy.pause_secs);
                        state.hits.clear();
                    }
                }
            }
            TradeOutcome::TakeProfit | TradeOutcome::Flat => state.hits.clear(),
        }
        state.clone()
    }

    /// Pure read: is `symbol` locked at `now`, and for how much longer?
    pub fn is_in_cooldown(&self, symbol: &str, now: i64) -> CooldownStatus {
        let until = self
            .lock()
            .get(symbol)
            .map_or(0, |state| state.cooldown_until);
        CooldownStatus {
            active: now < until,
            seconds_remaining: until.saturating_sub(now).max(0),
        }
    }

    pub fn state(&self, symbol: &str) -> Option<CooldownState> {
        self.lock().get(symbol).cloned()
    }

    pub fn phase(&self, symbol: &str, now: i64) -> CooldownPhase {
        self.lock()
            .get(symbol)
            .map_or(CooldownPhase::Clear, |state| state.phase(now))
    }

    /// Drop hit timestamps that have aged out of the window for every symbol.
    /// Symbols themselves are kept.
    pub fn prune_hits(&self, now: i64) {
        let window = self.policy.window_secs;
        for state in self.lock().values_mut() {
            state.prune(window, now);
        }
    }

    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.lock().keys().cloned().collect();
        symbols.sort();
        symbols
    }
}
