// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Rule-based fraud evaluation.
//!
//! The detector inspects a candidate transfer against the source account's
//! snapshot and trailing history and returns a [`Verdict`]. Evaluation never
//! blocks a transfer: a matched rule marks the transaction for later review,
//! it does not reject it. This flag-but-don't-block behavior is a deliberate
//! business rule, not a missing check.
//!
//! Rules run unconditionally, in declaration order, and every matched
//! reason is collected. Reason ordering is stable so persisted reason
//! strings are reproducible.

use crate::transaction::Transaction;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

/// Thresholds for the fraud rules. Injected per deployment, never hard-coded
/// at call sites.
#[derive(Debug, Clone)]
pub struct FraudConfig {
    /// Rule 1: single-transfer amount above this is flagged.
    pub daily_limit: Decimal,
    /// Rule 2: transfers above this count as "large" for the velocity rule.
    pub velocity_threshold: Decimal,
    /// Rule 2: trailing window ending at the candidate's timestamp.
    pub velocity_window: Duration,
    /// Rule 2: number of large transfers in the window that triggers a flag,
    /// counting the candidate itself.
    pub velocity_count_threshold: usize,
    /// Rule 3: fraction of the pre-debit balance above which a transfer is
    /// considered a large withdrawal.
    pub large_withdrawal_fraction: Decimal,
}

impl Default for FraudConfig {
    fn default() -> Self {
        Self {
            daily_limit: dec!(50000),
            velocity_threshold: dec!(10000),
            velocity_window: Duration::hours(1),
            velocity_count_threshold: 3,
            large_withdrawal_fraction: dec!(0.8),
        }
    }
}

impl FraudConfig {
    /// Human-readable label for the velocity window, used in flag reasons.
    fn window_label(&self) -> String {
        let minutes = self.velocity_window.num_minutes();
        if minutes % 60 == 0 {
            let hours = minutes / 60;
            if hours == 1 {
                "1 hour".to_string()
            } else {
                format!("{hours} hours")
            }
        } else {
            format!("{minutes} minutes")
        }
    }
}

/// Outcome of evaluating one candidate transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    /// Matched rule reasons, in rule-declaration order.
    pub reasons: Vec<String>,
}

impl Verdict {
    pub fn flagged(&self) -> bool {
        !self.reasons.is_empty()
    }

    /// All matched reasons joined with `"; "`, or `None` when clean.
    pub fn reason(&self) -> Option<String> {
        if self.reasons.is_empty() {
            None
        } else {
            Some(self.reasons.join("; "))
        }
    }
}

/// Evaluates candidate transfers against the configured rules.
#[derive(Debug, Clone, Default)]
pub struct FraudDetector {
    config: FraudConfig,
}

impl FraudDetector {
    pub fn new(config: FraudConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FraudConfig {
        &self.config
    }

    /// Evaluates a candidate transfer.
    ///
    /// `balance_before` is the source balance before the debit is applied.
    /// `history` holds the source account's recent debits; entries at or
    /// before `now - velocity_window` are ignored, making the window
    /// half-open: `(now - window, now]`.
    pub fn evaluate(
        &self,
        amount: Decimal,
        balance_before: Decimal,
        history: &[Arc<Transaction>],
        now: DateTime<Utc>,
    ) -> Verdict {
        let cfg = &self.config;
        let mut reasons = Vec::new();

        // Rule 1: single transfer above the daily limit.
        if amount > cfg.daily_limit {
            reasons.push(format!(
                "Exceeds daily limit of {}",
                cfg.daily_limit.normalize()
            ));
        }

        // Rule 2: velocity. Count large debits inside the trailing window,
        // including the candidate itself.
        let window_start = now - cfg.velocity_window;
        let mut large = history
            .iter()
            .filter(|tx| tx.amount > cfg.velocity_threshold)
            .filter(|tx| tx.timestamp > window_start && tx.timestamp <= now)
            .count();
        if amount > cfg.velocity_threshold {
            large += 1;
        }
        if large >= cfg.velocity_count_threshold {
            reasons.push(format!(
                "{}+ large transactions within {}",
                cfg.velocity_count_threshold,
                cfg.window_label()
            ));
        }

        // Rule 3: large withdrawal relative to the pre-debit balance. Both
        // conjuncts must hold; a high balance fraction alone is not enough.
        if amount > balance_before * cfg.large_withdrawal_fraction && amount > cfg.daily_limit {
            reasons.push(format!(
                "Large withdrawal: exceeds {}% of balance and daily limit",
                (cfg.large_withdrawal_fraction * dec!(100)).normalize()
            ));
        }

        Verdict { reasons }
    }
}
