use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Spend against a budget ceiling that resets at fixed period boundaries.
///
/// Reservation is a single check-and-add under the lock, so concurrent callers
/// can never jointly exceed the ceiling.
#[derive(Debug)]
pub struct CostTracker {
    ceiling: f64,
    period: chrono::Duration,
    state: Mutex<BudgetState>,
}

#[derive(Debug)]
struct BudgetState {
    spent: f64,
    period_start: DateTime<Utc>,
}

/// Proof of a successful `try_reserve`, handed back to `record_actual`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reservation {
    amount: f64,
    period_start: DateTime<Utc>,
}

/// Persisted form of the tracker's state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpendRecord {
    pub spent: f64,
    pub period_start: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BudgetSnapshot {
    pub spent: f64,
    pub ceiling: f64,
    pub remaining: f64,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
}

impl CostTracker {
    pub fn new(ceiling: f64, period: Duration, period_start: DateTime<Utc>) -> Self {
        // Periods beyond chrono's range are effectively "never roll over".
        let period = chrono::Duration::from_std(period).unwrap_or(chrono::Duration::days(36_500));
        Self {
            ceiling,
            period,
            state: Mutex::new(BudgetState {
                spent: 0.0,
                period_start,
            }),
        }
    }

    pub fn try_reserve(&self, estimated_cost: f64) -> Option<Reservation> {
        self.try_reserve_at(estimated_cost, Utc::now())
    }

    pub fn try_reserve_at(&self, estimated_cost: f64, now: DateTime<Utc>) -> Option<Reservation> {
        if !estimated_cost.is_finite() {
            return None;
        }
        let amount = estimated_cost.max(0.0);
        let mut state = self.state.lock();
        self.roll_over(&mut state, now);
        if state.spent + amount <= self.ceiling {
            state.spent += amount;
            Some(Reservation {
                amount,
                period_start: state.period_start,
            })
        } else {
            None
        }
    }

    /// Reconciles a reservation with what the call actually cost. Pass `0.0`
    /// to release a reservation whose call never succeeded.
    ///
    /// Within the reservation's own period the spend is adjusted by the
    /// difference. Once that period has rolled over, refunds are dropped (the
    /// reservation was already wiped by the reset) and only an overage is
    /// charged to the current period.
    pub fn record_actual(&self, reservation: Reservation, actual_cost: f64) {
        self.record_actual_at(reservation, actual_cost, Utc::now());
    }

    pub fn record_actual_at(&self, reservation: Reservation, actual_cost: f64, now: DateTime<Utc>) {
        if !actual_cost.is_finite() {
            return;
        }
        let delta = actual_cost.max(0.0) - reservation.amount;
        let mut state = self.state.lock();
        self.roll_over(&mut state, now);
        if state.period_start == reservation.period_start {
            state.spent = (state.spent + delta).max(0.0);
        } else if delta > 0.0 {
            state.spent += delta;
        }
    }

    /// Current spend and period, for persisting across restarts.
    pub fn spend_record(&self) -> SpendRecord {
        let mut state = self.state.lock();
        self.roll_over(&mut state, Utc::now());
        SpendRecord {
            spent: state.spent,
            period_start: state.period_start,
        }
    }

    /// Adopts a persisted spend record if its period is still running at `now`.
    /// Returns `false` (and changes nothing) when the record's period is over or
    /// the record is unusable.
    pub fn restore_at(&self, record: &SpendRecord, now: DateTime<Utc>) -> bool {
        if !record.spent.is_finite() || record.spent < 0.0 {
            return false;
        }
        if record.period_start > now || now >= record.period_start + self.period {
            return false;
        }
        let mut state = self.state.lock();
        self.roll_over(&mut state, now);
        state.spent += record.spent;
        state.period_start = record.period_start;
        true
    }

    pub fn snapshot(&self) -> BudgetSnapshot {
        self.snapshot_at(Utc::now())
    }

    pub fn snapshot_at(&self, now: DateTime<Utc>) -> BudgetSnapshot {
        let mut state = self.state.lock();
        self.roll_over(&mut state, now);
        BudgetSnapshot {
            spent: state.spent,
            ceiling: self.ceiling,
            remaining: (self.ceiling - state.spent).max(0.0),
            period_start: state.period_start,
            period_end: state.period_start + self.period,
        }
    }

    /// Advances to the period containing `now`. Skipping several idle periods
    /// still resets once, and the new start stays aligned to the boundaries.
    fn roll_over(&self, state: &mut BudgetState, now: DateTime<Utc>) {
        let period_end = state.period_start + self.period;
        if now < period_end {
            return;
        }
        let period_ms = self.period.num_milliseconds().max(1);
        let elapsed_ms = (now - state.period_start).num_milliseconds();
        let periods = elapsed_ms / period_ms;
        state.period_start += chrono::Duration::milliseconds(periods * period_ms);
        state.spent = 0.0;
    }
}
