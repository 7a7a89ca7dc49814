//! Circulation policy knobs.

use serde::{Deserialize, Serialize};

/// Tunable circulation parameters, read from the environment at startup and
/// handed to stores and handlers.
///
/// Amounts are in the smallest currency unit (cents).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CirculationPolicy {
    /// Fine accrued per full or partial day overdue.
    pub fine_per_day_cents: i64,

    /// Days added to the due date by one renewal.
    pub renewal_extension_days: i64,
}

impl Default for CirculationPolicy {
    fn default() -> Self {
        Self {
            fine_per_day_cents: 50_00,
            renewal_extension_days: 14,
        }
    }
}
