//! Redelivery backoff for consumed messages.

use std::time::Duration;

/// Delay before a failed delivery is given back to the broker.
///
/// Linear in the delivery count: the `n`th failed delivery waits `n * unit`.
/// No jitter, so the schedule is predictable for operators.
pub fn redelivery_delay(delivery_count: u32, unit: Duration) -> Duration {
    unit.saturating_mul(delivery_count)
}
