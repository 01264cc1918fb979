use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-shard write quota: 1 MiB/s and 1000 records/s.
pub const WRITE_BYTES_PER_SECOND: f64 = 1024.0 * 1024.0;
pub const WRITE_RECORDS_PER_SECOND: f64 = 1000.0;
/// Per-shard read quota: 5 transactions/s.
pub const READ_TRANSACTIONS_PER_SECOND: f64 = 5.0;

/// Continuously refilled token bucket. Refill happens lazily on access, so
/// there is no periodic reset task to run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBucket {
    capacity: f64,
    fill_rate: f64,
    tokens: f64,
    last_refill: DateTime<Utc>,
}

impl TokenBucket {
    pub fn new(capacity: f64, fill_rate: f64, now: DateTime<Utc>) -> Self {
        Self {
            capacity,
            fill_rate,
            tokens: capacity,
            last_refill: now,
        }
    }

    fn refill(&mut self, now: DateTime<Utc>) {
        let elapsed_ms = (now - self.last_refill).num_milliseconds();
        if elapsed_ms > 0 {
            let refilled = self.fill_rate * (elapsed_ms as f64 / 1000.0);
            self.tokens = (self.tokens + refilled).min(self.capacity);
            self.last_refill = now;
        }
    }

    /// Debit `amount` tokens if the bucket holds them; returns whether the
    /// debit happened.
    pub fn try_consume(&mut self, amount: f64, now: DateTime<Utc>) -> bool {
        self.refill(now);
        if self.tokens >= amount {
            self.tokens -= amount;
            true
        } else {
            false
        }
    }

    /// Refill, then report whether `amount` tokens are present without
    /// debiting them. Used to check several buckets before debiting any.
    pub fn has_capacity(&mut self, amount: f64, now: DateTime<Utc>) -> bool {
        self.refill(now);
        self.tokens >= amount
    }

    pub fn available(&self) -> f64 {
        self.tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn epoch() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn starts_full_and_debits() {
        let mut bucket = TokenBucket::new(1000.0, 1000.0, epoch());
        assert!(bucket.try_consume(600.0, epoch()));
        assert!(bucket.try_consume(400.0, epoch()));
        assert!(!bucket.try_consume(1.0, epoch()));
    }

    #[test]
    fn refills_continuously() {
        let mut bucket = TokenBucket::new(1000.0, 1000.0, epoch());
        assert!(bucket.try_consume(1000.0, epoch()));
        // 250ms later a quarter of the budget is back
        let later = epoch() + Duration::milliseconds(250);
        assert!(bucket.try_consume(250.0, later));
        assert!(!bucket.try_consume(1.0, later));
    }

    #[test]
    fn refill_caps_at_capacity() {
        let mut bucket = TokenBucket::new(1000.0, 1000.0, epoch());
        let much_later = epoch() + Duration::seconds(3600);
        assert!(bucket.try_consume(1000.0, much_later));
        assert!(!bucket.try_consume(1.0, much_later));
    }
}
