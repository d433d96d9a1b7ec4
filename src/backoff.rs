use rand::Rng;
use std::time::Duration;

pub trait ExponentialBackoff: Sized {
    fn add_spread(&self, spread: Duration) -> Self;
    fn exponential_backoff(&self, max: Duration) -> Self;
}

impl ExponentialBackoff for Duration {
    fn add_spread(&self, spread: Duration) -> Self {
        if spread.is_zero() {
            return *self;
        }
        let spread = rand::rng().random_range(0..spread.as_nanos());
        self.saturating_add(Duration::from_nanos(
            u64::try_from(spread).unwrap_or(u64::MAX),
        ))
    }

    fn exponential_backoff(&self, max: Duration) -> Self {
        self.saturating_mul(2).min(max)
    }
}
