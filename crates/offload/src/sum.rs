//! Reference CPU-bound work function: the sum of `0..=n`.

use anyhow::anyhow;
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::handler::WorkHandler;

/// Upper bound applied when none is configured.
pub const DEFAULT_MAX_INPUT_BOUND: u64 = 5_000_000_000;

/// Iterations between two cancellation checks.
const CANCEL_CHECK_INTERVAL: u64 = 1 << 20;

/// Sums `0 + 1 + ... + n` by plain iteration, so the cost grows linearly
/// with `n`. Accumulates in `u128` with checked addition.
#[derive(Debug, Clone)]
pub struct SumHandler {
    max_input_bound: u64,
}

impl SumHandler {
    pub fn new(max_input_bound: u64) -> Self {
        Self { max_input_bound }
    }

    pub fn max_input_bound(&self) -> u64 {
        self.max_input_bound
    }

    fn sum_to(&self, n: u64, cancel: &CancellationToken) -> anyhow::Result<u128> {
        let mut sum: u128 = 0;
        for i in 0..=n {
            if i % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
                return Err(Error::Cancelled.into());
            }
            sum = sum
                .checked_add(u128::from(i))
                .ok_or_else(|| anyhow!("sum overflowed at i = {}", i))?;
        }
        Ok(sum)
    }
}

impl Default for SumHandler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_INPUT_BOUND)
    }
}

impl WorkHandler for SumHandler {
    type Input = i64;
    type Output = u128;

    fn validate(&self, n: &i64) -> Result<(), String> {
        if *n < 0 {
            return Err(format!("bound must be non-negative, got {}", n));
        }
        Ok(())
    }

    fn handle(&self, n: i64, cancel: &CancellationToken) -> anyhow::Result<u128> {
        let n = u64::try_from(n).map_err(|_| anyhow!("negative bound {}", n))?;
        let clamped = n.min(self.max_input_bound);
        if clamped < n {
            tracing::debug!("Clamping bound {} to {}", n, clamped);
        }
        self.sum_to(clamped, cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn closed_form(n: u64) -> u128 {
        let n = u128::from(n);
        n * (n + 1) / 2
    }

    #[test]
    fn test_sum_matches_closed_form() {
        let handler = SumHandler::default();
        let token = CancellationToken::new();

        for n in [0u64, 1, 2, 10, 1_000, 123_457, 3_000_000] {
            let sum = handler.handle(n as i64, &token).unwrap();
            assert_eq!(sum, closed_form(n), "n = {}", n);
        }
    }

    #[test]
    fn test_beyond_f64_precision() {
        // 2^53 is exceeded by the sum for n around 1.34e8
        let n = 150_000_000u64;
        let sum = SumHandler::default()
            .handle(n as i64, &CancellationToken::new())
            .unwrap();
        assert_eq!(sum, 11_250_000_075_000_000);
        assert!(sum > 1u128 << 53);
    }

    #[test]
    fn test_clamps_to_bound() {
        let handler = SumHandler::new(100);
        let sum = handler.handle(1_000_000, &CancellationToken::new()).unwrap();
        assert_eq!(sum, 5050);
    }

    #[test]
    fn test_rejects_negative() {
        let handler = SumHandler::default();
        assert!(handler.validate(&-1).is_err());
        assert!(handler.validate(&0).is_ok());
        assert!(handler.handle(-1, &CancellationToken::new()).is_err());
    }

    #[test]
    fn test_observes_cancellation() {
        let token = CancellationToken::new();
        token.cancel();

        let err = SumHandler::default()
            .handle(1_000_000_000, &token)
            .unwrap_err();
        assert_eq!(err.downcast_ref::<Error>(), Some(&Error::Cancelled));
    }
}
