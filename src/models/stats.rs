//! Run statistics for batch pipelines.

use crate::client::Usage;
use serde::{Deserialize, Serialize};

/// Statistics from a quiz run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    /// Questions requested
    pub requested: usize,

    /// Questions that passed self-validation
    pub produced: usize,

    /// Questions dropped because a field stayed unresolved
    pub skipped: usize,

    /// Wrong answers replaced by the validator
    pub answers_replaced: usize,

    /// Service calls across every gateway request
    pub service_calls: u32,

    /// Token usage across every gateway request
    pub usage: Usage,

    /// Total runtime in seconds
    pub runtime_secs: f64,

    /// Questions per hour throughput
    pub throughput_per_hour: f64,

    /// Produced / requested (0.0 - 1.0)
    pub success_rate: f64,
}

impl RunStats {
    /// Calculate derived stats.
    pub fn finalize(&mut self) {
        if self.requested > 0 {
            self.success_rate = self.produced as f64 / self.requested as f64;
        }
        if self.runtime_secs > 0.0 {
            self.throughput_per_hour = self.produced as f64 / self.runtime_secs * 3600.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finalize_derives_rates() {
        let mut stats = RunStats {
            requested: 4,
            produced: 3,
            skipped: 1,
            runtime_secs: 36.0,
            ..Default::default()
        };
        stats.finalize();

        assert_eq!(stats.success_rate, 0.75);
        assert_eq!(stats.throughput_per_hour, 300.0);
    }

    #[test]
    fn test_finalize_empty_run() {
        let mut stats = RunStats::default();
        stats.finalize();
        assert_eq!(stats.success_rate, 0.0);
        assert_eq!(stats.throughput_per_hour, 0.0);
    }
}
