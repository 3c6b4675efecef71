//! Timing utilities for upstream calls.
//!
//! Chain clients wrap each public operation in a [`Timer`] so slow explorers
//! or RPC nodes show up in the logs.

use log::{debug, info, warn};
use std::time::{Duration, Instant};

/// A timer for measuring operation durations
#[derive(Debug)]
pub struct Timer {
    start_time: Instant,
    operation_name: String,
    checkpoints: Vec<(String, Instant)>,
}

impl Timer {
    pub fn start(operation_name: &str) -> Self {
        debug!("Starting timer for: {}", operation_name);
        Self {
            start_time: Instant::now(),
            operation_name: operation_name.to_string(),
            checkpoints: Vec::new(),
        }
    }

    /// Add a checkpoint to track intermediate timing
    pub fn checkpoint(&mut self, checkpoint_name: &str) {
        let now = Instant::now();
        self.checkpoints.push((checkpoint_name.to_string(), now));
        debug!(
            "{} - {}: {}ms",
            self.operation_name,
            checkpoint_name,
            now.duration_since(self.start_time).as_millis()
        );
    }

    /// Finish with a warning if the operation took longer than `threshold_ms`.
    pub fn finish_with_threshold(self, threshold_ms: u64) -> Duration {
        let total_duration = self.start_time.elapsed();

        if total_duration.as_millis() > threshold_ms as u128 {
            warn!(
                "{} completed in {}ms (threshold {}ms)",
                self.operation_name,
                total_duration.as_millis(),
                threshold_ms
            );
        } else {
            info!(
                "{} completed in {}ms",
                self.operation_name,
                total_duration.as_millis()
            );
        }

        let mut last_time = self.start_time;
        for (name, time) in &self.checkpoints {
            debug!(
                "   └─ {}: {}ms",
                name,
                time.duration_since(last_time).as_millis()
            );
            last_time = *time;
        }

        total_duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_records_checkpoints() {
        let mut timer = Timer::start("unit");
        timer.checkpoint("first");
        timer.checkpoint("second");
        assert_eq!(timer.checkpoints.len(), 2);
        let total = timer.finish_with_threshold(60_000);
        assert!(total < Duration::from_secs(60));
    }
}
