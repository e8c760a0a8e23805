//! [`ClockOffsetEstimator`] – local-to-vehicle clock skew.
//!
//! Each telemetry frame yields `offset = local_receive - vehicle_stamp`.
//! Only the most recent sample is kept: no smoothing, no outlier rejection,
//! no bounds.  Outgoing stamps are `local_now - offset`, which places them in
//! the vehicle's time domain.

use teleop_types::Stamp;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct ClockOffsetEstimator {
    offset_nanos: i128,
    samples: u64,
}

impl ClockOffsetEstimator {
    /// Zero offset until the first observation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the estimate with the skew of one telemetry frame and return
    /// it in seconds.
    pub fn observe(&mut self, local_receive: Stamp, vehicle: Stamp) -> f64 {
        self.offset_nanos = local_receive.as_nanos() - vehicle.as_nanos();
        self.samples += 1;
        let offset = self.offset_secs();
        debug!(offset_s = offset, samples = self.samples, "clock offset updated");
        offset
    }

    pub fn offset_secs(&self) -> f64 {
        self.offset_nanos as f64 * 1e-9
    }

    pub fn offset_nanos(&self) -> i128 {
        self.offset_nanos
    }

    pub fn has_sample(&self) -> bool {
        self.samples > 0
    }

    /// Convert a local timestamp into the vehicle's clock domain.
    pub fn to_vehicle_time(&self, local: Stamp) -> Stamp {
        Stamp::from_nanos(local.as_nanos() - self.offset_nanos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_offset_before_first_sample() {
        let clock = ClockOffsetEstimator::new();
        assert!(!clock.has_sample());
        let now = Stamp::new(1_000, 42);
        assert_eq!(clock.to_vehicle_time(now), now);
    }

    #[test]
    fn offset_is_local_minus_vehicle() {
        let mut clock = ClockOffsetEstimator::new();
        let offset = clock.observe(Stamp::new(105, 500_000_000), Stamp::new(100, 250_000_000));
        assert!((offset - 5.25).abs() < 1e-12);
        assert_eq!(clock.offset_nanos(), 5_250_000_000);
    }

    #[test]
    fn negative_offset_when_vehicle_runs_ahead() {
        let mut clock = ClockOffsetEstimator::new();
        clock.observe(Stamp::new(10, 0), Stamp::new(12, 100_000_000));
        assert!((clock.offset_secs() + 2.1).abs() < 1e-12);
        assert_eq!(
            clock.to_vehicle_time(Stamp::new(20, 0)),
            Stamp::new(22, 100_000_000)
        );
    }

    #[test]
    fn round_trip_reproduces_vehicle_clock() {
        let mut clock = ClockOffsetEstimator::new();
        let vehicle = Stamp::new(1_700_000_000, 900_000_000);
        let local = Stamp::new(1_700_000_003, 100_000_000);
        clock.observe(local, vehicle);

        // At the receive instant the corrected stamp equals the vehicle stamp.
        assert_eq!(clock.to_vehicle_time(local), vehicle);

        let later = Stamp::new(1_700_000_004, 0);
        let corrected = clock.to_vehicle_time(later);
        let expected = later.as_secs_f64() - clock.offset_secs();
        assert!((corrected.as_secs_f64() - expected).abs() < 1e-6);
    }

    #[test]
    fn only_last_sample_is_kept() {
        let mut clock = ClockOffsetEstimator::new();
        clock.observe(Stamp::new(50, 0), Stamp::new(10, 0));
        clock.observe(Stamp::new(51, 0), Stamp::new(50, 0));
        assert_eq!(clock.offset_nanos(), 1_000_000_000);
    }
}
