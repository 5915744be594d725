use std::time::Duration;

use rand::Rng;

use crate::rng::SeededRng;

/// No flight is retransmitted sooner than this.
const RTO_FLOOR: Duration = Duration::from_millis(50);

/// Upper bound on the jitter either side of the nominal timeout.
const MAX_JITTER: Duration = Duration::from_millis(250);

/// Retransmission timeout for the current flight.
///
/// Starts at `start_rto`, doubles on each retransmission and allows `retries`
/// retransmissions before giving up. Reset whenever a new flight is prepared.
/// Every timeout carries a random offset of up to a quarter of `start_rto` so
/// that two peers started together drift apart.
#[derive(Debug)]
pub struct ExponentialBackoff {
    start_rto: Duration,
    retries: usize,
    rto: Duration,
    jitter_ms: i64,
    left: usize,
}

impl ExponentialBackoff {
    pub fn new(start_rto: Duration, retries: usize, rng: &mut SeededRng) -> Self {
        ExponentialBackoff {
            start_rto,
            retries,
            rto: start_rto,
            jitter_ms: jitter(start_rto, rng),
            left: retries,
        }
    }

    pub fn reset(&mut self, rng: &mut SeededRng) {
        *self = ExponentialBackoff::new(self.start_rto, self.retries, rng);
    }

    pub fn rto(&self) -> Duration {
        let millis = self.rto.as_millis() as i64 + self.jitter_ms;
        Duration::from_millis(millis.max(0) as u64).max(RTO_FLOOR)
    }

    /// Account for one retransmission. A no-op once the budget is spent.
    pub fn attempt(&mut self, rng: &mut SeededRng) {
        if self.left == 0 {
            return;
        }
        self.left -= 1;
        self.jitter_ms = jitter(self.start_rto, rng);
        self.rto = self.rto.saturating_mul(2);
    }

    pub fn can_retry(&self) -> bool {
        self.left > 0
    }
}

fn jitter(start_rto: Duration, rng: &mut SeededRng) -> i64 {
    let bound = (start_rto / 4).min(MAX_JITTER).as_millis() as i64;
    if bound == 0 {
        return 0;
    }
    rng.gen_range(-bound..=bound)
}
