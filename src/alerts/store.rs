use std::collections::VecDeque;

/// One sampled metric value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datapoint {
    /// Unix seconds; the end of the snapshot window the value came from
    pub timestamp: i64,
    pub value: i64,
}

/// Sliding-window datapoint store with a running sum.
///
/// Datapoints arrive from a monotonically advancing flush clock, so arrival
/// order is timestamp order and expiration only ever removes from the front.
/// The running sum always equals the sum of the retained datapoints, which
/// makes push and expire O(1) amortized.
#[derive(Debug)]
pub struct MetricStore {
    points: VecDeque<Datapoint>,
    /// Retention window in seconds
    interval: i64,
    sum: i64,
}

impl MetricStore {
    pub fn new(interval: i64) -> Self {
        Self {
            points: VecDeque::new(),
            interval: interval.max(1),
            sum: 0,
        }
    }

    /// Append a datapoint and grow the running sum.
    pub fn push(&mut self, point: Datapoint) {
        self.sum += point.value;
        self.points.push_back(point);
    }

    /// Mean rate over the retention window, in value units per second.
    ///
    /// Expires aged-out datapoints first. This is sum divided by the window
    /// length, not an arithmetic mean of the samples, so bursts of snapshots
    /// normalize into a per-second rate.
    pub fn mean(&mut self, now: i64) -> f64 {
        self.expire(now);
        self.sum as f64 / self.interval as f64
    }

    /// Drop datapoints that have aged out of the window, front first.
    fn expire(&mut self, now: i64) {
        let limit = now - self.interval;
        while let Some(front) = self.points.front() {
            if front.timestamp > limit {
                break;
            }
            self.sum -= front.value;
            self.points.pop_front();
        }
    }

    #[cfg(test)]
    fn retained_sum(&self) -> i64 {
        self.points.iter().map(|p| p.value).sum()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.points.len()
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[quickcheck]
    fn prop_running_sum_matches_retained_points(steps: Vec<(u8, i16)>, interval: u8) -> bool {
        let mut store = MetricStore::new(i64::from(interval.max(1)));

        // Build a monotonically advancing clock, as the flush timer would.
        let mut now = 0i64;
        for (advance, value) in steps {
            now += i64::from(advance);
            store.push(Datapoint {
                timestamp: now,
                value: i64::from(value),
            });
        }

        let _ = store.mean(now);
        store.sum == store.retained_sum()
    }

    #[quickcheck]
    fn prop_mean_of_empty_store_is_zero(interval: u8) -> bool {
        let mut store = MetricStore::new(i64::from(interval.max(1)));
        store.mean(1_000_000) == 0.0
    }
}
