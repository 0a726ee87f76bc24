use std::collections::BTreeMap;

use hifitime::prelude::{Duration, Epoch};

/// Default lookup tolerance: solver and telemetry clocks may drift by one millisecond.
pub fn default_tolerance() -> Duration {
    Duration::from_milliseconds(1.0)
}

/// Sorted time index, queried with a tolerance.
/// Each value is stored once, at its own [Epoch].
#[derive(Debug, Clone)]
pub struct TimeIndex<T> {
    inner: BTreeMap<Epoch, T>,
    tolerance: Duration,
}

impl<T> Default for TimeIndex<T> {
    fn default() -> Self {
        Self::new(default_tolerance())
    }
}

impl<T> TimeIndex<T> {
    /// Builds new [TimeIndex] with given lookup tolerance (inclusive)
    pub fn new(tolerance: Duration) -> Self {
        Self {
            tolerance,
            inner: BTreeMap::new(),
        }
    }

    /// Stores a value. A previous value at the exact same [Epoch] is replaced.
    pub fn insert(&mut self, t: Epoch, value: T) -> Option<T> {
        self.inner.insert(t, value)
    }

    /// Nearest value within tolerance. On equal distances, the earliest wins.
    pub fn get(&self, t: Epoch) -> Option<&T> {
        self.nearest(t).map(|(_, value)| value)
    }

    /// Nearest entry within tolerance
    pub fn nearest(&self, t: Epoch) -> Option<(Epoch, &T)> {
        self.inner
            .range(t - self.tolerance..=t + self.tolerance)
            .min_by_key(|(k, _)| (**k - t).abs())
            .map(|(k, v)| (*k, v))
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

impl<T> FromIterator<(Epoch, T)> for TimeIndex<T> {
    fn from_iter<I: IntoIterator<Item = (Epoch, T)>>(iter: I) -> Self {
        let mut index = Self::default();
        for (t, value) in iter {
            index.insert(t, value);
        }
        index
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tests::t;

    #[test]
    fn test_tolerance() {
        let mut index = TimeIndex::default();
        index.insert(t(10, 0, 5, 500), "fix");

        assert_eq!(index.get(t(10, 0, 5, 500)), Some(&"fix"));
        assert_eq!(index.get(t(10, 0, 5, 499)), Some(&"fix"));
        assert_eq!(index.get(t(10, 0, 5, 501)), Some(&"fix"));
        assert_eq!(index.get(t(10, 0, 5, 498)), None);
        assert_eq!(index.get(t(10, 0, 5, 502)), None);
    }

    #[test]
    fn test_nearest() {
        let index = [
            (t(10, 0, 5, 500), 1),
            (t(10, 0, 5, 501), 2),
            (t(10, 0, 5, 600), 3),
        ]
        .into_iter()
        .collect::<TimeIndex<_>>();

        assert_eq!(index.len(), 3);

        // close entries no longer collide
        assert_eq!(index.get(t(10, 0, 5, 500)), Some(&1));
        assert_eq!(index.get(t(10, 0, 5, 501)), Some(&2));
        assert_eq!(index.get(t(10, 0, 5, 502)), Some(&2));
        assert_eq!(index.get(t(10, 0, 5, 599)), Some(&3));
        assert_eq!(index.nearest(t(10, 0, 5, 550)), None);
        assert_eq!(index.nearest(t(10, 0, 5, 601)), Some((t(10, 0, 5, 600), &3)));
    }
}
