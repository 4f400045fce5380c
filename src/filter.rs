use crate::config::TrackerTuning;
use crate::store::{load_json, save_json, KeyValueStore};
use crate::types::{Fix, PositionRecord};
use serde::Serialize;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

const LAST_ACCEPTED_KEY: &str = "last_location_item";

/// Why a fix was not stored. Rejections are expected filtering, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Rejection {
    LowAccuracy { accuracy_m: f64 },
    Stale { last_timestamp: f64 },
    TooClose { distance_m: f64 },
}

impl Display for Rejection {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            Rejection::LowAccuracy { accuracy_m } => write!(f, "low accuracy ({:.1} m)", accuracy_m),
            Rejection::Stale { last_timestamp } => {
                write!(f, "not newer than last record ({:.3})", last_timestamp)
            }
            Rejection::TooClose { distance_m } => write!(f, "too close ({:.1} m)", distance_m),
        }
    }
}

/// Accuracy, time and displacement gate in front of the buffer.
///
/// # Rules (in order)
/// 1. horizontal accuracy above the limit
/// 2. timestamp not after the last accepted record
/// 3. closer than the minimum distance to the last accepted record
///
/// The last accepted record is persisted so the rules hold across restarts.
pub struct SampleFilter {
    max_accuracy_m: f64,
    min_distance_m: f64,
    last_accepted: Option<PositionRecord>,
    store: Arc<dyn KeyValueStore>,
}

impl SampleFilter {
    pub fn load(tuning: &TrackerTuning, store: Arc<dyn KeyValueStore>) -> Self {
        let last_accepted = load_json(store.as_ref(), LAST_ACCEPTED_KEY);
        SampleFilter {
            max_accuracy_m: tuning.max_horizontal_accuracy_m,
            min_distance_m: tuning.min_distance_before_save_m,
            last_accepted,
            store,
        }
    }

    #[cfg(test)]
    fn last_accepted(&self) -> Option<&PositionRecord> {
        self.last_accepted.as_ref()
    }

    /// Check `fix` against the rules. On acceptance the returned record
    /// becomes the new reference point.
    pub fn evaluate(&mut self, fix: &Fix) -> Result<PositionRecord, Rejection> {
        // NaN accuracy counts as low quality
        if !(fix.horizontal_accuracy <= self.max_accuracy_m) {
            return Err(Rejection::LowAccuracy {
                accuracy_m: fix.horizontal_accuracy,
            });
        }

        if let Some(last) = &self.last_accepted {
            if last.timestamp >= fix.timestamp {
                return Err(Rejection::Stale {
                    last_timestamp: last.timestamp,
                });
            }

            let distance_m = last.distance_to(fix.latitude, fix.longitude);
            if distance_m < self.min_distance_m {
                return Err(Rejection::TooClose { distance_m });
            }
        }

        let record = PositionRecord::from(fix);
        self.last_accepted = Some(record.clone());
        if let Err(e) = save_json(self.store.as_ref(), LAST_ACCEPTED_KEY, &record) {
            log::error!("Failed to persist last accepted record: {}", e);
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn filter() -> SampleFilter {
        SampleFilter::load(&TrackerTuning::default(), Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_first_fix_accepted() {
        let mut filter = filter();
        assert!(filter.evaluate(&Fix::new(0.0, 0.0, 0.0, 10.0)).is_ok());
        assert_eq!(filter.last_accepted().map(|r| r.timestamp), Some(0.0));
    }

    #[test]
    fn test_low_accuracy_rejected() {
        let mut filter = filter();
        let result = filter.evaluate(&Fix::new(0.0, 0.0, 0.0, 65.0));
        assert_eq!(result, Err(Rejection::LowAccuracy { accuracy_m: 65.0 }));
        assert!(filter.last_accepted().is_none());

        assert!(filter.evaluate(&Fix::new(0.0, 0.0, 0.0, f64::NAN)).is_err());
        assert!(filter.evaluate(&Fix::new(0.0, 0.0, 0.0, 50.0)).is_ok());
    }

    #[test]
    fn test_backwards_and_equal_time_rejected() {
        let mut filter = filter();
        filter.evaluate(&Fix::new(100.0, 0.0, 0.0, 10.0)).unwrap();

        // far away but not newer
        let same_time = filter.evaluate(&Fix::new(100.0, 1.0, 1.0, 10.0));
        assert!(matches!(same_time, Err(Rejection::Stale { .. })));
        let older = filter.evaluate(&Fix::new(50.0, 1.0, 1.0, 10.0));
        assert!(matches!(older, Err(Rejection::Stale { .. })));
    }

    #[test]
    fn test_near_duplicate_rejected() {
        let mut filter = filter();
        filter.evaluate(&Fix::new(0.0, 0.0, 0.0, 10.0)).unwrap();

        // ~11 m east
        let result = filter.evaluate(&Fix::new(1.0, 0.0, 0.0001, 10.0));
        assert!(matches!(result, Err(Rejection::TooClose { .. })));

        // ~22 m east
        assert!(filter.evaluate(&Fix::new(2.0, 0.0, 0.0002, 10.0)).is_ok());
    }

    #[test]
    fn test_distance_measured_from_last_accepted() {
        let mut filter = filter();
        filter.evaluate(&Fix::new(0.0, 0.0, 0.0, 10.0)).unwrap();

        // each step ~11 m, so only every second one clears 15 m
        let accepted: Vec<bool> = (1..=4)
            .map(|i| {
                filter
                    .evaluate(&Fix::new(i as f64, 0.0, 0.0001 * i as f64, 10.0))
                    .is_ok()
            })
            .collect();
        assert_eq!(accepted, vec![false, true, false, true]);
    }

    #[test]
    fn test_reference_point_survives_reload() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let tuning = TrackerTuning::default();
        {
            let mut filter = SampleFilter::load(&tuning, store.clone());
            filter.evaluate(&Fix::new(500.0, 10.0, 10.0, 5.0)).unwrap();
        }

        let mut filter = SampleFilter::load(&tuning, store);
        let result = filter.evaluate(&Fix::new(400.0, 20.0, 20.0, 5.0));
        assert!(matches!(result, Err(Rejection::Stale { .. })));
    }
}
