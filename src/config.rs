use crate::error::{AgentError, AgentResult};
use crate::store::{load_json, save_json, KeyValueStore};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;

const SETTINGS_KEY: &str = "settings";

/// Buffer length at which a flush is triggered. Only a fixed set of
/// capacities can be selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferCapacity {
    Five,
    Sixty,
    OneTwenty,
    #[default]
    ThreeHundred,
    SixHundred,
}

impl BufferCapacity {
    pub const ALL: [BufferCapacity; 5] = [
        BufferCapacity::Five,
        BufferCapacity::Sixty,
        BufferCapacity::OneTwenty,
        BufferCapacity::ThreeHundred,
        BufferCapacity::SixHundred,
    ];

    pub fn records(self) -> usize {
        match self {
            BufferCapacity::Five => 5,
            BufferCapacity::Sixty => 60,
            BufferCapacity::OneTwenty => 120,
            BufferCapacity::ThreeHundred => 300,
            BufferCapacity::SixHundred => 600,
        }
    }
}

impl TryFrom<usize> for BufferCapacity {
    type Error = AgentError;

    fn try_from(records: usize) -> Result<Self, Self::Error> {
        BufferCapacity::ALL
            .into_iter()
            .find(|c| c.records() == records)
            .ok_or_else(|| {
                AgentError::InvalidParameters(format!(
                    "max buffer size must be one of 5, 60, 120, 300, 600 (got {})",
                    records
                ))
            })
    }
}

impl fmt::Display for BufferCapacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.records())
    }
}

impl Serialize for BufferCapacity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.records() as u64)
    }
}

// Unknown or zero values read back as the default capacity
impl<'de> Deserialize<'de> for BufferCapacity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let records = u64::deserialize(deserializer)?;
        Ok(BufferCapacity::try_from(records as usize).unwrap_or_else(|_| {
            if records != 0 {
                log::warn!("Unsupported max buffer size {}, using default", records);
            }
            BufferCapacity::default()
        }))
    }
}

/// User-facing settings, persisted on every change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Collection server base, e.g. `https://waypoints.example.org`
    pub server_host: String,
    pub api_key: String,
    pub tracking_enabled: bool,
    /// Run the live sampling loop while moving
    pub high_density: bool,
    pub debug_notifications: bool,
    pub max_buffer_size: BufferCapacity,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            server_host: String::new(),
            api_key: String::new(),
            tracking_enabled: false,
            high_density: false,
            debug_notifications: false,
            max_buffer_size: BufferCapacity::default(),
        }
    }
}

/// Filter, duty-cycle and upload thresholds.
#[derive(Debug, Clone)]
pub struct TrackerTuning {
    /// Fixes with a worse horizontal accuracy are dropped (meters).
    pub max_horizontal_accuracy_m: f64,
    /// Minimum displacement from the last stored record (meters).
    pub min_distance_before_save_m: f64,
    /// Movement inside this radius counts as stationary (meters).
    pub region_timeout_radius_m: f64,
    /// Idle time before the live loop stops while on foot (seconds).
    pub foot_idle_timeout_secs: f64,
    /// Idle time before the live loop stops, in any mode (seconds).
    pub vehicle_idle_timeout_secs: f64,
    /// Time without a vehicle-speed fix before leaving vehicle mode (seconds).
    pub out_of_vehicle_timeout_secs: f64,
    /// Speed that always counts as moving (km/h).
    pub moving_speed_kmh: f64,
    /// Speed that switches to vehicle mode (km/h).
    pub vehicle_speed_kmh: f64,
    /// Lower bound of the band in which vehicle mode may be left (km/h).
    pub min_vehicle_exit_speed_kmh: f64,
    /// Records per upload request.
    pub max_chunk_size: usize,
    pub request_timeout: Duration,
}

impl Default for TrackerTuning {
    fn default() -> Self {
        Self {
            max_horizontal_accuracy_m: 50.0,
            min_distance_before_save_m: 15.0,
            region_timeout_radius_m: 20.0,
            foot_idle_timeout_secs: 60.0,
            vehicle_idle_timeout_secs: 300.0,
            out_of_vehicle_timeout_secs: 180.0,
            moving_speed_kmh: 10.0,
            vehicle_speed_kmh: 30.0,
            min_vehicle_exit_speed_kmh: 5.0,
            max_chunk_size: 300,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Shared handle on the persisted [`TrackingConfig`]
#[derive(Clone)]
pub struct Settings {
    store: Arc<dyn KeyValueStore>,
    current: Arc<RwLock<TrackingConfig>>,
}

impl Settings {
    /// Load settings; falls back to defaults when nothing usable is stored
    pub fn load(store: Arc<dyn KeyValueStore>) -> Self {
        let config: TrackingConfig = load_json(store.as_ref(), SETTINGS_KEY).unwrap_or_default();
        Settings {
            store,
            current: Arc::new(RwLock::new(config)),
        }
    }

    pub fn get(&self) -> TrackingConfig {
        match self.current.read() {
            Ok(config) => config.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Apply `change` and persist immediately. Returns the previous value.
    /// If the write fails the in-memory settings stay unchanged.
    pub fn update<F>(&self, change: F) -> AgentResult<TrackingConfig>
    where
        F: FnOnce(&mut TrackingConfig),
    {
        let mut current = self.current.write().map_err(|_| {
            AgentError::Internal("Failed to acquire settings lock".to_string())
        })?;
        let mut next = current.clone();
        change(&mut next);

        if next != *current {
            if let Err(e) = save_json(self.store.as_ref(), SETTINGS_KEY, &next) {
                log::error!("Failed to persist settings: {}", e);
                return Err(e);
            }
        }
        Ok(std::mem::replace(&mut *current, next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    /// Store whose disk is full
    struct FullDiskStore;

    impl KeyValueStore for FullDiskStore {
        fn get(&self, _key: &str) -> AgentResult<Option<Vec<u8>>> {
            Ok(None)
        }

        fn set(&self, key: &str, _value: &[u8]) -> AgentResult<()> {
            Err(AgentError::StorageError(format!("No space left writing {}", key)))
        }

        fn remove(&self, _key: &str) -> AgentResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_failed_save_keeps_previous_settings() {
        let settings = Settings::load(Arc::new(FullDiskStore));

        let result = settings.update(|c| c.server_host = "https://example.org".to_string());
        assert!(matches!(result, Err(AgentError::StorageError(_))));
        assert_eq!(settings.get(), TrackingConfig::default());
        assert_eq!(settings.get().server_host, "");
    }

    #[test]
    fn test_capacity_values() {
        let values: Vec<usize> = BufferCapacity::ALL.iter().map(|c| c.records()).collect();
        assert_eq!(values, vec![5, 60, 120, 300, 600]);
        assert_eq!(BufferCapacity::default().records(), 300);
        assert!(BufferCapacity::try_from(100).is_err());
        assert_eq!(BufferCapacity::try_from(60).unwrap(), BufferCapacity::Sixty);
    }

    #[test]
    fn test_zero_capacity_reads_as_default() {
        let config: TrackingConfig = serde_json::from_str(r#"{"max_buffer_size": 0}"#).unwrap();
        assert_eq!(config.max_buffer_size, BufferCapacity::ThreeHundred);

        let config: TrackingConfig = serde_json::from_str(r#"{"max_buffer_size": 120}"#).unwrap();
        assert_eq!(config.max_buffer_size, BufferCapacity::OneTwenty);
    }

    #[test]
    fn test_settings_persist_on_update() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let settings = Settings::load(store.clone());
        assert_eq!(settings.get(), TrackingConfig::default());

        let previous = settings
            .update(|c| {
                c.server_host = "https://example.org".to_string();
                c.max_buffer_size = BufferCapacity::Five;
            })
            .unwrap();
        assert_eq!(previous, TrackingConfig::default());

        let reloaded = Settings::load(store);
        assert_eq!(reloaded.get().server_host, "https://example.org");
        assert_eq!(reloaded.get().max_buffer_size, BufferCapacity::Five);
    }

    #[test]
    fn test_corrupt_settings_fall_back_to_defaults() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        store.set(SETTINGS_KEY, b"[]").unwrap();
        let settings = Settings::load(store);
        assert_eq!(settings.get(), TrackingConfig::default());
    }
}
