use serde::{Deserialize, Serialize};

use super::PositionRecord;

/// One point of the batch upload body
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GpsData {
    pub timestamp: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub horizontal_accuracy: f64,
    pub altitude: f64,
    pub vertical_accuracy: f64,
    pub heading: f64,
    pub heading_accuracy: f64,
    pub speed: f64,
    pub speed_accuracy: f64,
}

impl From<&PositionRecord> for GpsData {
    fn from(record: &PositionRecord) -> Self {
        GpsData {
            timestamp: record.timestamp,
            latitude: record.latitude,
            longitude: record.longitude,
            horizontal_accuracy: record.horizontal_accuracy,
            altitude: record.altitude,
            vertical_accuracy: record.vertical_accuracy,
            heading: record.heading,
            heading_accuracy: record.heading_accuracy,
            speed: record.speed,
            speed_accuracy: record.speed_accuracy,
        }
    }
}

/// Body of `POST /api/v1/gps/batch`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GpsBatch {
    pub gps_data: Vec<GpsData>,
}

impl GpsBatch {
    pub fn from_records(records: &[PositionRecord]) -> Self {
        GpsBatch {
            gps_data: records.iter().map(GpsData::from).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.gps_data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gps_data.is_empty()
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Fix;

    #[test]
    fn test_batch_field_names() {
        let record = PositionRecord::from(&Fix::new(1700000000.5, 52.52, 13.405, 8.0).with_speed(1.5));
        let batch = GpsBatch::from_records(&[record]);
        let json: serde_json::Value = serde_json::from_slice(&batch.to_json_bytes().unwrap()).unwrap();

        let point = &json["gps_data"][0];
        for key in [
            "timestamp",
            "latitude",
            "longitude",
            "horizontal_accuracy",
            "altitude",
            "vertical_accuracy",
            "heading",
            "heading_accuracy",
            "speed",
            "speed_accuracy",
        ] {
            assert!(point.get(key).is_some(), "missing {}", key);
        }
        // floor is stored locally but never sent
        assert!(point.get("floor").is_none());
        assert_eq!(point["timestamp"].as_f64(), Some(1700000000.5));
    }
}
