use chrono::{DateTime, Utc};

/// Reading pushed to live viewers whenever a measurement is accepted.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct MeasurementEvent {
    pub oxygen: f64,
    pub co2: i32,
    pub particles: f64,
    pub timestamp: DateTime<Utc>,
}

/// Frames sent over the real-time channel, encoded as
/// `{"event": "...", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "newMeasurement")]
    NewMeasurement(MeasurementEvent),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_measurement_frame_layout() {
        let event = ServerEvent::NewMeasurement(MeasurementEvent {
            oxygen: 21.0,
            co2: 410,
            particles: 12.0,
            timestamp: DateTime::from_timestamp(0, 0).unwrap(),
        });

        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "newMeasurement");
        assert_eq!(json["data"]["co2"], 410);
        assert_eq!(json["data"]["oxygen"], 21.0);
    }
}
