//! Measurement ingestion: validation, device resolution, persistence and
//! fan-out to live viewers.

use common::event::MeasurementEvent;
use common::req::{self, Numeric};
use log::debug;

use crate::broadcast::Broadcaster;
use crate::db::models::{Measurement, NewMeasurement};
use crate::db::Db;
use crate::devices::DeviceRegistry;
use crate::error::{Error, Result};
use crate::utils::now;

pub const DEFAULT_HISTORY_LIMIT: i64 = 50;
pub const MAX_HISTORY_LIMIT: i64 = 1000;

/// A validated sensor reading.
#[derive(Debug, Clone, PartialEq)]
struct Reading {
    oxygen: f64,
    co2: i32,
    particles: f64,
    temperature: Option<f64>,
    humidity: Option<f64>,
}

impl TryFrom<&req::NewMeasurement> for Reading {
    type Error = Error;

    fn try_from(payload: &req::NewMeasurement) -> Result<Self> {
        Ok(Self {
            oxygen: decimal("oxygen", required("oxygen", &payload.oxygen)?)?,
            co2: integer("co2", required("co2", &payload.co2)?)?,
            particles: decimal("particles", required("particles", &payload.particles)?)?,
            temperature: payload
                .temperature
                .as_ref()
                .map(|v| decimal("temperature", v))
                .transpose()?,
            humidity: payload
                .humidity
                .as_ref()
                .map(|v| decimal("humidity", v))
                .transpose()?,
        })
    }
}

fn required<'a>(field: &str, value: &'a Option<Numeric>) -> Result<&'a Numeric> {
    value
        .as_ref()
        .ok_or_else(|| Error::Validation(format!("{field} is required")))
}

fn decimal(field: &str, value: &Numeric) -> Result<f64> {
    value
        .to_f64()
        .ok_or_else(|| Error::Validation(format!("{field} must be a number")))
}

fn integer(field: &str, value: &Numeric) -> Result<i32> {
    value
        .to_i32()
        .ok_or_else(|| Error::Validation(format!("{field} must be a whole number")))
}

/// Parses a `limit` query value, falling back to the default for anything
/// absent, unparsable or non-positive.
pub fn history_limit(raw: Option<&str>) -> i64 {
    match raw.and_then(|s| s.trim().parse::<i64>().ok()) {
        Some(limit) if limit > 0 => limit.min(MAX_HISTORY_LIMIT),
        _ => DEFAULT_HISTORY_LIMIT,
    }
}

#[derive(Clone)]
pub struct Ingestor {
    db: Db,
    registry: DeviceRegistry,
    broadcaster: Broadcaster,
}

impl Ingestor {
    pub fn new(db: Db, registry: DeviceRegistry, broadcaster: Broadcaster) -> Self {
        Self {
            db,
            registry,
            broadcaster,
        }
    }

    pub fn ingest(&self, payload: &req::NewMeasurement) -> Result<Measurement> {
        let reading = Reading::try_from(payload)?;

        let device_id = match payload.device_id.as_deref().map(str::trim) {
            Some(mac) if !mac.is_empty() => Some(self.registry.resolve(mac)?.id),
            _ => None,
        };

        let stored = self.db.insert_measurement(&NewMeasurement {
            device_id,
            oxygen: reading.oxygen,
            co2: reading.co2,
            particles: reading.particles,
            temperature: reading.temperature,
            humidity: reading.humidity,
            created_at: now(),
        })?;

        let viewers = self.broadcaster.publish(MeasurementEvent {
            oxygen: stored.oxygen,
            co2: stored.co2,
            particles: stored.particles,
            timestamp: stored.created_at.and_utc(),
        });
        debug!(
            "measurement {} accepted (device {:?}), sent to {viewers} viewers",
            stored.id, stored.device_id
        );

        Ok(stored)
    }

    /// Most recent measurement, or the fallback reading on an empty store.
    pub fn latest(&self) -> Result<Measurement> {
        Ok(self
            .db
            .latest_measurement()?
            .unwrap_or_else(|| Measurement::fallback(now())))
    }

    /// Newest first, at most `limit` rows.
    pub fn history(&self, limit: Option<&str>) -> Result<Vec<Measurement>> {
        self.db.measurements(history_limit(limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::temp_db;
    use common::event::ServerEvent;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn ingestor() -> (TempDir, Ingestor, Broadcaster) {
        let (dir, db) = temp_db();
        let broadcaster = Broadcaster::default();
        let ingestor = Ingestor::new(
            db.clone(),
            DeviceRegistry::new(db),
            broadcaster.clone(),
        );
        (dir, ingestor, broadcaster)
    }

    fn payload(device_id: Option<&str>, co2: f64) -> req::NewMeasurement {
        req::NewMeasurement {
            device_id: device_id.map(str::to_owned),
            oxygen: Some(21.0.into()),
            co2: Some(co2.into()),
            particles: Some(12.0.into()),
            ..Default::default()
        }
    }

    #[test]
    fn unknown_mac_registers_exactly_one_device() {
        let (_dir, ingestor, _) = ingestor();
        assert!(ingestor.registry.list().unwrap().is_empty());

        let stored = ingestor
            .ingest(&payload(Some("aa-bb-cc-dd-ee-ff"), 410.0))
            .unwrap();

        let devices = ingestor.registry.list().unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].device_id, "AA:BB:CC:DD:EE:FF");
        assert_eq!(devices[0].user_id, None);
        assert_eq!(stored.device_id, Some(devices[0].id));
    }

    #[test]
    fn known_mac_registers_nothing() {
        let (_dir, ingestor, _) = ingestor();
        let device = ingestor
            .registry
            .register("AA:BB:CC:DD:EE:FF", "Office", "2nd floor", None)
            .unwrap();

        let stored = ingestor
            .ingest(&payload(Some("AA:BB:CC:DD:EE:FF"), 410.0))
            .unwrap();

        assert_eq!(ingestor.registry.list().unwrap(), vec![device.clone()]);
        assert_eq!(stored.device_id, Some(device.id));
    }

    #[test]
    fn reading_without_device_is_stored_unowned() {
        let (_dir, ingestor, _) = ingestor();

        let stored = ingestor.ingest(&payload(None, 400.0)).unwrap();
        assert_eq!(stored.device_id, None);

        let stored = ingestor.ingest(&payload(Some("  "), 400.0)).unwrap();
        assert_eq!(stored.device_id, None);
        assert!(ingestor.registry.list().unwrap().is_empty());
    }

    #[test]
    fn malformed_mac_is_rejected_before_storing() {
        let (_dir, ingestor, _) = ingestor();

        let err = ingestor
            .ingest(&payload(Some("not-a-mac"), 410.0))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)), "{err:?}");
        assert!(ingestor.history(None).unwrap().is_empty());
    }

    #[test]
    fn non_numeric_values_are_rejected() {
        let (_dir, ingestor, _) = ingestor();

        let mut bad = payload(None, 410.0);
        bad.oxygen = Some("lots".into());
        let err = ingestor.ingest(&bad).unwrap_err();
        assert_eq!(err.to_string(), "oxygen must be a number");

        let mut missing = payload(None, 410.0);
        missing.particles = None;
        let err = ingestor.ingest(&missing).unwrap_err();
        assert_eq!(err.to_string(), "particles is required");

        let err = ingestor.ingest(&payload(None, 410.5)).unwrap_err();
        assert_eq!(err.to_string(), "co2 must be a whole number");

        assert!(ingestor.history(None).unwrap().is_empty());
    }

    #[test]
    fn optional_values_are_kept() {
        let (_dir, ingestor, _) = ingestor();

        let mut full = payload(None, 415.0);
        full.temperature = Some("22.5".into());
        full.humidity = Some(40.0.into());
        let stored = ingestor.ingest(&full).unwrap();

        assert_eq!(stored.temperature, Some(22.5));
        assert_eq!(stored.humidity, Some(40.0));
    }

    #[test]
    fn latest_falls_back_then_tracks_ingest() {
        let (_dir, ingestor, _) = ingestor();

        let fallback = ingestor.latest().unwrap();
        assert_eq!(
            (fallback.oxygen, fallback.co2, fallback.particles),
            (20.9, 400, 15.0)
        );

        let stored = ingestor.ingest(&payload(None, 480.0)).unwrap();
        assert_eq!(ingestor.latest().unwrap(), stored);
    }

    #[test]
    fn history_is_bounded_and_newest_first() {
        let (_dir, ingestor, _) = ingestor();
        for co2 in 400..405 {
            ingestor.ingest(&payload(None, co2 as f64)).unwrap();
        }

        let rows = ingestor.history(Some("3")).unwrap();
        let co2: Vec<i32> = rows.iter().map(|m| m.co2).collect();
        assert_eq!(co2, vec![404, 403, 402]);

        assert_eq!(ingestor.history(Some("abc")).unwrap().len(), 5);
        assert_eq!(ingestor.history(None).unwrap().len(), 5);
    }

    #[test]
    fn history_limit_parsing() {
        assert_eq!(history_limit(None), DEFAULT_HISTORY_LIMIT);
        assert_eq!(history_limit(Some("abc")), DEFAULT_HISTORY_LIMIT);
        assert_eq!(history_limit(Some("0")), DEFAULT_HISTORY_LIMIT);
        assert_eq!(history_limit(Some("-3")), DEFAULT_HISTORY_LIMIT);
        assert_eq!(history_limit(Some("7")), 7);
        assert_eq!(history_limit(Some("100000")), MAX_HISTORY_LIMIT);
    }

    #[test]
    fn accepted_reading_is_broadcast() {
        let (_dir, ingestor, broadcaster) = ingestor();
        let mut viewer = broadcaster.subscribe();

        let stored = ingestor
            .ingest(&payload(Some("AA:BB:CC:DD:EE:FF"), 410.0))
            .unwrap();

        let Some(ServerEvent::NewMeasurement(event)) = viewer.try_recv() else {
            panic!("no event published");
        };
        assert_eq!(event.co2, 410);
        assert_eq!(event.oxygen, 21.0);
        assert_eq!(event.particles, 12.0);
        assert_eq!(event.timestamp, stored.created_at.and_utc());
    }

    #[test]
    fn rejected_reading_is_not_broadcast() {
        let (_dir, ingestor, broadcaster) = ingestor();
        let mut viewer = broadcaster.subscribe();

        assert!(ingestor.ingest(&payload(Some("bogus"), 410.0)).is_err());
        assert!(viewer.try_recv().is_none());
    }

    #[test]
    fn concurrent_first_readings_share_one_device() {
        let (_dir, ingestor, _) = ingestor();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let ingestor = ingestor.clone();
                std::thread::spawn(move || {
                    ingestor.ingest(&payload(Some("de:ad:be:ef:00:01"), 400.0 + i as f64))
                })
            })
            .collect();

        let stored: Vec<Measurement> = handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap())
            .collect();

        let devices = ingestor.registry.list().unwrap();
        assert_eq!(devices.len(), 1);
        assert!(stored.iter().all(|m| m.device_id == Some(devices[0].id)));
    }
}
