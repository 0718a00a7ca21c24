//! Device registry: MAC address handling and device records.

use log::info;

use crate::db::models::{Device, NewDevice};
use crate::db::Db;
use crate::error::{Error, Result};
use crate::utils::now;

pub const DEFAULT_NAME: &str = "Air Quality Sensor";
pub const DEFAULT_LOCATION: &str = "Unknown";

/// Canonical form of a MAC address: six uppercase hex pairs joined by
/// colons. Accepts colon or hyphen separators in any letter case.
pub fn normalize(raw: &str) -> Result<String> {
    let invalid = || Error::Validation(format!("Invalid MAC address format: {raw}"));

    let pairs: Vec<&str> = raw.split([':', '-']).collect();
    if pairs.len() != 6 {
        return Err(invalid());
    }

    let mut canonical = String::with_capacity(17);
    for (i, pair) in pairs.iter().enumerate() {
        if pair.len() != 2 || !pair.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        if i > 0 {
            canonical.push(':');
        }
        canonical.push_str(&pair.to_ascii_uppercase());
    }

    Ok(canonical)
}

#[derive(Clone)]
pub struct DeviceRegistry {
    db: Db,
}

impl DeviceRegistry {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub fn find_by_mac(&self, mac: &str) -> Result<Option<Device>> {
        self.db.device_by_mac(&normalize(mac)?)
    }

    /// Looks a device up by internal id or, failing that, by MAC address.
    pub fn find(&self, key: &str) -> Result<Device> {
        self.lookup(key)?
            .ok_or_else(|| Error::NotFound(format!("Device {key} not found")))
    }

    pub fn register(
        &self,
        mac: &str,
        name: &str,
        location: &str,
        owner: Option<i32>,
    ) -> Result<Device> {
        let mac = normalize(mac)?;
        let device = self.db.insert_device(&NewDevice {
            device_id: &mac,
            name,
            location,
            user_id: owner,
            is_active: true,
            created_at: now(),
        })?;

        info!("registered device {} ({})", device.device_id, device.name);
        Ok(device)
    }

    /// Returns the device for `mac`, registering an ownerless placeholder the
    /// first time it is seen. A concurrent registration of the same address
    /// is resolved by the unique index: the loser re-reads the winner's row.
    pub fn resolve(&self, mac: &str) -> Result<Device> {
        let mac = normalize(mac)?;
        if let Some(device) = self.db.device_by_mac(&mac)? {
            return Ok(device);
        }

        let name = format!("Sensor {mac}");
        match self.register(&mac, &name, DEFAULT_LOCATION, None) {
            Ok(device) => {
                info!("auto-registered device {mac}");
                Ok(device)
            }
            Err(Error::Conflict(_)) => self.db.device_by_mac(&mac)?.ok_or_else(|| {
                Error::Internal(anyhow::anyhow!(
                    "device {mac} reported as registered but not found"
                ))
            }),
            Err(e) => Err(e),
        }
    }

    pub fn delete(&self, key: &str) -> Result<Device> {
        let device = self.find(key)?;
        let deleted = self
            .db
            .delete_device(device.id)?
            .ok_or_else(|| Error::NotFound(format!("Device {key} not found")))?;

        info!("deleted device {} ({})", deleted.device_id, deleted.name);
        Ok(deleted)
    }

    /// Most recently created first.
    pub fn list(&self) -> Result<Vec<Device>> {
        self.db.devices()
    }

    fn lookup(&self, key: &str) -> Result<Option<Device>> {
        if let Ok(id) = key.parse::<i32>() {
            return self.db.device_by_id(id);
        }
        match normalize(key) {
            Ok(mac) => self.db.device_by_mac(&mac),
            Err(_) => Ok(None),
        }
    }
}
