use chrono::NaiveDateTime;
use diesel::prelude::*;

use crate::schema::*;

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, serde::Serialize)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct User {
    pub id: i32,
    pub name: String,
    pub email: String,
    #[diesel(column_name = password)]
    #[serde(skip)]
    pub password_hash: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser<'a> {
    pub name: &'a str,
    pub email: &'a str,
    #[diesel(column_name = password)]
    pub password_hash: &'a str,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, serde::Serialize)]
#[diesel(table_name = devices)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Device {
    pub id: i32,
    /// Canonical MAC address, unique.
    pub device_id: String,
    pub name: String,
    pub location: String,
    pub user_id: Option<i32>,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = devices)]
pub struct NewDevice<'a> {
    pub device_id: &'a str,
    pub name: &'a str,
    pub location: &'a str,
    pub user_id: Option<i32>,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, serde::Serialize)]
#[diesel(table_name = measurements)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Measurement {
    pub id: i32,
    /// Internal id of the owning device, not its MAC.
    pub device_id: Option<i32>,
    pub oxygen: f64,              // percent
    pub co2: i32,                 // ppm
    pub particles: f64,           // µg/m³
    pub temperature: Option<f64>, // °C
    pub humidity: Option<f64>,    // percent
    pub created_at: NaiveDateTime,
}

impl Measurement {
    /// Reading reported before any sensor has sent data: fresh outdoor air.
    pub fn fallback(now: NaiveDateTime) -> Self {
        Self {
            id: 0,
            device_id: None,
            oxygen: 20.9,
            co2: 400,
            particles: 15.0,
            temperature: None,
            humidity: None,
            created_at: now,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = measurements)]
pub struct NewMeasurement {
    pub device_id: Option<i32>,
    pub oxygen: f64,
    pub co2: i32,
    pub particles: f64,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub created_at: NaiveDateTime,
}

/// Row shape of a `measurements` table created before devices existed.
#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = measurements)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct LegacyMeasurement {
    pub id: i32,
    pub oxygen: f64,
    pub co2: i32,
    pub particles: f64,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub created_at: NaiveDateTime,
}

impl From<LegacyMeasurement> for Measurement {
    fn from(row: LegacyMeasurement) -> Self {
        Self {
            id: row.id,
            device_id: None,
            oxygen: row.oxygen,
            co2: row.co2,
            particles: row.particles,
            temperature: row.temperature,
            humidity: row.humidity,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = measurements)]
pub struct NewLegacyMeasurement {
    pub oxygen: f64,
    pub co2: i32,
    pub particles: f64,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub created_at: NaiveDateTime,
}

impl From<&NewMeasurement> for NewLegacyMeasurement {
    fn from(mes: &NewMeasurement) -> Self {
        Self {
            oxygen: mes.oxygen,
            co2: mes.co2,
            particles: mes.particles,
            temperature: mes.temperature,
            humidity: mes.humidity,
            created_at: mes.created_at,
        }
    }
}
