/// A numeric field as sent by sensors. Firmware builds disagree on whether
/// values go over the wire as JSON numbers or as strings.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(untagged)]
pub enum Numeric {
    Number(f64),
    Text(String),
    /// Any other JSON value; kept so validation can name the field.
    Other(serde_json::Value),
}

impl Numeric {
    /// Finite decimal value, `None` if the field does not hold one.
    pub fn to_f64(&self) -> Option<f64> {
        let value = match self {
            Numeric::Number(v) => *v,
            Numeric::Text(s) => s.trim().parse::<f64>().ok()?,
            Numeric::Other(_) => return None,
        };
        value.is_finite().then_some(value)
    }

    /// Whole number value; a decimal with a zero fraction is accepted.
    pub fn to_i32(&self) -> Option<i32> {
        let value = self.to_f64()?;
        if value.fract() != 0.0 || value < i32::MIN as f64 || value > i32::MAX as f64 {
            return None;
        }
        Some(value as i32)
    }
}

impl From<f64> for Numeric {
    fn from(value: f64) -> Self {
        Numeric::Number(value)
    }
}

impl From<&str> for Numeric {
    fn from(value: &str) -> Self {
        Numeric::Text(value.to_owned())
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize, serde::Serialize)]
pub struct NewMeasurement {
    /// MAC address of the reporting device, any accepted notation.
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub oxygen: Option<Numeric>, // percent
    #[serde(default)]
    pub co2: Option<Numeric>, // ppm
    #[serde(default)]
    pub particles: Option<Numeric>,
    #[serde(default)]
    pub temperature: Option<Numeric>, // °C
    #[serde(default)]
    pub humidity: Option<Numeric>, // percent
}

#[derive(Debug, Clone, Default, serde::Deserialize, serde::Serialize)]
pub struct NewDevice {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default, rename = "macAddress")]
    pub mac_address: Option<String>,
    #[serde(default)]
    pub user_id: Option<i32>,
}

#[derive(Debug, Clone, Default, serde::Deserialize, serde::Serialize)]
pub struct RegisterUser {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, serde::Deserialize, serde::Serialize)]
pub struct Login {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, serde::Deserialize, serde::Serialize)]
pub struct HistoryQuery {
    /// Kept as text so that a malformed value falls back to the default
    /// instead of failing the request.
    #[serde(default)]
    pub limit: Option<String>,
}
