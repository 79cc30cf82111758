//! Water quality readings: what a device publishes with its credentials,
//! and the record a reading becomes once classified.
//!
//! A published reading looks like:
//!
//!   {"device_id": "esp32_water_monitor",
//!    "data": {"ph": 7.1, "solids": 310.5, "turbidity": 3.2}}
//!
//! All three measurements are required. A missing device id is recorded
//! as "unknown".
use ring::rand::SecureRandom;
use serde::{Deserialize, Serialize};
use std::{fmt, time::SystemTime};

mod location;

pub use location::Location;

/// Device id of readings which don't carry one.
pub const UNKNOWN_DEVICE: &str = "unknown";

#[derive(Debug, thiserror::Error)]
pub enum ReadingError {
    #[error("Invalid reading")]
    Json(#[from] serde_json::Error),
    #[error("Missing sensor readings: {}", .0.join(", "))]
    Missing(Vec<&'static str>),
    #[error("Sensor reading {0} is not a finite number")]
    NotFinite(&'static str),
    #[error("Invalid or missing latitude/longitude: {0}")]
    InvalidLocation(String),
    #[error("Can't generate a reading id")]
    Random,
    #[error("System clock is set before 1970")]
    Clock,
}

/// The three sensor values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurements {
    pub ph: f64,
    /// Total dissolved solids, in ppm.
    pub solids: f64,
    /// In NTU.
    pub turbidity: f64,
}

impl Measurements {
    fn check(&self) -> Result<(), ReadingError> {
        for (name, value) in [
            ("ph", self.ph),
            ("solids", self.solids),
            ("turbidity", self.turbidity),
        ] {
            if !value.is_finite() {
                return Err(ReadingError::NotFinite(name));
            }
        }
        Ok(())
    }
}

/// A complete reading from one device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    device_id: String,
    data: Measurements,
}

impl Reading {
    pub fn new<T: Into<String>>(device_id: T, data: Measurements) -> Result<Reading, ReadingError> {
        data.check()?;
        Ok(Reading {
            device_id: device_id.into(),
            data,
        })
    }

    /// Parses a published reading, refusing it unless all three
    /// measurements are present.
    pub fn from_json(text: &str) -> Result<Reading, ReadingError> {
        let wire: wire::Reading = serde_json::from_str(text)?;
        let missing: Vec<&'static str> = [
            ("ph", wire.data.ph),
            ("solids", wire.data.solids),
            ("turbidity", wire.data.turbidity),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.is_none().then_some(name))
        .collect();
        let (Some(ph), Some(solids), Some(turbidity)) =
            (wire.data.ph, wire.data.solids, wire.data.turbidity)
        else {
            return Err(ReadingError::Missing(missing));
        };
        Reading::new(
            wire.device_id,
            Measurements {
                ph,
                solids,
                turbidity,
            },
        )
    }

    /// The payload a device publishes.
    pub fn to_json(&self) -> Result<String, ReadingError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn data(&self) -> &Measurements {
        &self.data
    }
}

mod wire {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct Reading {
        #[serde(default = "unknown_device")]
        pub device_id: String,
        #[serde(default)]
        pub data: Data,
    }

    #[derive(Debug, Default, Deserialize)]
    pub struct Data {
        pub ph: Option<f64>,
        pub solids: Option<f64>,
        pub turbidity: Option<f64>,
    }

    fn unknown_device() -> String {
        super::UNKNOWN_DEVICE.to_owned()
    }
}

/// Random UUID (version 4) identifying a stored reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReadingId(String);

impl ReadingId {
    pub fn generate<R: SecureRandom>(rng: &R) -> Result<ReadingId, ReadingError> {
        let mut bytes = [0u8; 16];
        rng.fill(&mut bytes).map_err(|_| ReadingError::Random)?;
        bytes[6] = (bytes[6] & 0x0f) | 0x40;
        bytes[8] = (bytes[8] & 0x3f) | 0x80;
        let hex = hex::encode(bytes);
        Ok(ReadingId(format!(
            "{}-{}-{}-{}-{}",
            &hex[0..8],
            &hex[8..12],
            &hex[12..16],
            &hex[16..20],
            &hex[20..32]
        )))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReadingId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A classified reading, as stored. Measurements are kept as text with
/// two decimals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    reading_id: ReadingId,
    device_id: String,
    timestamp_utc: u64,
    ph: String,
    solids: String,
    turbidity: String,
    is_potable: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    longitude: Option<f64>,
}

impl Record {
    pub fn new(
        reading: &Reading,
        reading_id: ReadingId,
        timestamp_utc: u64,
        is_potable: bool,
    ) -> Record {
        let data = reading.data();
        Record {
            reading_id,
            device_id: reading.device_id().to_owned(),
            timestamp_utc,
            ph: format!("{:.2}", data.ph),
            solids: format!("{:.2}", data.solids),
            turbidity: format!("{:.2}", data.turbidity),
            is_potable: is_potable.into(),
            latitude: None,
            longitude: None,
        }
    }

    /// Records |reading| now, under a fresh id.
    pub fn stamp<R: SecureRandom>(
        reading: &Reading,
        is_potable: bool,
        rng: &R,
    ) -> Result<Record, ReadingError> {
        let timestamp_utc = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map_err(|_| ReadingError::Clock)?
            .as_secs();
        let record = Record::new(reading, ReadingId::generate(rng)?, timestamp_utc, is_potable);
        tracing::debug!(
            "reading {} of {} recorded",
            record.reading_id,
            record.device_id
        );
        Ok(record)
    }

    /// Tags the record with where the sample was taken.
    pub fn locate(self, location: Location) -> Record {
        Record {
            latitude: Some(location.latitude()),
            longitude: Some(location.longitude()),
            ..self
        }
    }

    pub fn reading_id(&self) -> &ReadingId {
        &self.reading_id
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn timestamp_utc(&self) -> u64 {
        self.timestamp_utc
    }

    pub fn is_potable(&self) -> bool {
        self.is_potable != 0
    }

    pub fn location(&self) -> Option<Location> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Location::new(latitude, longitude).ok(),
            _ => None,
        }
    }

    /// Measurements as stored, ph, solids and turbidity.
    pub fn values(&self) -> [&str; 3] {
        [&self.ph, &self.solids, &self.turbidity]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ring::rand::SystemRandom;
    use test_log::test;

    fn sample() -> Measurements {
        Measurements {
            ph: 7.1,
            solids: 310.5,
            turbidity: 3.25,
        }
    }

    #[test]
    fn parse_published_reading() -> anyhow::Result<()> {
        let reading = Reading::from_json(
            r#"{"device_id": "esp32_water_monitor",
                "data": {"ph": 7.1, "solids": 310.5, "turbidity": 3.25}}"#,
        )?;
        assert_eq!(reading.device_id(), "esp32_water_monitor");
        assert_eq!(reading.data(), &sample());
        Ok(())
    }

    #[test]
    fn device_id_defaults_to_unknown() -> anyhow::Result<()> {
        let reading =
            Reading::from_json(r#"{"data": {"ph": 7, "solids": 300, "turbidity": 3}}"#)?;
        assert_eq!(reading.device_id(), UNKNOWN_DEVICE);
        Ok(())
    }

    #[test]
    fn refuse_missing_measurements() {
        match Reading::from_json(r#"{"device_id": "d", "data": {"ph": 7.1, "solids": null}}"#) {
            Err(ReadingError::Missing(names)) => assert_eq!(names, vec!["solids", "turbidity"]),
            other => panic!("unexpected {:?}", other),
        }
        match Reading::from_json(r#"{"device_id": "d"}"#) {
            Err(ReadingError::Missing(names)) => assert_eq!(names.len(), 3),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn refuse_invalid_json() {
        assert!(matches!(
            Reading::from_json(r#"{"data": {"ph": "neutral"}}"#),
            Err(ReadingError::Json(_))
        ));
        assert!(matches!(
            Reading::from_json("ph=7"),
            Err(ReadingError::Json(_))
        ));
    }

    #[test]
    fn refuse_non_finite_values() {
        let data = Measurements {
            turbidity: f64::NAN,
            ..sample()
        };
        assert!(matches!(
            Reading::new("d", data),
            Err(ReadingError::NotFinite("turbidity"))
        ));
    }

    #[test]
    fn publish_then_parse() -> anyhow::Result<()> {
        let reading = Reading::new("esp32_water_monitor", sample())?;
        let payload = reading.to_json()?;
        assert!(payload.starts_with(r#"{"device_id":"esp32_water_monitor","data":{"ph":7.1"#));
        assert_eq!(Reading::from_json(&payload)?, reading);
        Ok(())
    }

    #[test]
    fn reading_ids_are_uuids() -> anyhow::Result<()> {
        let rng = SystemRandom::new();
        let id = ReadingId::generate(&rng)?;
        let text = id.as_str();
        assert_eq!(text.len(), 36);
        let groups: Vec<usize> = text.split('-').map(str::len).collect();
        assert_eq!(groups, vec![8, 4, 4, 4, 12]);
        assert_eq!(&text[14..15], "4");
        assert!(matches!(&text[19..20], "8" | "9" | "a" | "b"));
        assert_ne!(ReadingId::generate(&rng)?, id);
        Ok(())
    }

    #[test]
    fn records_keep_two_decimals() -> anyhow::Result<()> {
        let reading = Reading::new("esp32_water_monitor", sample())?;
        let id = ReadingId::generate(&SystemRandom::new())?;
        let record = Record::new(&reading, id.clone(), 1_700_000_000, true);
        assert_eq!(record.values(), ["7.10", "310.50", "3.25"]);
        assert_eq!(record.reading_id(), &id);
        assert!(record.is_potable());

        let json = serde_json::to_value(&record)?;
        assert_eq!(json["is_potable"], 1);
        assert_eq!(json["timestamp_utc"], 1_700_000_000u64);
        assert!(json.get("latitude").is_none());
        Ok(())
    }

    #[test]
    fn stamp_uses_current_time() -> anyhow::Result<()> {
        let reading = Reading::new("esp32_water_monitor", sample())?;
        let record = Record::stamp(&reading, false, &SystemRandom::new())?;
        assert!(record.timestamp_utc() > 1_600_000_000);
        assert!(!record.is_potable());
        assert_eq!(record.device_id(), "esp32_water_monitor");
        Ok(())
    }

    #[test]
    fn located_record() -> anyhow::Result<()> {
        let reading = Reading::new("esp32_water_monitor", sample())?;
        let id = ReadingId::generate(&SystemRandom::new())?;
        let location = Location::new(-33.9, 18.4)?;
        let record = Record::new(&reading, id, 1_700_000_000, true).locate(location);
        assert_eq!(record.location(), Some(location));

        let json = serde_json::to_value(&record)?;
        assert_eq!(json["latitude"], -33.9);
        assert_eq!(json["longitude"], 18.4);
        let parsed: Record = serde_json::from_value(json)?;
        assert_eq!(parsed, record);
        Ok(())
    }
}
