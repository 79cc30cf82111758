//! Where a sample was taken, as sent by operators to tag a stored reading.
use crate::ReadingError;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    latitude: f64,
    longitude: f64,
}

impl Location {
    /// Degrees, latitude within [-90, 90] and longitude within [-180, 180].
    pub fn new(latitude: f64, longitude: f64) -> Result<Location, ReadingError> {
        if !(latitude.is_finite() && (-90.0..=90.0).contains(&latitude)) {
            return Err(ReadingError::InvalidLocation(format!(
                "latitude {} is out of range",
                latitude
            )));
        }
        if !(longitude.is_finite() && (-180.0..=180.0).contains(&longitude)) {
            return Err(ReadingError::InvalidLocation(format!(
                "longitude {} is out of range",
                longitude
            )));
        }
        Ok(Location {
            latitude,
            longitude,
        })
    }

    /// Parses {"latitude": .., "longitude": ..}. Numbers may be sent as
    /// JSON numbers or as numeric strings.
    pub fn from_json(body: &str) -> Result<Location, ReadingError> {
        let body: Value = serde_json::from_str(body)
            .map_err(|err| ReadingError::InvalidLocation(err.to_string()))?;
        Location::new(number(&body, "latitude")?, number(&body, "longitude")?)
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}

fn number(body: &Value, name: &str) -> Result<f64, ReadingError> {
    let value = match body.get(name) {
        Some(Value::Number(number)) => number.as_f64(),
        Some(Value::String(text)) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    value.ok_or_else(|| ReadingError::InvalidLocation(format!("{} must be a number", name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invalid(result: Result<Location, ReadingError>) -> bool {
        matches!(result, Err(ReadingError::InvalidLocation(_)))
    }

    #[test]
    fn parse_numbers() -> anyhow::Result<()> {
        let location = Location::from_json(r#"{"latitude": -33.9249, "longitude": 18.4241}"#)?;
        assert_eq!(location.latitude(), -33.9249);
        assert_eq!(location.longitude(), 18.4241);

        let location = Location::from_json(r#"{"latitude": "45", "longitude": 7}"#)?;
        assert_eq!(location, Location::new(45.0, 7.0)?);
        Ok(())
    }

    #[test]
    fn refuse_non_numbers() {
        assert!(invalid(Location::from_json(r#"{"latitude": 45}"#)));
        assert!(invalid(Location::from_json(r#"{"longitude": 7}"#)));
        assert!(invalid(Location::from_json(
            r#"{"latitude": "north", "longitude": 7}"#
        )));
        assert!(invalid(Location::from_json(
            r#"{"latitude": null, "longitude": 7}"#
        )));
        assert!(invalid(Location::from_json(
            r#"{"latitude": [45], "longitude": 7}"#
        )));
        assert!(invalid(Location::from_json("")));
        assert!(invalid(Location::from_json("latitude=45")));
    }

    #[test]
    fn refuse_out_of_range() {
        assert!(invalid(Location::new(90.5, 0.0)));
        assert!(invalid(Location::new(0.0, -180.5)));
        assert!(invalid(Location::new(f64::NAN, 0.0)));
        assert!(invalid(Location::from_json(
            r#"{"latitude": "inf", "longitude": 7}"#
        )));
        assert!(Location::new(-90.0, 180.0).is_ok());
    }
}
