//! JSON payload of the telemetry endpoint.
//!
//! The portal is loose with types: numbers sometimes arrive as strings and
//! optional fields as `null` or `""`. Every field is therefore decoded
//! leniently and validated when converting into [`TelemetryRecord`].

use chrono::NaiveTime;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::models::telemetry::TelemetryRecord;

/// One point as sent by the portal.
#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
pub struct BustimePoint {
    /// Time of day, `HH:MM:SS`.
    #[serde(default, deserialize_with = "lenient_string")]
    pub timestamp: Option<String>,
    #[serde(default, deserialize_with = "lenient_i32")]
    pub heading: Option<i32>,
    #[serde(default, deserialize_with = "lenient_i32")]
    pub speed: Option<i32>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub lon: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub lat: Option<f64>,
    #[serde(default, deserialize_with = "lenient_i32")]
    pub direction: Option<i32>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub uniqueid: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub gosnum: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub bortnum: Option<String>,
    #[serde(default, deserialize_with = "lenient_i32")]
    pub probeg: Option<i32>,
}

/// The endpoint answers `null` instead of `[]` for some empty days.
pub type BustimeResponse = Option<Vec<BustimePoint>>;

impl TryFrom<BustimePoint> for TelemetryRecord {
    type Error = String;

    fn try_from(p: BustimePoint) -> Result<Self, Self::Error> {
        let raw_time = p.timestamp.ok_or("missing timestamp")?;
        let time = NaiveTime::parse_from_str(&raw_time, "%H:%M:%S")
            .map_err(|e| format!("bad timestamp {raw_time:?}: {e}"))?;
        let uniqueid = p.uniqueid.ok_or("missing uniqueid")?;
        let lon = p.lon.ok_or("missing lon")?;
        let lat = p.lat.ok_or("missing lat")?;
        Ok(TelemetryRecord {
            time,
            uniqueid,
            heading: p.heading,
            speed: p.speed,
            lon,
            lat,
            direction: p.direction,
            gosnum: p.gosnum,
            bortnum: p.bortnum,
            probeg: p.probeg,
        })
    }
}

fn lenient_string<'de, D>(de: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(de)? {
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_f64<'de, D>(de: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(de)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_i32<'de, D>(de: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_f64(de)?.and_then(|f| {
        (f.is_finite() && f >= f64::from(i32::MIN) && f <= f64::from(i32::MAX))
            .then(|| f.round() as i32)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_mixed_types() {
        let body = r#"[
            {"timestamp":"08:01:02","heading":"90","speed":35,"lon":49.12,"lat":"55.79",
             "direction":1,"uniqueid":"ab12cd34","gosnum":"","bortnum":1021,"probeg":null},
            {"timestamp":"08:01:05","lon":49.13,"lat":55.80,"uniqueid":"ab12cd34"}
        ]"#;
        let points: BustimeResponse = serde_json::from_str(body).unwrap();
        let points = points.unwrap();
        assert_eq!(points.len(), 2);

        let first = &points[0];
        assert_eq!(first.heading, Some(90));
        assert_eq!(first.lat, Some(55.79));
        assert_eq!(first.gosnum, None);
        assert_eq!(first.bortnum.as_deref(), Some("1021"));
        assert_eq!(first.probeg, None);

        let rec = TelemetryRecord::try_from(points[1].clone()).unwrap();
        assert_eq!(rec.time, NaiveTime::from_hms_opt(8, 1, 5).unwrap());
        assert_eq!(rec.speed, None);
    }

    #[test]
    fn null_body_means_no_points() {
        let points: BustimeResponse = serde_json::from_str("null").unwrap();
        assert!(points.is_none());
    }

    #[test]
    fn invalid_points_are_rejected_with_reason() {
        let p = BustimePoint {
            timestamp: Some("25:99:00".into()),
            uniqueid: Some("x".into()),
            lon: Some(1.0),
            lat: Some(1.0),
            ..Default::default()
        };
        let err = TelemetryRecord::try_from(p).unwrap_err();
        assert!(err.contains("bad timestamp"));

        let p = BustimePoint {
            timestamp: Some("10:00:00".into()),
            uniqueid: Some("x".into()),
            ..Default::default()
        };
        assert_eq!(TelemetryRecord::try_from(p).unwrap_err(), "missing lon");
    }
}
