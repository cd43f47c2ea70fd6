//! Example IDs: one string per example encoding where, when and in which
//! reference atmosphere it was generated.
//!
//! Format: `lat=<lat>_long=<lon>_zenith-angle-rad=<zenith>_time=<unix sec>_atmo=<flag>`.
//! Floats use Rust's shortest round-trip formatting, so parsing an ID gives
//! back exactly the values it was built from.

use crate::data_io::{ExampleCollection, ExampleError, Field, StandardAtmosphere};

/// Metadata carried by one example ID
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExampleMetadata {
    pub latitude_deg_n: f64,
    pub longitude_deg_e: f64,
    pub zenith_angle_rad: f64,
    pub valid_time_unix_sec: i64,
    pub standard_atmo_flag: StandardAtmosphere,
}

impl ExampleMetadata {
    pub fn to_id_string(&self) -> String {
        format!(
            "lat={}_long={}_zenith-angle-rad={}_time={}_atmo={}",
            self.latitude_deg_n,
            self.longitude_deg_e,
            self.zenith_angle_rad,
            self.valid_time_unix_sec,
            self.standard_atmo_flag.as_i64()
        )
    }
}

/// One ID per example; needs latitude, longitude and zenith angle
pub fn create_example_ids(example: &ExampleCollection) -> Result<Vec<String>, ExampleError> {
    let latitudes = example.scalar_field(Field::Latitude)?;
    let longitudes = example.scalar_field(Field::Longitude)?;
    let zenith_angles = example.scalar_field(Field::ZenithAngle)?;

    Ok((0..example.num_examples())
        .map(|i| {
            ExampleMetadata {
                latitude_deg_n: latitudes[i],
                longitude_deg_e: longitudes[i],
                zenith_angle_rad: zenith_angles[i],
                valid_time_unix_sec: example.valid_times_unix_sec[i],
                standard_atmo_flag: example.standard_atmo_flags[i],
            }
            .to_id_string()
        })
        .collect())
}

fn invalid(id: &str, reason: impl Into<String>) -> ExampleError {
    ExampleError::InvalidExampleId {
        id: id.to_string(),
        reason: reason.into(),
    }
}

/// Parse a single example ID
pub fn parse_example_id(id: &str) -> Result<ExampleMetadata, ExampleError> {
    let rest = id
        .strip_prefix("lat=")
        .ok_or_else(|| invalid(id, "missing 'lat=' prefix"))?;
    let (latitude, rest) = rest
        .split_once("_long=")
        .ok_or_else(|| invalid(id, "missing '_long='"))?;
    let (longitude, rest) = rest
        .split_once("_zenith-angle-rad=")
        .ok_or_else(|| invalid(id, "missing '_zenith-angle-rad='"))?;
    let (zenith_angle, rest) = rest
        .split_once("_time=")
        .ok_or_else(|| invalid(id, "missing '_time='"))?;
    let (valid_time, flag) = rest
        .split_once("_atmo=")
        .ok_or_else(|| invalid(id, "missing '_atmo='"))?;

    let parse_float = |token: &str, what: &str| {
        token
            .parse::<f64>()
            .map_err(|_| invalid(id, format!("bad {} '{}'", what, token)))
    };

    let flag_value = flag
        .parse::<i64>()
        .map_err(|_| invalid(id, format!("bad atmosphere flag '{}'", flag)))?;
    let standard_atmo_flag = StandardAtmosphere::try_from(flag_value)
        .map_err(|v| invalid(id, format!("unknown atmosphere flag {}", v)))?;

    Ok(ExampleMetadata {
        latitude_deg_n: parse_float(latitude, "latitude")?,
        longitude_deg_e: parse_float(longitude, "longitude")?,
        zenith_angle_rad: parse_float(zenith_angle, "zenith angle")?,
        valid_time_unix_sec: valid_time
            .parse::<i64>()
            .map_err(|_| invalid(id, format!("bad time '{}'", valid_time)))?,
        standard_atmo_flag,
    })
}

pub fn parse_example_ids<S: AsRef<str>>(ids: &[S]) -> Result<Vec<ExampleMetadata>, ExampleError> {
    ids.iter().map(|id| parse_example_id(id.as_ref())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_format() {
        let metadata = ExampleMetadata {
            latitude_deg_n: 40.02,
            longitude_deg_e: 255.5,
            zenith_angle_rad: 1.0,
            valid_time_unix_sec: 300,
            standard_atmo_flag: StandardAtmosphere::MidlatitudeSummer,
        };
        assert_eq!(
            metadata.to_id_string(),
            "lat=40.02_long=255.5_zenith-angle-rad=1_time=300_atmo=2"
        );
    }

    #[test]
    fn test_parse_is_exact() {
        let metadata = ExampleMetadata {
            latitude_deg_n: -12.345678901234567,
            longitude_deg_e: 359.99999999,
            zenith_angle_rad: std::f64::consts::FRAC_PI_3,
            valid_time_unix_sec: 1_600_000_000,
            standard_atmo_flag: StandardAtmosphere::SubarcticWinter,
        };
        let parsed = parse_example_id(&metadata.to_id_string()).unwrap();
        assert_eq!(parsed, metadata);
    }

    #[test]
    fn test_malformed_ids_rejected() {
        for id in [
            "",
            "lat=1_long=2_zenith-angle-rad=3_time=4",
            "lat=x_long=2_zenith-angle-rad=3_time=4_atmo=1",
            "lat=1_long=2_zenith-angle-rad=3_time=4_atmo=9",
        ] {
            assert!(matches!(
                parse_example_id(id),
                Err(ExampleError::InvalidExampleId { .. })
            ));
        }
    }
}
