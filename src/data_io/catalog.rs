//! Static field catalog: canonical names, kinds, on-disk names and unit
//! conversions for every quantity an example collection can carry.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Role of a field inside an example collection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldKind {
    ScalarPredictor,
    VectorPredictor,
    ScalarTarget,
    VectorTarget,
}

/// Every field known to the pipeline
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Field {
    ZenithAngle,
    Latitude,
    Longitude,
    Albedo,
    ColumnLiquidWaterPath,
    ColumnIceWaterPath,
    Pressure,
    Temperature,
    SpecificHumidity,
    LiquidWaterContent,
    IceWaterContent,
    LiquidWaterPath,
    IceWaterPath,
    WaterVapourPath,
    UpwardLiquidWaterPath,
    UpwardIceWaterPath,
    UpwardWaterVapourPath,
    RelativeHumidity,
    SurfaceDownFlux,
    ToaUpFlux,
    DownFlux,
    UpFlux,
    HeatingRate,
    DownFluxIncrement,
    UpFluxIncrement,
}

pub const ALL_FIELDS: [Field; 25] = [
    Field::ZenithAngle,
    Field::Latitude,
    Field::Longitude,
    Field::Albedo,
    Field::ColumnLiquidWaterPath,
    Field::ColumnIceWaterPath,
    Field::Pressure,
    Field::Temperature,
    Field::SpecificHumidity,
    Field::LiquidWaterContent,
    Field::IceWaterContent,
    Field::LiquidWaterPath,
    Field::IceWaterPath,
    Field::WaterVapourPath,
    Field::UpwardLiquidWaterPath,
    Field::UpwardIceWaterPath,
    Field::UpwardWaterVapourPath,
    Field::RelativeHumidity,
    Field::SurfaceDownFlux,
    Field::ToaUpFlux,
    Field::DownFlux,
    Field::UpFlux,
    Field::HeatingRate,
    Field::DownFluxIncrement,
    Field::UpFluxIncrement,
];

/// Scalar predictors stored in the yearly files
pub const DEFAULT_SCALAR_PREDICTOR_NAMES: [Field; 6] = [
    Field::ZenithAngle,
    Field::Albedo,
    Field::Latitude,
    Field::Longitude,
    Field::ColumnLiquidWaterPath,
    Field::ColumnIceWaterPath,
];

/// Vector predictors stored in the yearly files
pub const DEFAULT_VECTOR_PREDICTOR_NAMES: [Field; 5] = [
    Field::Pressure,
    Field::Temperature,
    Field::SpecificHumidity,
    Field::LiquidWaterContent,
    Field::IceWaterContent,
];

/// Scalar targets stored in the yearly files
pub const DEFAULT_SCALAR_TARGET_NAMES: [Field; 2] = [Field::SurfaceDownFlux, Field::ToaUpFlux];

/// Vector targets stored in the yearly files
pub const DEFAULT_VECTOR_TARGET_NAMES: [Field; 3] =
    [Field::DownFlux, Field::UpFlux, Field::HeatingRate];

impl Field {
    /// Canonical name, also used in serialized configs and metadata
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::ZenithAngle => "zenith_angle_radians",
            Field::Latitude => "latitude_deg_n",
            Field::Longitude => "longitude_deg_e",
            Field::Albedo => "albedo",
            Field::ColumnLiquidWaterPath => "column_liquid_water_path_kg_m02",
            Field::ColumnIceWaterPath => "column_ice_water_path_kg_m02",
            Field::Pressure => "pressure_pascals",
            Field::Temperature => "temperature_kelvins",
            Field::SpecificHumidity => "specific_humidity_kg_kg01",
            Field::LiquidWaterContent => "liquid_water_content_kg_m03",
            Field::IceWaterContent => "ice_water_content_kg_m03",
            Field::LiquidWaterPath => "liquid_water_path_kg_m02",
            Field::IceWaterPath => "ice_water_path_kg_m02",
            Field::WaterVapourPath => "vapour_path_kg_m02",
            Field::UpwardLiquidWaterPath => "upward_liquid_water_path_kg_m02",
            Field::UpwardIceWaterPath => "upward_ice_water_path_kg_m02",
            Field::UpwardWaterVapourPath => "upward_vapour_path_kg_m02",
            Field::RelativeHumidity => "relative_humidity_unitless",
            Field::SurfaceDownFlux => "shortwave_surface_down_flux_W_m02",
            Field::ToaUpFlux => "shortwave_toa_up_flux_W_m02",
            Field::DownFlux => "shortwave_down_flux_W_m02",
            Field::UpFlux => "shortwave_up_flux_W_m02",
            Field::HeatingRate => "shortwave_heating_rate_K_s01",
            Field::DownFluxIncrement => "shortwave_down_flux_increment_W_m03",
            Field::UpFluxIncrement => "shortwave_up_flux_increment_W_m03",
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            Field::ZenithAngle
            | Field::Latitude
            | Field::Longitude
            | Field::Albedo
            | Field::ColumnLiquidWaterPath
            | Field::ColumnIceWaterPath => FieldKind::ScalarPredictor,
            Field::Pressure
            | Field::Temperature
            | Field::SpecificHumidity
            | Field::LiquidWaterContent
            | Field::IceWaterContent
            | Field::LiquidWaterPath
            | Field::IceWaterPath
            | Field::WaterVapourPath
            | Field::UpwardLiquidWaterPath
            | Field::UpwardIceWaterPath
            | Field::UpwardWaterVapourPath
            | Field::RelativeHumidity => FieldKind::VectorPredictor,
            Field::SurfaceDownFlux | Field::ToaUpFlux => FieldKind::ScalarTarget,
            Field::DownFlux
            | Field::UpFlux
            | Field::HeatingRate
            | Field::DownFluxIncrement
            | Field::UpFluxIncrement => FieldKind::VectorTarget,
        }
    }

    /// Variable name in the yearly files, None for derived fields
    pub fn disk_name(&self) -> Option<&'static str> {
        match self {
            Field::ZenithAngle => Some("sza"),
            Field::Latitude => Some("lat"),
            Field::Longitude => Some("lon"),
            Field::Albedo => Some("albedo"),
            Field::ColumnLiquidWaterPath => Some("lwp"),
            Field::ColumnIceWaterPath => Some("iwp"),
            Field::Pressure => Some("p"),
            Field::Temperature => Some("t"),
            Field::SpecificHumidity => Some("q"),
            Field::LiquidWaterContent => Some("lwc"),
            Field::IceWaterContent => Some("iwc"),
            Field::SurfaceDownFlux => Some("sfcflux"),
            Field::ToaUpFlux => Some("toaflux"),
            Field::DownFlux => Some("fluxd"),
            Field::UpFlux => Some("fluxu"),
            Field::HeatingRate => Some("hr"),
            _ => None,
        }
    }

    /// Multiplier taking on-disk units to canonical units
    pub fn conversion_factor(&self) -> f64 {
        match self {
            Field::ZenithAngle => std::f64::consts::PI / 180.0, // deg -> rad
            Field::ColumnLiquidWaterPath | Field::ColumnIceWaterPath => 0.001, // g/m² -> kg/m²
            Field::Pressure => 100.0,                                          // hPa -> Pa
            Field::SpecificHumidity => 0.001,                                  // g/kg -> kg/kg
            Field::LiquidWaterContent | Field::IceWaterContent => 0.001,       // g/m² -> kg/m²
            _ => 1.0,
        }
    }

    /// On disk, water contents are layerwise paths that still need dividing
    /// by the grid-cell width
    pub fn is_stored_as_layerwise_path(&self) -> bool {
        matches!(self, Field::LiquidWaterContent | Field::IceWaterContent)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Field {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_FIELDS
            .iter()
            .find(|field| field.as_str() == s)
            .copied()
            .ok_or_else(|| format!("Unknown field name: {}", s))
    }
}

impl From<Field> for String {
    fn from(field: Field) -> Self {
        field.as_str().to_string()
    }
}

impl TryFrom<String> for Field {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_parse_back() {
        for field in ALL_FIELDS {
            assert_eq!(field.as_str().parse::<Field>(), Ok(field));
        }
        assert!("not_a_field".parse::<Field>().is_err());
    }

    #[test]
    fn test_defaults_have_disk_names_and_matching_kinds() {
        for field in DEFAULT_SCALAR_PREDICTOR_NAMES {
            assert_eq!(field.kind(), FieldKind::ScalarPredictor);
            assert!(field.disk_name().is_some());
        }
        for field in DEFAULT_VECTOR_PREDICTOR_NAMES {
            assert_eq!(field.kind(), FieldKind::VectorPredictor);
            assert!(field.disk_name().is_some());
        }
        for field in DEFAULT_SCALAR_TARGET_NAMES {
            assert_eq!(field.kind(), FieldKind::ScalarTarget);
        }
        for field in DEFAULT_VECTOR_TARGET_NAMES {
            assert_eq!(field.kind(), FieldKind::VectorTarget);
        }
    }

    #[test]
    fn test_unit_conversions() {
        assert!((Field::ZenithAngle.conversion_factor() * 180.0 - std::f64::consts::PI).abs() < 1e-12);
        assert_eq!(Field::Pressure.conversion_factor(), 100.0);
        assert_eq!(Field::SpecificHumidity.conversion_factor(), 0.001);
        assert_eq!(Field::Temperature.conversion_factor(), 1.0);
        assert!(Field::RelativeHumidity.disk_name().is_none());
    }

    #[test]
    fn test_serde_uses_canonical_name() {
        let json = serde_json::to_string(&vec![Field::Temperature]).unwrap();
        assert_eq!(json, r#"["temperature_kelvins"]"#);
        let back: Vec<Field> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, vec![Field::Temperature]);
    }
}
