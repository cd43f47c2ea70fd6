//! Fields computed from the stored ones after a file is read.

use super::{utils, ExampleCollection, ExampleError, Field};
use crate::config::Constants;
use crate::math;

/// Append liquid, ice and vapour path profiles
///
/// Downward paths integrate from the top of the atmosphere, upward paths from
/// the surface. Paths already present are left alone.
pub fn add_water_path_profiles(
    example: &mut ExampleCollection,
    integrate_upward: bool,
    constants: &Constants,
) -> Result<(), ExampleError> {
    let (liquid_path, ice_path, vapour_path) = if integrate_upward {
        (
            Field::UpwardLiquidWaterPath,
            Field::UpwardIceWaterPath,
            Field::UpwardWaterVapourPath,
        )
    } else {
        (
            Field::LiquidWaterPath,
            Field::IceWaterPath,
            Field::WaterVapourPath,
        )
    };

    let missing = |field: &Field, example: &ExampleCollection| {
        !example.vector_predictor_names.contains(field)
    };
    let get_lwp = missing(&liquid_path, example);
    let get_iwp = missing(&ice_path, example);
    let get_wvp = missing(&vapour_path, example);
    if !(get_lwp || get_iwp || get_wvp) {
        return Ok(());
    }

    let widths = utils::grid_cell_widths(&example.heights_m_agl)?;

    if get_lwp {
        let lwc = example.vector_field(Field::LiquidWaterContent)?;
        let lwp = math::content_to_path(lwc, widths.view(), integrate_upward);
        example.set_vector_field(liquid_path, lwp)?;
    }

    if get_iwp {
        let iwc = example.vector_field(Field::IceWaterContent)?;
        let iwp = math::content_to_path(iwc, widths.view(), integrate_upward);
        example.set_vector_field(ice_path, iwp)?;
    }

    if get_wvp {
        let vapour_content = math::vapour_content(
            example.vector_field(Field::SpecificHumidity)?,
            example.vector_field(Field::Temperature)?,
            example.vector_field(Field::Pressure)?,
            constants,
        );
        let wvp = math::content_to_path(vapour_content.view(), widths.view(), integrate_upward);
        example.set_vector_field(vapour_path, wvp)?;
    }
    Ok(())
}

/// Add (or refresh) the relative-humidity profile
pub fn add_relative_humidity(
    example: &mut ExampleCollection,
    constants: &Constants,
) -> Result<(), ExampleError> {
    let relative_humidity = math::relative_humidity_profiles(
        example.vector_field(Field::SpecificHumidity)?,
        example.vector_field(Field::Temperature)?,
        example.vector_field(Field::Pressure)?,
        constants,
    );
    example.set_vector_field(Field::RelativeHumidity, relative_humidity)
}

/// Derive flux-increment targets from whichever actual fluxes are present
pub fn fluxes_actual_to_increments(example: &mut ExampleCollection) -> Result<(), ExampleError> {
    let pairs = [
        (Field::DownFlux, Field::DownFluxIncrement),
        (Field::UpFlux, Field::UpFluxIncrement),
    ];
    if !pairs
        .iter()
        .any(|(flux, _)| example.vector_target_names.contains(flux))
    {
        return Ok(());
    }

    let widths = utils::grid_cell_widths(&example.heights_m_agl)?;
    for (flux_field, increment_field) in pairs {
        if !example.vector_target_names.contains(&flux_field) {
            continue;
        }
        let increments = math::fluxes_to_increments(example.vector_field(flux_field)?, widths.view());
        example.set_vector_field(increment_field, increments)?;
    }
    Ok(())
}

/// Rebuild actual fluxes from whichever flux increments are present
pub fn fluxes_increments_to_actual(example: &mut ExampleCollection) -> Result<(), ExampleError> {
    let pairs = [
        (Field::DownFluxIncrement, Field::DownFlux),
        (Field::UpFluxIncrement, Field::UpFlux),
    ];
    if !pairs
        .iter()
        .any(|(increment, _)| example.vector_target_names.contains(increment))
    {
        return Ok(());
    }

    let widths = utils::grid_cell_widths(&example.heights_m_agl)?;
    for (increment_field, flux_field) in pairs {
        if !example.vector_target_names.contains(&increment_field) {
            continue;
        }
        let fluxes = math::increments_to_fluxes(example.vector_field(increment_field)?, widths.view());
        example.set_vector_field(flux_field, fluxes)?;
    }
    Ok(())
}

/// Replace (or add) the heating-rate target with the one implied by the fluxes
pub fn heating_rate_from_fluxes(
    example: &mut ExampleCollection,
    constants: &Constants,
) -> Result<(), ExampleError> {
    let heating_rate = math::heating_rate_from_fluxes(
        example.vector_field(Field::DownFlux)?,
        example.vector_field(Field::UpFlux)?,
        example.vector_field(Field::Pressure)?,
        constants,
    );
    example.set_vector_field(Field::HeatingRate, heating_rate)
}
