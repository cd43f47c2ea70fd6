use crate::config::Constants;
use ndarray::{Array2, ArrayView1, ArrayView2, Axis, Zip};

/// Convert specific humidity (kg/kg) to mixing ratio (kg/kg)
pub fn specific_humidity_to_mixing_ratio(specific_humidity: f64) -> f64 {
    specific_humidity / (1.0 - specific_humidity)
}

/// Convert mixing ratio to vapour pressure (Pa)
pub fn mixing_ratio_to_vapour_pressure(mixing_ratio: f64, pressure: f64, constants: &Constants) -> f64 {
    pressure * mixing_ratio / (constants.epsilon() + mixing_ratio)
}

/// Calculate virtual temperature (K) from temperature, total pressure and vapour pressure
pub fn virtual_temperature(
    temperature: f64,
    pressure: f64,
    vapour_pressure: f64,
    constants: &Constants,
) -> f64 {
    temperature / (1.0 - (vapour_pressure / pressure) * (1.0 - constants.epsilon()))
}

/// Saturation vapour pressure over liquid water (Bolton 1980)
pub fn saturation_vapour_pressure(temperature: f64, constants: &Constants) -> f64 {
    let celsius = temperature - constants.freezing_point;
    constants.es0 * (17.67 * celsius / (celsius + 243.5)).exp()
}

/// Saturation mixing ratio (kg/kg)
pub fn saturation_mixing_ratio(temperature: f64, pressure: f64, constants: &Constants) -> f64 {
    let es = saturation_vapour_pressure(temperature, constants);
    constants.epsilon() * es / (pressure - es)
}

/// Relative humidity (unitless) from specific humidity, temperature and pressure
pub fn relative_humidity(
    specific_humidity: f64,
    temperature: f64,
    pressure: f64,
    constants: &Constants,
) -> f64 {
    let mixing_ratio = specific_humidity_to_mixing_ratio(specific_humidity);
    mixing_ratio / saturation_mixing_ratio(temperature, pressure, constants)
}

/// Calculate moist air density (kg/m³) using the virtual temperature
pub fn air_density(
    specific_humidity: f64,
    temperature: f64,
    pressure: f64,
    constants: &Constants,
) -> f64 {
    let mixing_ratio = specific_humidity_to_mixing_ratio(specific_humidity);
    let vapour_pressure = mixing_ratio_to_vapour_pressure(mixing_ratio, pressure, constants);
    let tv = virtual_temperature(temperature, pressure, vapour_pressure, constants);
    pressure / (constants.r_dry * tv)
}

/// Water-vapour content (kg/m³) for E x H profiles
pub fn vapour_content(
    specific_humidity: ArrayView2<f64>,
    temperature: ArrayView2<f64>,
    pressure: ArrayView2<f64>,
    constants: &Constants,
) -> Array2<f64> {
    Zip::from(&specific_humidity)
        .and(&temperature)
        .and(&pressure)
        .map_collect(|&q, &t, &p| q * air_density(q, t, p, constants))
}

/// Relative humidity for E x H profiles
pub fn relative_humidity_profiles(
    specific_humidity: ArrayView2<f64>,
    temperature: ArrayView2<f64>,
    pressure: ArrayView2<f64>,
    constants: &Constants,
) -> Array2<f64> {
    Zip::from(&specific_humidity)
        .and(&temperature)
        .and(&pressure)
        .map_collect(|&q, &t, &p| relative_humidity(q, t, p, constants))
}

/// Layerwise path (kg/m²) from content (kg/m³): each cell on its own
pub fn content_to_layerwise_path(content: ArrayView2<f64>, widths: ArrayView1<f64>) -> Array2<f64> {
    &content * &widths.insert_axis(Axis(0))
}

pub fn layerwise_path_to_content(path: ArrayView2<f64>, widths: ArrayView1<f64>) -> Array2<f64> {
    &path / &widths.insert_axis(Axis(0))
}

/// Integrate content into a path profile
///
/// Downward integration runs from the top of the atmosphere, so the value at
/// height k covers cells k..H. Upward integration covers cells 0..=k.
pub fn content_to_path(
    content: ArrayView2<f64>,
    widths: ArrayView1<f64>,
    integrate_upward: bool,
) -> Array2<f64> {
    let mut path = content_to_layerwise_path(content, widths);
    let num_heights = path.ncols();

    for mut row in path.rows_mut() {
        if integrate_upward {
            for k in 1..num_heights {
                row[k] += row[k - 1];
            }
        } else {
            for k in (0..num_heights.saturating_sub(1)).rev() {
                row[k] += row[k + 1];
            }
        }
    }
    path
}

/// Inverse of `content_to_path`
pub fn path_to_content(
    path: ArrayView2<f64>,
    widths: ArrayView1<f64>,
    integrate_upward: bool,
) -> Array2<f64> {
    let mut layerwise = path.to_owned();
    let num_heights = path.ncols();

    for (mut out_row, in_row) in layerwise.rows_mut().into_iter().zip(path.rows()) {
        for k in 0..num_heights {
            let neighbour = if integrate_upward {
                if k == 0 { 0.0 } else { in_row[k - 1] }
            } else if k + 1 == num_heights {
                0.0
            } else {
                in_row[k + 1]
            };
            out_row[k] = in_row[k] - neighbour;
        }
    }
    layerwise_path_to_content(layerwise.view(), widths)
}

/// Flux increments (W/m³): bottom-up differences divided by cell width
pub fn fluxes_to_increments(flux: ArrayView2<f64>, widths: ArrayView1<f64>) -> Array2<f64> {
    let mut increments = flux.to_owned();
    let num_heights = flux.ncols();

    for (mut out_row, in_row) in increments.rows_mut().into_iter().zip(flux.rows()) {
        for k in 0..num_heights {
            let below = if k == 0 { 0.0 } else { in_row[k - 1] };
            out_row[k] = (in_row[k] - below) / widths[k];
        }
    }
    increments
}

/// Inverse of `fluxes_to_increments`
pub fn increments_to_fluxes(increments: ArrayView2<f64>, widths: ArrayView1<f64>) -> Array2<f64> {
    content_to_path(increments, widths, true)
}

/// Shortwave heating rate (K/s) from flux profiles on a pressure grid
///
/// HR = -(g / cp) dF_net/dp with F_net = down - up. Backward differences from
/// the second height up; the lowest height copies its neighbour.
pub fn heating_rate_from_fluxes(
    down_flux: ArrayView2<f64>,
    up_flux: ArrayView2<f64>,
    pressure: ArrayView2<f64>,
    constants: &Constants,
) -> Array2<f64> {
    let net_flux = &down_flux - &up_flux;
    let num_heights = net_flux.ncols();
    let mut heating_rate = Array2::zeros(net_flux.raw_dim());
    let factor = -constants.g / constants.cp;

    for ((mut out_row, flux_row), p_row) in heating_rate
        .rows_mut()
        .into_iter()
        .zip(net_flux.rows())
        .zip(pressure.rows())
    {
        for k in 1..num_heights {
            let dp = p_row[k] - p_row[k - 1];
            out_row[k] = if dp == 0.0 {
                0.0
            } else {
                factor * (flux_row[k] - flux_row[k - 1]) / dp
            };
        }
        if num_heights > 1 {
            out_row[0] = out_row[1];
        }
    }
    heating_rate
}

/// Net-flux divergence with respect to pressure implied by a heating rate
pub fn heating_rate_to_flux_divergence(heating_rate: ArrayView2<f64>, constants: &Constants) -> Array2<f64> {
    heating_rate.mapv(|hr| -hr * constants.cp / constants.g)
}
