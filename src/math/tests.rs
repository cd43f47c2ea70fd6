use super::physics::*;
use crate::config::Constants;
use approx::assert_relative_eq;
use ndarray::array;

#[test]
fn test_mixing_ratio() {
    assert_relative_eq!(specific_humidity_to_mixing_ratio(0.01), 0.01 / 0.99);
    assert_eq!(specific_humidity_to_mixing_ratio(0.0), 0.0);
}

#[test]
fn test_air_density_near_standard() {
    let constants = Constants::default();
    let dry = air_density(0.0, 288.15, 101325.0, &constants);
    assert_relative_eq!(dry, 1.225, epsilon = 2e-3);

    // Moist air is lighter than dry air at the same pressure and temperature
    let moist = air_density(0.01, 288.15, 101325.0, &constants);
    assert!(moist < dry);
}

#[test]
fn test_relative_humidity_at_saturation() {
    let constants = Constants::default();
    let t = 293.15;
    let p = 100000.0;
    let ws = saturation_mixing_ratio(t, p, &constants);
    let q_sat = ws / (1.0 + ws);
    assert_relative_eq!(relative_humidity(q_sat, t, p, &constants), 1.0, epsilon = 1e-9);
    assert_relative_eq!(saturation_vapour_pressure(273.15, &constants), 611.2);
}

#[test]
fn test_path_integration_directions() {
    let content = array![[1.0, 2.0, 3.0]];
    let widths = array![10.0, 20.0, 30.0];

    let downward = content_to_path(content.view(), widths.view(), false);
    assert_eq!(downward, array![[140.0, 130.0, 90.0]]);

    let upward = content_to_path(content.view(), widths.view(), true);
    assert_eq!(upward, array![[10.0, 50.0, 140.0]]);
}

#[test]
fn test_path_integration_inverts() {
    let content = array![[0.001, 0.0, 0.004, 0.002], [0.0, 0.003, 0.001, 0.0]];
    let widths = array![50.0, 100.0, 150.0, 200.0];

    for upward in [false, true] {
        let path = content_to_path(content.view(), widths.view(), upward);
        let back = path_to_content(path.view(), widths.view(), upward);
        for (a, b) in back.iter().zip(content.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-12);
        }
    }
}

#[test]
fn test_flux_increments_invert() {
    let flux = array![[300.0, 200.0], [500.0, 300.0]];
    let widths = array![400.0, 400.0];

    let increments = fluxes_to_increments(flux.view(), widths.view());
    assert_relative_eq!(increments[[0, 0]], 0.75);
    assert_relative_eq!(increments[[0, 1]], -0.25);

    let back = increments_to_fluxes(increments.view(), widths.view());
    for (a, b) in back.iter().zip(flux.iter()) {
        assert_relative_eq!(*a, *b, epsilon = 1e-9);
    }
}

#[test]
fn test_heating_rate_sign() {
    let constants = Constants::default();
    // Net flux shrinks downward through the column, so the layer absorbs and warms
    let down = array![[700.0, 800.0, 900.0]];
    let up = array![[100.0, 100.0, 100.0]];
    let pressure = array![[100000.0, 90000.0, 80000.0]];

    let hr = heating_rate_from_fluxes(down.view(), up.view(), pressure.view(), &constants);
    assert!(hr[[0, 1]] > 0.0);
    assert_eq!(hr[[0, 0]], hr[[0, 1]]);

    let divergence = heating_rate_to_flux_divergence(hr.view(), &constants);
    // dF_net/dp = 100 W/m² over -100 hPa
    assert_relative_eq!(divergence[[0, 2]], -0.01, epsilon = 1e-12);
}
