//! Grid geometry, height matching and calendar helpers for example data

use super::ExampleError;
use chrono::{DateTime, Datelike, Utc};
use ndarray::Array1;

/// Maximum distance (m) between a requested height and a grid height
pub const HEIGHT_MATCH_TOLERANCE_M: f64 = 0.5;

/// Edges of the grid cells centred on `heights_m_agl` (H + 1 values)
///
/// Interior edges sit halfway between neighbouring heights; the outer edges
/// extend half a cell beyond the first and last heights.
pub fn grid_cell_edges(heights_m_agl: &[f64]) -> Result<Array1<f64>, ExampleError> {
    let num_heights = heights_m_agl.len();
    if num_heights < 2 {
        return Err(ExampleError::InvalidArgument(format!(
            "need at least 2 heights to build grid cells, got {}",
            num_heights
        )));
    }

    let mut edges = Array1::zeros(num_heights + 1);
    for k in 1..num_heights {
        edges[k] = 0.5 * (heights_m_agl[k - 1] + heights_m_agl[k]);
    }
    edges[0] = heights_m_agl[0] - 0.5 * (heights_m_agl[1] - heights_m_agl[0]);
    edges[num_heights] = heights_m_agl[num_heights - 1]
        + 0.5 * (heights_m_agl[num_heights - 1] - heights_m_agl[num_heights - 2]);
    Ok(edges)
}

/// Widths (m) of the grid cells centred on `heights_m_agl`
pub fn grid_cell_widths(heights_m_agl: &[f64]) -> Result<Array1<f64>, ExampleError> {
    let edges = grid_cell_edges(heights_m_agl)?;
    Ok(&edges.slice(ndarray::s![1..]) - &edges.slice(ndarray::s![..-1]))
}

/// Index of the grid height nearest to `desired_height_m_agl`
pub fn match_heights(heights_m_agl: &[f64], desired_height_m_agl: f64) -> Result<usize, ExampleError> {
    let nearest = heights_m_agl
        .iter()
        .enumerate()
        .map(|(k, h)| (k, (h - desired_height_m_agl).abs()))
        .min_by(|a, b| a.1.total_cmp(&b.1));

    match nearest {
        Some((k, distance)) if distance <= HEIGHT_MATCH_TOLERANCE_M => Ok(k),
        _ => Err(ExampleError::NoMatchingHeight {
            height: desired_height_m_agl,
            tolerance: HEIGHT_MATCH_TOLERANCE_M,
        }),
    }
}

fn unix_sec_to_datetime(unix_sec: i64) -> Result<DateTime<Utc>, ExampleError> {
    DateTime::<Utc>::from_timestamp(unix_sec, 0).ok_or_else(|| {
        ExampleError::InvalidArgument(format!("time {} s is out of range", unix_sec))
    })
}

pub fn unix_sec_to_year(unix_sec: i64) -> Result<i32, ExampleError> {
    Ok(unix_sec_to_datetime(unix_sec)?.year())
}

/// Calendar month (1-12) of a Unix time
pub fn unix_sec_to_month(unix_sec: i64) -> Result<u32, ExampleError> {
    Ok(unix_sec_to_datetime(unix_sec)?.month())
}

/// Every calendar year touched by the window [first, last]
pub fn years_spanned(first_time_unix_sec: i64, last_time_unix_sec: i64) -> Result<Vec<i32>, ExampleError> {
    let first_year = unix_sec_to_year(first_time_unix_sec)?;
    let last_year = unix_sec_to_year(last_time_unix_sec)?;
    Ok((first_year..=last_year).collect())
}

/// Longitude in [0, 360) degrees east
pub fn longitude_to_0_360(longitude_deg_e: f64) -> f64 {
    let wrapped = longitude_deg_e.rem_euclid(360.0);
    // rem_euclid can round a tiny negative up to exactly 360
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_grid_cell_edges_and_widths() {
        let heights = [10.0, 20.0, 40.0];
        let edges = grid_cell_edges(&heights).unwrap();
        assert_eq!(edges.to_vec(), vec![5.0, 15.0, 30.0, 50.0]);

        let widths = grid_cell_widths(&heights).unwrap();
        assert_eq!(widths.to_vec(), vec![10.0, 15.0, 20.0]);
        assert_relative_eq!(widths.sum(), 45.0);
    }

    #[test]
    fn test_grid_needs_two_heights() {
        assert!(grid_cell_widths(&[100.0]).is_err());
    }

    #[test]
    fn test_match_heights_tolerance() {
        let heights = [100.0, 500.0];
        assert_eq!(match_heights(&heights, 100.4).unwrap(), 0);
        assert_eq!(match_heights(&heights, 499.6).unwrap(), 1);
        assert!(matches!(
            match_heights(&heights, 300.0),
            Err(ExampleError::NoMatchingHeight { .. })
        ));
    }

    #[test]
    fn test_calendar_helpers() {
        // 2020-03-01T00:00:00Z
        let t = 1_583_020_800;
        assert_eq!(unix_sec_to_year(t).unwrap(), 2020);
        assert_eq!(unix_sec_to_month(t).unwrap(), 3);
        assert_eq!(unix_sec_to_month(t - 1).unwrap(), 2);
        assert_eq!(years_spanned(0, t).unwrap().len(), 51);
    }

    #[test]
    fn test_longitude_conversion() {
        assert_eq!(longitude_to_0_360(-90.0), 270.0);
        assert_eq!(longitude_to_0_360(360.0), 0.0);
        assert_eq!(longitude_to_0_360(45.5), 45.5);
    }
}
