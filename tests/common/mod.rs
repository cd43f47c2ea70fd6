#![allow(dead_code)]

use ml4rt_rust::data_io::StandardAtmosphere;
use ml4rt_rust::{ExampleCollection, ExampleSchema, Field};
use ndarray::{array, Array2, Array3, ArrayBase, Data, Dimension};
use std::path::Path;

/// 2017-01-01T00:00:00Z
pub const JAN_2017_UNIX_SEC: i64 = 1_483_228_800;

/// Four examples on two heights, small enough to check tensors by hand
pub fn four_examples() -> ExampleCollection {
    let schema = ExampleSchema {
        scalar_predictor_names: vec![Field::ZenithAngle, Field::Latitude],
        vector_predictor_names: vec![Field::Temperature, Field::SpecificHumidity],
        scalar_target_names: vec![Field::SurfaceDownFlux],
        vector_target_names: vec![Field::DownFlux, Field::UpFlux],
        heights_m_agl: vec![100.0, 500.0],
    };

    let scalar_predictors = array![[0.0, 40.02], [1.0, 40.02], [2.0, 40.02], [3.0, 40.02]];

    let temperatures = array![[290.0, 295.0], [289.0, 294.0], [288.0, 293.0], [287.0, 292.5]];
    let humidities = array![[0.008, 0.009], [0.007, 0.008], [0.005, 0.006], [0.0075, 0.01]];
    let vector_predictors = Array3::from_shape_fn((4, 2, 2), |(i, h, c)| {
        if c == 0 {
            temperatures[[i, h]]
        } else {
            humidities[[i, h]]
        }
    });

    let scalar_targets = Array2::from_elem((4, 1), 200.0);

    let down_fluxes = array![[300.0, 200.0], [500.0, 300.0], [450.0, 450.0], [200.0, 100.0]];
    let up_fluxes = array![[150.0, 150.0], [200.0, 150.0], [300.0, 350.0], [400.0, 100.0]];
    let vector_targets = Array3::from_shape_fn((4, 2, 2), |(i, h, c)| {
        if c == 0 {
            down_fluxes[[i, h]]
        } else {
            up_fluxes[[i, h]]
        }
    });

    ExampleCollection::new(
        schema,
        scalar_predictors,
        vector_predictors,
        scalar_targets,
        vector_targets,
        vec![0, 300, 600, 1200],
        vec![
            StandardAtmosphere::Tropics,
            StandardAtmosphere::MidlatitudeSummer,
            StandardAtmosphere::MidlatitudeWinter,
            StandardAtmosphere::SubarcticSummer,
        ],
    )
    .unwrap()
}

/// Element-wise comparison of two arrays of the same shape
pub fn assert_arrays_close<S1, S2, D>(actual: &ArrayBase<S1, D>, expected: &ArrayBase<S2, D>, epsilon: f64)
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
    D: Dimension,
{
    assert_eq!(actual.shape(), expected.shape());
    for (a, e) in actual.iter().zip(expected.iter()) {
        assert!((a - e).abs() <= epsilon, "{} != {} (epsilon {})", a, e, epsilon);
    }
}

/// Contents of a synthetic yearly example file, in on-disk units
pub struct SyntheticFile {
    pub valid_times_unix_sec: Vec<i64>,
    pub heights_km: Vec<f64>,
    /// One per example (g/m²)
    pub column_lwp_g_m02: Vec<f64>,
    /// Example whose surface down flux is a fill value
    pub bad_example: Option<usize>,
    /// Example whose standard-atmosphere flag is a fill value
    pub bad_atmosphere_example: Option<usize>,
}

impl SyntheticFile {
    /// `num_examples` examples an hour apart starting at `first_time_unix_sec`
    pub fn new(first_time_unix_sec: i64, num_examples: usize) -> Self {
        Self {
            valid_times_unix_sec: (0..num_examples as i64)
                .map(|i| first_time_unix_sec + 3600 * i)
                .collect(),
            heights_km: vec![0.1, 0.5, 1.0],
            column_lwp_g_m02: (0..num_examples).map(|i| 10.0 * i as f64).collect(),
            bad_example: None,
            bad_atmosphere_example: None,
        }
    }

    pub fn num_examples(&self) -> usize {
        self.valid_times_unix_sec.len()
    }

    pub fn zenith_angle_deg(i: usize) -> f64 {
        10.0 + 5.0 * i as f64
    }

    pub fn longitude_deg_e(i: usize) -> f64 {
        -100.0 + i as f64
    }

    pub fn temperature_k(i: usize, height_km: f64) -> f64 {
        290.0 - 6.5 * height_km + 0.5 * i as f64
    }

    pub fn pressure_hpa(height_km: f64) -> f64 {
        1000.0 * (-height_km / 8.0).exp()
    }

    pub fn down_flux(i: usize, h: usize) -> f64 {
        600.0 - 20.0 * h as f64 + i as f64
    }

    pub fn up_flux(i: usize, h: usize) -> f64 {
        100.0 + 5.0 * h as f64 + i as f64
    }

    pub fn write(&self, path: &Path) {
        let num_examples = self.num_examples();
        let num_heights = self.heights_km.len();

        let mut file = netcdf::create(path).unwrap();
        file.add_dimension("example", num_examples).unwrap();
        file.add_dimension("height", num_heights).unwrap();

        let mut put_1d = |name: &str, dim: &str, values: Vec<f64>| {
            let mut var = file.add_variable::<f64>(name, &[dim]).unwrap();
            var.put_values(&values, ..).unwrap();
        };

        put_1d(
            "time",
            "example",
            self.valid_times_unix_sec.iter().map(|t| *t as f64).collect(),
        );
        put_1d("height", "height", self.heights_km.clone());
        put_1d(
            "stdatmos",
            "example",
            (0..num_examples)
                .map(|i| {
                    if Some(i) == self.bad_atmosphere_example {
                        9.97e36
                    } else {
                        (i % 6 + 1) as f64
                    }
                })
                .collect(),
        );

        let per_example = |f: &dyn Fn(usize) -> f64| (0..num_examples).map(f).collect::<Vec<f64>>();
        put_1d("sza", "example", per_example(&Self::zenith_angle_deg));
        put_1d("albedo", "example", per_example(&|i: usize| 0.1 + 0.01 * i as f64));
        put_1d("lat", "example", per_example(&|i: usize| 40.0 + 0.25 * i as f64));
        put_1d("lon", "example", per_example(&Self::longitude_deg_e));
        put_1d("lwp", "example", self.column_lwp_g_m02.clone());
        put_1d("iwp", "example", per_example(&|i: usize| 2.0 * i as f64));
        put_1d(
            "sfcflux",
            "example",
            per_example(&|i: usize| {
                if Some(i) == self.bad_example {
                    9.97e36
                } else {
                    500.0 + i as f64
                }
            }),
        );
        put_1d("toaflux", "example", per_example(&|i: usize| 100.0 + i as f64));

        let heights = self.heights_km.clone();
        let profile = |f: &dyn Fn(usize, usize) -> f64| {
            Array2::from_shape_fn((num_examples, num_heights), |(i, h)| f(i, h))
                .into_raw_vec()
        };
        let profiles = [
            ("p", profile(&|_: usize, h: usize| Self::pressure_hpa(heights[h]))),
            ("t", profile(&|i: usize, h: usize| Self::temperature_k(i, heights[h]))),
            ("q", profile(&|_: usize, h: usize| 8.0 * (-heights[h] / 2.0).exp() + 0.1)),
            ("lwc", profile(&|i: usize, _: usize| 0.01 * (i + 1) as f64)),
            ("iwc", profile(&|_: usize, h: usize| 0.005 * (h + 1) as f64)),
            ("fluxd", profile(&Self::down_flux)),
            ("fluxu", profile(&Self::up_flux)),
            ("hr", profile(&|_: usize, h: usize| 1e-5 * (h + 1) as f64)),
        ];
        for (name, values) in profiles {
            let mut var = file
                .add_variable::<f64>(name, &["example", "height"])
                .unwrap();
            var.put_values(&values, ..).unwrap();
        }
    }
}
