pub mod config;
pub mod data_io;
pub mod evaluation;
pub mod generator;
pub mod layout;
pub mod math;
pub mod neural_net;
pub mod transforms;

pub use config::{GeneratorConfig, LossFunction, NetType, NormalizationPolicy};
pub use data_io::{ExampleCollection, ExampleError, ExampleSchema, Field, ReaderError};
pub use generator::{Batch, DataGenerator, GeneratorError, GeneratorMode, SpecificExampleGenerator};
pub use layout::{PredictorMatrix, TargetMatrices};
