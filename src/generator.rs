//! Batch generators feeding a neural network from yearly example files.

use crate::config::{ConfigError, GeneratorConfig, LossFunction, NetType};
use crate::data_io::utils::unix_sec_to_year;
use crate::data_io::{
    file_name_to_year, find_many_files, read_file, ExampleCollection, ExampleError, Field,
    ReaderError,
};
use crate::layout::{predictors_to_tensor, targets_to_tensors, PredictorMatrix, TargetMatrices};
use crate::transforms::{
    concat_examples, create_example_ids, find_examples, normalize_data, parse_example_ids,
    reduce_sample_size, subset_by_column_lwp, subset_by_field, subset_by_height, subset_by_index,
    subset_by_time, ApplyTo, NormalizationStats,
};
use rand::rngs::StdRng;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum GeneratorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Reader(#[from] ReaderError),

    #[error(transparent)]
    Example(#[from] ExampleError),

    #[error("No usable examples in {num_files} files after {passes} full passes")]
    NoExamplesFound { passes: usize, num_files: usize },
}

/// Training draws random examples forever; inference reads every example once
#[derive(Debug)]
pub enum GeneratorMode {
    Training { rng: StdRng },
    Inference,
}

impl GeneratorMode {
    pub fn is_inference(&self) -> bool {
        matches!(self, GeneratorMode::Inference)
    }
}

/// One batch in the tensor layout of the network
#[derive(Clone, Debug)]
pub struct Batch {
    pub predictors: PredictorMatrix<f32>,
    pub targets: TargetMatrices<f32>,
    /// Present for inference and specific-example batches
    pub example_id_strings: Option<Vec<String>>,
}

impl Batch {
    pub fn num_examples(&self) -> usize {
        self.predictors.num_examples()
    }
}

/// Where a `DataGenerator` is in its cycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GeneratorState {
    /// About to read from the file under the cursor
    ReadingNewFile,
    /// A chunk was read and the batch still has room
    Accumulating,
    /// Enough examples (or the last of them) are in memory
    BatchReady,
    EndOfData,
}

/// Settings and reference statistics shared by both generators
struct ExamplePipeline {
    config: GeneratorConfig,
    net_type: NetType,
    loss: LossFunction,
    stats: NormalizationStats,
    field_names: Vec<Field>,
}

impl ExamplePipeline {
    fn new(
        config: GeneratorConfig,
        net_type: NetType,
        loss: LossFunction,
        for_inference: bool,
    ) -> Result<Self, GeneratorError> {
        config.validate(for_inference)?;

        info!(
            "Reading training examples (for normalization) from {}",
            config.normalization_file.display()
        );
        let stats = NormalizationStats::from_file(&config.normalization_file)?;
        let field_names = config.all_field_names();

        Ok(Self {
            config,
            net_type,
            loss,
            stats,
            field_names,
        })
    }

    /// Keep the requested fields and heights, then normalize predictors and targets
    fn finish(&self, example: &ExampleCollection) -> Result<ExampleCollection, ExampleError> {
        let mut example = subset_by_field(example, &self.field_names)?;
        if let Some(heights) = &self.config.heights_m_agl {
            example = subset_by_height(&example, heights)?;
        }

        let predictor_policy = &self.config.predictor_normalization;
        if let Some(norm_type) = predictor_policy.norm_type {
            debug!("Applying {} normalization to predictors", norm_type);
            example = normalize_data(&example, &self.stats, predictor_policy, true, ApplyTo::Predictors)?;
        }

        let target_policy = &self.config.target_normalization;
        if let Some(norm_type) = target_policy.norm_type {
            debug!("Applying {} normalization to targets", norm_type);
            example = normalize_data(&example, &self.stats, target_policy, true, ApplyTo::Targets)?;
        }
        Ok(example)
    }

    fn assemble(&self, chunks: &[ExampleCollection], keep_ids: bool) -> Result<Batch, GeneratorError> {
        let examples = concat_examples(chunks)?;
        let predictors = predictors_to_tensor(&examples, self.net_type).to_f32();
        let targets = targets_to_tensors(&examples, self.net_type, &self.loss)?.to_f32();
        debug!(
            "Assembled {} batch of {} examples from {} chunks",
            self.net_type,
            examples.num_examples(),
            chunks.len()
        );

        Ok(Batch {
            predictors,
            targets,
            example_id_strings: if keep_ids { examples.example_id_strings } else { None },
        })
    }
}

/// Streams batches from the example files spanned by the configured time window
///
/// Training mode never ends on its own: files are visited in order and the
/// cursor wraps back to the first file. A run of `max_empty_passes` passes
/// that yield nothing produces `NoExamplesFound` and ends the stream.
/// Inference mode reads each example once and may end with a partial batch.
pub struct DataGenerator {
    pipeline: ExamplePipeline,
    mode: GeneratorMode,
    file_names: Vec<PathBuf>,
    file_index: usize,
    /// Next example to read within the current file (inference only)
    example_index: usize,
    state: GeneratorState,
    chunks: Vec<ExampleCollection>,
    num_in_memory: usize,
    examples_this_pass: usize,
    empty_passes: usize,
}

impl DataGenerator {
    pub fn new(
        config: GeneratorConfig,
        net_type: NetType,
        loss: LossFunction,
        mode: GeneratorMode,
    ) -> Result<Self, GeneratorError> {
        let pipeline = ExamplePipeline::new(config, net_type, loss, mode.is_inference())?;
        let file_names = find_many_files(
            &pipeline.config.example_dir,
            pipeline.config.first_time_unix_sec,
            pipeline.config.last_time_unix_sec,
            false,
            true,
        )?;
        info!(
            "Generator over {} example files ({})",
            file_names.len(),
            if mode.is_inference() { "inference" } else { "training" }
        );

        Ok(Self {
            pipeline,
            mode,
            file_names,
            file_index: 0,
            example_index: 0,
            state: GeneratorState::ReadingNewFile,
            chunks: Vec::new(),
            num_in_memory: 0,
            examples_this_pass: 0,
            empty_passes: 0,
        })
    }

    pub fn state(&self) -> GeneratorState {
        self.state
    }

    pub fn file_names(&self) -> &[PathBuf] {
        &self.file_names
    }

    /// Read up to `num_to_keep` examples from one file
    ///
    /// Returns the processed examples and the in-file index of the last one.
    fn read_chunk(
        &mut self,
        path: &Path,
        num_to_keep: usize,
    ) -> Result<(ExampleCollection, Option<usize>), GeneratorError> {
        info!("Reading data from {}", path.display());
        let all_examples = read_file(path, true)?;
        let num_examples = all_examples.num_examples();

        let (example, mut file_indices) = match &mut self.mode {
            GeneratorMode::Training { rng } => reduce_sample_size(&all_examples, num_examples, None, rng),
            GeneratorMode::Inference => {
                let first = self.example_index.min(num_examples);
                let indices: Vec<usize> = (first..num_examples).collect();
                subset_by_index(&all_examples, &indices)?
            }
        };

        let config = &self.pipeline.config;
        let (example, kept) = subset_by_time(&example, config.first_time_unix_sec, config.last_time_unix_sec)?;
        file_indices = kept.iter().map(|&k| file_indices[k]).collect();

        let (example, kept) =
            subset_by_column_lwp(&example, config.min_column_lwp_kg_m02, config.max_column_lwp_kg_m02)?;
        file_indices = kept.iter().map(|&k| file_indices[k]).collect();

        let num_kept = num_to_keep.min(example.num_examples());
        let first_rows: Vec<usize> = (0..num_kept).collect();
        let (mut example, _) = subset_by_index(&example, &first_rows)?;
        file_indices.truncate(num_kept);

        if self.mode.is_inference() && example.example_id_strings.is_none() {
            example.example_id_strings = Some(create_example_ids(&example)?);
        }

        let example = self.pipeline.finish(&example)?;
        Ok((example, file_indices.last().copied()))
    }

    /// Handle the cursor reaching the end of the file list
    ///
    /// Returns false when the generator should stop reading.
    fn wrap_around(&mut self) -> Result<bool, GeneratorError> {
        if self.mode.is_inference() {
            return Ok(false);
        }

        if self.examples_this_pass == 0 {
            self.empty_passes += 1;
            warn!(
                "Full pass over {} files produced no examples ({} of {})",
                self.file_names.len(),
                self.empty_passes,
                self.pipeline.config.max_empty_passes
            );
            if self.empty_passes >= self.pipeline.config.max_empty_passes {
                return Err(GeneratorError::NoExamplesFound {
                    passes: self.empty_passes,
                    num_files: self.file_names.len(),
                });
            }
        } else {
            self.empty_passes = 0;
        }
        self.examples_this_pass = 0;
        self.file_index = 0;
        Ok(true)
    }

    fn accumulate(&mut self) -> Result<(), GeneratorError> {
        let num_needed = self.pipeline.config.batch_size - self.num_in_memory;
        let path = self.file_names[self.file_index].clone();
        let (chunk, last_index) = self.read_chunk(&path, num_needed)?;
        let num_read = chunk.num_examples();

        if self.mode.is_inference() {
            match last_index {
                Some(last) if num_read > 0 => self.example_index = last + 1,
                _ => {
                    self.file_index += 1;
                    self.example_index = 0;
                }
            }
        } else {
            self.file_index += 1;
        }

        if num_read > 0 {
            self.num_in_memory += num_read;
            self.examples_this_pass += num_read;
            self.chunks.push(chunk);
        }
        Ok(())
    }

    fn take_batch(&mut self) -> Result<Batch, GeneratorError> {
        let chunks = std::mem::take(&mut self.chunks);
        self.num_in_memory = 0;
        self.pipeline.assemble(&chunks, self.mode.is_inference())
    }

    fn step(&mut self) -> Result<Option<Batch>, GeneratorError> {
        loop {
            match self.state {
                GeneratorState::EndOfData => return Ok(None),
                GeneratorState::ReadingNewFile => {
                    if self.file_index >= self.file_names.len() && !self.wrap_around()? {
                        self.state = if self.chunks.is_empty() {
                            GeneratorState::EndOfData
                        } else {
                            GeneratorState::BatchReady
                        };
                        continue;
                    }
                    self.state = GeneratorState::Accumulating;
                }
                GeneratorState::Accumulating => {
                    self.accumulate()?;
                    self.state = if self.num_in_memory >= self.pipeline.config.batch_size {
                        GeneratorState::BatchReady
                    } else {
                        GeneratorState::ReadingNewFile
                    };
                }
                GeneratorState::BatchReady => {
                    let batch = self.take_batch()?;
                    self.state = GeneratorState::ReadingNewFile;
                    return Ok(Some(batch));
                }
            }
        }
    }
}

impl Iterator for DataGenerator {
    type Item = Result<Batch, GeneratorError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.step() {
            Ok(Some(batch)) => Some(Ok(batch)),
            Ok(None) => None,
            Err(e) => {
                self.state = GeneratorState::EndOfData;
                Some(Err(e))
            }
        }
    }
}

/// Streams batches holding exactly the requested examples
///
/// Always runs in inference mode with the unconstrained target layout. Batches
/// carry the IDs in the order their examples appear.
pub struct SpecificExampleGenerator {
    pipeline: ExamplePipeline,
    example_id_strings: Vec<String>,
    example_years: Vec<i32>,
    done: Vec<bool>,
    file_names: Vec<PathBuf>,
    file_index: usize,
    finished: bool,
}

impl SpecificExampleGenerator {
    pub fn new(
        config: GeneratorConfig,
        net_type: NetType,
        example_id_strings: Vec<String>,
    ) -> Result<Self, GeneratorError> {
        let metadata = parse_example_ids(&example_id_strings)?;
        let times: Vec<i64> = metadata.iter().map(|m| m.valid_time_unix_sec).collect();
        let example_years = times
            .iter()
            .map(|&t| unix_sec_to_year(t))
            .collect::<Result<Vec<_>, _>>()?;

        let pipeline = ExamplePipeline::new(config, net_type, LossFunction::Mse, true)?;
        let file_names = match (times.iter().min(), times.iter().max()) {
            (Some(&first), Some(&last)) => {
                find_many_files(&pipeline.config.example_dir, first, last, false, true)?
            }
            _ => Vec::new(),
        };

        Ok(Self {
            pipeline,
            done: vec![false; example_id_strings.len()],
            example_id_strings,
            example_years,
            file_names,
            file_index: 0,
            finished: false,
        })
    }

    fn read_specific(&self, path: &Path, wanted: &[usize]) -> Result<ExampleCollection, GeneratorError> {
        info!("Reading {} specific examples from {}", wanted.len(), path.display());
        let all_examples = read_file(path, true)?;
        let all_ids = match &all_examples.example_id_strings {
            Some(ids) => ids.clone(),
            None => create_example_ids(&all_examples)?,
        };

        let desired: Vec<&str> = wanted.iter().map(|&k| self.example_id_strings[k].as_str()).collect();
        let indices: Vec<usize> = find_examples(&all_ids, &desired, false)?
            .into_iter()
            .flatten()
            .collect();
        let (mut example, _) = subset_by_index(&all_examples, &indices)?;
        example.example_id_strings = Some(indices.iter().map(|&i| all_ids[i].clone()).collect());
        Ok(self.pipeline.finish(&example)?)
    }

    fn step(&mut self) -> Result<Option<Batch>, GeneratorError> {
        if self.finished || self.done.iter().all(|d| *d) {
            return Ok(None);
        }

        let batch_size = self.pipeline.config.batch_size;
        let mut chunks = Vec::new();
        let mut num_in_memory = 0;

        while num_in_memory < batch_size {
            if self.file_index >= self.file_names.len() {
                if chunks.is_empty() {
                    let num_left = self.done.iter().filter(|d| !**d).count();
                    if num_left > 0 {
                        warn!("{} requested examples have no example file", num_left);
                    }
                    self.finished = true;
                    return Ok(None);
                }
                break;
            }

            let path = self.file_names[self.file_index].clone();
            let file_year = file_name_to_year(&path)?;
            let wanted: Vec<usize> = (0..self.example_id_strings.len())
                .filter(|&k| !self.done[k] && self.example_years[k] == file_year)
                .take(batch_size - num_in_memory)
                .collect();

            if wanted.is_empty() {
                self.file_index += 1;
                continue;
            }
            for &k in &wanted {
                self.done[k] = true;
            }

            let chunk = self.read_specific(&path, &wanted)?;
            num_in_memory += chunk.num_examples();
            chunks.push(chunk);
        }

        self.pipeline.assemble(&chunks, true).map(Some)
    }
}

impl Iterator for SpecificExampleGenerator {
    type Item = Result<Batch, GeneratorError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.step() {
            Ok(Some(batch)) => Some(Ok(batch)),
            Ok(None) => None,
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}
