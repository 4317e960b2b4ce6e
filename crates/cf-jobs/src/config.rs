//! Pipeline and service configuration, read from the environment.

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{JobError, JobResult};

/// Source of configuration variables.
///
/// Implemented for the process environment by [`ProcessEnv`]; tests and
/// embedders can supply their own.
pub trait EnvSource {
    /// Value of `key`, if set.
    fn var(&self, key: &str) -> Option<String>;
}

/// Reads from `std::env`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl<K: AsRef<str>, V: AsRef<str>> EnvSource for [(K, V)] {
    fn var(&self, key: &str) -> Option<String> {
        self.iter()
            .find(|(k, _)| k.as_ref() == key)
            .map(|(_, v)| v.as_ref().to_string())
    }
}

fn parse_var<T: FromStr>(env: &(impl EnvSource + ?Sized), key: &str, default: T) -> JobResult<T>
where
    T::Err: std::fmt::Display,
{
    match env.var(key) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| JobError::config(format!("{key}={raw:?}: {e}"))),
    }
}

fn parse_flag(env: &(impl EnvSource + ?Sized), key: &str, default: bool) -> JobResult<bool> {
    match env.var(key).as_deref().map(str::trim) {
        None | Some("") => Ok(default),
        Some("1" | "true" | "TRUE" | "yes") => Ok(true),
        Some("0" | "false" | "FALSE" | "no") => Ok(false),
        Some(other) => Err(JobError::config(format!("{key}={other:?}: expected 0 or 1"))),
    }
}

/// Per-job reconstruction settings.
///
/// # Example
///
/// ```
/// use cf_jobs::PipelineConfig;
///
/// let config = PipelineConfig::default().with_octree_depth(7);
/// assert_eq!(config.octree_depth, 7);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Requested Poisson octree depth (`POISSON_DEPTH`). Default: 9.
    pub octree_depth: u32,
    /// Neighbors for outlier statistics (`OUTLIER_NEIGHBORS`). Default: 15.
    pub outlier_neighbors: usize,
    /// Standard deviation multiplier (`OUTLIER_STD_RATIO`). Default: 1.0.
    pub outlier_std_ratio: f64,
    /// Depth divisor for orthographic lifting (`ORTHO_SCALE_FACTOR`). Default: 255.
    pub ortho_scale_factor: f64,
    /// Longest image side before inference, 0 keeps the original
    /// (`INFERENCE_RESIZE`). Default: 0.
    pub inference_resize_limit: u32,
    /// Neighbors for PCA normals (`NORMAL_NEIGHBORS`). Default: 30.
    pub normal_neighbors: usize,
    /// Cap on the dense grid depth (`MAX_GRID_DEPTH`). Default: 7.
    pub max_grid_depth: u32,
    /// Prefix for result file names (`RESULT_PREFIX`). Default: empty.
    pub result_prefix: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            octree_depth: 9,
            outlier_neighbors: 15,
            outlier_std_ratio: 1.0,
            ortho_scale_factor: 255.0,
            inference_resize_limit: 0,
            normal_neighbors: 30,
            max_grid_depth: 7,
            result_prefix: String::new(),
        }
    }
}

impl PipelineConfig {
    /// Defaults overridden by any variables present in `env`.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Config`] if a variable does not parse.
    pub fn from_env(env: &(impl EnvSource + ?Sized)) -> JobResult<Self> {
        let d = Self::default();
        Ok(Self {
            octree_depth: parse_var(env, "POISSON_DEPTH", d.octree_depth)?,
            outlier_neighbors: parse_var(env, "OUTLIER_NEIGHBORS", d.outlier_neighbors)?,
            outlier_std_ratio: parse_var(env, "OUTLIER_STD_RATIO", d.outlier_std_ratio)?,
            ortho_scale_factor: parse_var(env, "ORTHO_SCALE_FACTOR", d.ortho_scale_factor)?,
            inference_resize_limit: parse_var(env, "INFERENCE_RESIZE", d.inference_resize_limit)?,
            normal_neighbors: parse_var(env, "NORMAL_NEIGHBORS", d.normal_neighbors)?,
            max_grid_depth: parse_var(env, "MAX_GRID_DEPTH", d.max_grid_depth)?,
            result_prefix: env.var("RESULT_PREFIX").unwrap_or(d.result_prefix),
        })
    }

    /// Sets the Poisson depth.
    #[must_use]
    pub const fn with_octree_depth(mut self, depth: u32) -> Self {
        self.octree_depth = depth;
        self
    }

    /// Sets the dense grid cap.
    #[must_use]
    pub const fn with_max_grid_depth(mut self, depth: u32) -> Self {
        self.max_grid_depth = depth;
        self
    }

    /// Sets the inference resize limit.
    #[must_use]
    pub const fn with_inference_resize_limit(mut self, limit: u32) -> Self {
        self.inference_resize_limit = limit;
        self
    }

    /// Sets the result file prefix.
    #[must_use]
    pub fn with_result_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.result_prefix = prefix.into();
        self
    }

    /// Check ranges.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Config`] naming the first bad setting.
    pub fn validate(&self) -> JobResult<()> {
        if !(1..=12).contains(&self.octree_depth) {
            return Err(JobError::config(format!(
                "POISSON_DEPTH must be in 1..=12, got {}",
                self.octree_depth
            )));
        }
        if !(1..=12).contains(&self.max_grid_depth) {
            return Err(JobError::config(format!(
                "MAX_GRID_DEPTH must be in 1..=12, got {}",
                self.max_grid_depth
            )));
        }
        if self.outlier_neighbors == 0 {
            return Err(JobError::config("OUTLIER_NEIGHBORS must be positive"));
        }
        if !(self.outlier_std_ratio.is_finite() && self.outlier_std_ratio >= 0.0) {
            return Err(JobError::config(format!(
                "OUTLIER_STD_RATIO must be non-negative, got {}",
                self.outlier_std_ratio
            )));
        }
        if !(self.ortho_scale_factor.is_finite() && self.ortho_scale_factor > 0.0) {
            return Err(JobError::config(format!(
                "ORTHO_SCALE_FACTOR must be positive, got {}",
                self.ortho_scale_factor
            )));
        }
        if self.normal_neighbors < 3 {
            return Err(JobError::config(format!(
                "NORMAL_NEIGHBORS must be at least 3, got {}",
                self.normal_neighbors
            )));
        }
        if self.result_prefix.contains(['/', '\\']) {
            return Err(JobError::config("RESULT_PREFIX must not contain path separators"));
        }
        Ok(())
    }
}

/// Where the service keeps its files and how it runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Saved uploads (`UPLOAD_DIR`). Default: `/data/uploads`.
    pub upload_dir: PathBuf,
    /// STL results (`RESULT_DIR`). Default: `/data/results`.
    pub result_dir: PathBuf,
    /// Status records (`STATUS_DIR`). Default: `{result_dir}/status`.
    pub status_dir: PathBuf,
    /// Worker threads (`WORKERS`). Default: 1.
    pub workers: usize,
    /// Depth model checkpoint (`DEPTH_CHECKPOINT`). Default: none.
    pub depth_checkpoint: Option<PathBuf>,
    /// Run inference on the GPU (`USE_GPU`). Default: true.
    pub use_gpu: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        let result_dir = PathBuf::from("/data/results");
        Self {
            upload_dir: PathBuf::from("/data/uploads"),
            status_dir: result_dir.join("status"),
            result_dir,
            workers: 1,
            depth_checkpoint: None,
            use_gpu: true,
        }
    }
}

impl ServiceConfig {
    /// Defaults overridden by any variables present in `env`.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Config`] if a variable does not parse.
    pub fn from_env(env: &(impl EnvSource + ?Sized)) -> JobResult<Self> {
        let d = Self::default();
        let path = |key: &str| env.var(key).filter(|v| !v.trim().is_empty()).map(PathBuf::from);

        let result_dir = path("RESULT_DIR").unwrap_or(d.result_dir);
        Ok(Self {
            upload_dir: path("UPLOAD_DIR").unwrap_or(d.upload_dir),
            status_dir: path("STATUS_DIR").unwrap_or_else(|| result_dir.join("status")),
            result_dir,
            workers: parse_var(env, "WORKERS", d.workers)?,
            depth_checkpoint: path("DEPTH_CHECKPOINT"),
            use_gpu: parse_flag(env, "USE_GPU", d.use_gpu)?,
        })
    }

    /// Check ranges.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Config`] naming the first bad setting.
    pub fn validate(&self) -> JobResult<()> {
        if self.workers == 0 {
            return Err(JobError::config("WORKERS must be positive"));
        }
        Ok(())
    }
}
