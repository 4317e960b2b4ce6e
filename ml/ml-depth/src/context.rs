//! Process-wide, lazily loaded model handle.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::backend::BackendType;
use crate::error::{ModelError, Result};
use crate::estimator::{DepthEstimator, LuminanceDepthModel};

type Loader = Box<dyn Fn() -> Result<Arc<dyn DepthEstimator>> + Send + Sync>;

/// Holds at most one loaded depth model and loads it on first use.
///
/// Share one context across workers with `Arc`. Concurrent first calls to
/// [`get_or_load`](Self::get_or_load) run the loader once; a failed load
/// leaves the context empty so the next call retries.
///
/// # Example
///
/// ```
/// use ml_depth::{BackendType, InferenceContext};
///
/// let ctx = InferenceContext::from_config(None, BackendType::Cpu);
/// assert!(!ctx.is_loaded());
///
/// let model = ctx.get_or_load().unwrap();
/// assert_eq!(model.name(), "luminance");
/// assert_eq!(ctx.load_count(), 1);
/// ```
pub struct InferenceContext {
    loader: Loader,
    model: Mutex<Option<Arc<dyn DepthEstimator>>>,
    loads: AtomicUsize,
}

impl InferenceContext {
    /// Context that calls `loader` on first use.
    pub fn new<F>(loader: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn DepthEstimator>> + Send + Sync + 'static,
    {
        Self {
            loader: Box::new(loader),
            model: Mutex::new(None),
            loads: AtomicUsize::new(0),
        }
    }

    /// Context for the built-in luminance model.
    #[must_use]
    pub fn from_config(checkpoint: Option<PathBuf>, backend: BackendType) -> Self {
        Self::new(move || {
            let model = LuminanceDepthModel::load(checkpoint.as_deref(), backend)?;
            Ok(Arc::new(model) as Arc<dyn DepthEstimator>)
        })
    }

    /// Context that is already loaded with `model`.
    ///
    /// The load counter starts at zero and never moves.
    #[must_use]
    pub fn with_model(model: Arc<dyn DepthEstimator>) -> Self {
        let preloaded = Arc::clone(&model);
        Self {
            loader: Box::new(move || Ok(Arc::clone(&preloaded))),
            model: Mutex::new(Some(model)),
            loads: AtomicUsize::new(0),
        }
    }

    /// Returns the loaded model, loading it first if needed.
    ///
    /// # Errors
    ///
    /// Returns the loader's error, or [`ModelError::Poisoned`] if another
    /// thread panicked while loading.
    pub fn get_or_load(&self) -> Result<Arc<dyn DepthEstimator>> {
        let mut slot = self.model.lock().map_err(|_| ModelError::Poisoned)?;
        if let Some(model) = slot.as_ref() {
            debug!(model = model.name(), "Reusing loaded depth model");
            return Ok(Arc::clone(model));
        }

        let model = (self.loader)()?;
        let loads = self.loads.fetch_add(1, Ordering::SeqCst) + 1;
        info!(model = model.name(), loads, "Depth model loaded");
        *slot = Some(Arc::clone(&model));
        Ok(model)
    }

    /// Whether a model is currently held.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.model.lock().is_ok_and(|slot| slot.is_some())
    }

    /// How many times the loader has succeeded.
    #[must_use]
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for InferenceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InferenceContext")
            .field("loaded", &self.is_loaded())
            .field("loads", &self.load_count())
            .finish_non_exhaustive()
    }
}
