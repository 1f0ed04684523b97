use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

use log::{error, info, warn};
use tokio::sync::Mutex;

use crate::config::{Config, DeviceClass, ModelProfile};
use crate::error::PipelineError;
use crate::runtime::{InferenceRuntime, LoadConfig, ProgressFn};
use crate::state::AppChannels;

/// Pluggable capability-to-profile resolution, decided once per session.
pub type ProfileResolver = Box<dyn Fn(DeviceClass, usize) -> ModelProfile + Send + Sync>;

/// Owns the singleton model instance for the process lifetime.
///
/// Only this stage loads or unloads the model; the generation stage submits
/// inference requests against whatever is loaded.
pub struct ModelManager {
    runtime: Arc<dyn InferenceRuntime>,
    channels: Arc<AppChannels>,
    config: Config,
    resolver: ProfileResolver,
    profile: OnceLock<ModelProfile>,
    loaded: Mutex<Option<ModelProfile>>,
}

impl ModelManager {
    pub fn new(
        runtime: Arc<dyn InferenceRuntime>,
        channels: Arc<AppChannels>,
        config: Config,
    ) -> Self {
        Self::with_resolver(
            runtime,
            channels,
            config,
            Box::new(crate::config::resolve_profile),
        )
    }

    pub fn with_resolver(
        runtime: Arc<dyn InferenceRuntime>,
        channels: Arc<AppChannels>,
        config: Config,
        resolver: ProfileResolver,
    ) -> Self {
        Self {
            runtime,
            channels,
            config,
            resolver,
            profile: OnceLock::new(),
            loaded: Mutex::new(None),
        }
    }

    pub async fn is_loaded(&self) -> bool {
        self.loaded.lock().await.is_some()
    }

    pub async fn loaded_profile(&self) -> Option<ModelProfile> {
        *self.loaded.lock().await
    }

    /// The profile chosen for this session, resolving it on first use.
    pub fn session_profile(&self) -> ModelProfile {
        *self
            .profile
            .get_or_init(|| (self.resolver)(self.config.device_class, self.config.number_of_threads))
    }

    /// Loads the model if it is not loaded yet.
    ///
    /// Idempotent: a second call with the model loaded returns immediately
    /// with no progress events. The internal lock is held across the load, so
    /// overlapping calls await the same in-flight download instead of
    /// starting a second one. A failed attempt is retried a bounded number of
    /// times; the mobile profile additionally falls back to its smaller
    /// quantization before giving up.
    pub async fn ensure_loaded(&self) -> Result<ModelProfile, PipelineError> {
        let mut loaded = self.loaded.lock().await;
        if let Some(profile) = *loaded {
            return Ok(profile);
        }

        let profile = self.session_profile();
        let mut last_error = None;
        for attempt in 1..=self.config.load_max_attempts.max(1) {
            match self.load_profile(profile).await {
                Ok(()) => {
                    info!("Model loaded ({:?}) on attempt {}", profile, attempt);
                    *loaded = Some(profile);
                    return Ok(profile);
                }
                Err(e) => {
                    warn!("Model load attempt {} failed: {}", attempt, e);
                    last_error = Some(e);
                }
            }
        }

        if profile == ModelProfile::Mobile {
            info!("Falling back to the smaller mobile model");
            if self.load_profile(ModelProfile::MobileFallback).await.is_ok() {
                *loaded = Some(ModelProfile::MobileFallback);
                return Ok(ModelProfile::MobileFallback);
            }
        }

        let e = last_error
            .unwrap_or_else(|| PipelineError::ModelLoadFailure("no load attempt made".into()));
        error!("Model load gave up: {}", e);
        Err(e)
    }

    async fn load_profile(&self, profile: ModelProfile) -> Result<(), PipelineError> {
        let spec = profile.spec();
        let load_config = LoadConfig {
            context_size: spec.context_size,
            cache_type: spec.cache_type,
            n_threads: self.config.number_of_threads,
        };

        // Progress is clamped monotone within one attempt; a failed load
        // leaves the channel frozen at the last reported value.
        let channels = self.channels.clone();
        let last = Arc::new(AtomicU8::new(0));
        let on_progress: ProgressFn = Box::new(move |pct| {
            let pct = pct.min(100);
            if pct >= last.load(Ordering::Relaxed) {
                last.store(pct, Ordering::Relaxed);
                channels.model_loading_progress.set(pct);
            }
        });

        self.runtime.load(spec.url, load_config, on_progress).await?;
        if self.channels.model_loading_progress.get() < 100 {
            self.channels.model_loading_progress.set(100);
        }
        Ok(())
    }

    /// Drops the loaded model. Not part of the per-query flow; exposed for
    /// the host to free memory on teardown.
    pub async fn unload(&self) -> Result<(), PipelineError> {
        let mut loaded = self.loaded.lock().await;
        if loaded.take().is_some() {
            self.runtime.unload().await?;
            self.channels.model_loading_progress.set(0);
        }
        Ok(())
    }
}
