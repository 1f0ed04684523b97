use serde::{Deserialize, Serialize};

use crate::prompt::chatml_prompt;

/// Sampling parameters forwarded to the inference runtime unmodified.
///
/// The pipeline never interprets these; they are an opaque record keyed to the
/// selected model profile.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SamplingConfig {
    pub temp: f32,
    pub dynatemp_range: f32,
    pub top_k: i32,
    pub top_p: f32,
    pub min_p: f32,
    pub typical_p: f32,
    pub penalty_repeat: f32,
    pub penalty_last_n: i32,
    pub mirostat: i32,
    pub mirostat_tau: f32,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            temp: 0.2,
            dynatemp_range: 0.15,
            top_k: 0,
            top_p: 1.0,
            min_p: 0.1,
            typical_p: 0.85,
            penalty_repeat: 1.176,
            penalty_last_n: -1,
            mirostat: 2,
            mirostat_tau: 3.5,
        }
    }
}

/// KV-cache quantization requested from the runtime.
#[allow(non_camel_case_types)]
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheType {
    #[serde(rename = "f16")]
    F16,
    #[serde(rename = "q8_0")]
    Q8_0,
    #[serde(rename = "q4_0")]
    Q4_0,
}

/// Coarse device capability class, read from application settings.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Mobile,
    #[default]
    Desktop,
}

/// Closed set of model profiles. Exactly one is selected per session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelProfile {
    /// Small instruct model for mobile devices and low-thread desktops.
    Mobile,
    /// Even smaller quantization, used when the mobile model fails to load.
    MobileFallback,
    /// Larger model for desktops with enough threads.
    Desktop,
}

/// Fixed bundle of model URL, context size, sampling defaults and prompt
/// template behavior for one profile.
pub struct ModelProfileSpec {
    pub url: &'static str,
    pub stop_strings: &'static [&'static str],
    pub cache_type: CacheType,
    pub context_size: u32,
    pub include_urls_in_prompt: bool,
    pub sampling: SamplingConfig,
    pub build_prompt: fn(query: &str, search_context: &str) -> String,
}

const MOBILE_MODEL_URL: &str =
    "https://huggingface.co/Felladrin/gguf-q5_k_m-imat-qwen2-0.5b-instruct/resolve/main/qwen2-0-00001-of-00003.gguf";
const MOBILE_FALLBACK_MODEL_URL: &str =
    "https://huggingface.co/Felladrin/gguf-sharded-Qwen1.5-0.5B-Chat_llamafy/resolve/main/Qwen1.5-0.5B-Chat_llamafy.IQ3_XXS.shard-00001-of-00003.gguf";
const DESKTOP_MODEL_URL: &str =
    "https://huggingface.co/Felladrin/gguf-q5_k_l-imat-arcee-lite/resolve/main/arcee-lite-Q5_K_L.shard-00001-of-00006.gguf";

impl ModelProfile {
    pub fn spec(self) -> ModelProfileSpec {
        match self {
            Self::Mobile => ModelProfileSpec {
                url: MOBILE_MODEL_URL,
                stop_strings: &[],
                cache_type: CacheType::F16,
                context_size: 2048,
                include_urls_in_prompt: false,
                sampling: SamplingConfig::default(),
                build_prompt: chatml_prompt,
            },
            Self::MobileFallback => ModelProfileSpec {
                url: MOBILE_FALLBACK_MODEL_URL,
                stop_strings: &[],
                cache_type: CacheType::F16,
                context_size: 1280,
                include_urls_in_prompt: false,
                sampling: SamplingConfig::default(),
                build_prompt: chatml_prompt,
            },
            Self::Desktop => ModelProfileSpec {
                url: DESKTOP_MODEL_URL,
                stop_strings: &[],
                cache_type: CacheType::F16,
                context_size: 2048,
                include_urls_in_prompt: false,
                sampling: SamplingConfig::default(),
                build_prompt: chatml_prompt,
            },
        }
    }
}

/// Maps device capability to a model profile.
///
/// Desktops with fewer than four threads get the small model; the choice is
/// made once per session and cached by the model manager.
pub fn resolve_profile(device_class: DeviceClass, threads: usize) -> ModelProfile {
    match device_class {
        DeviceClass::Mobile => ModelProfile::Mobile,
        DeviceClass::Desktop => {
            if threads < 4 {
                ModelProfile::Mobile
            } else {
                ModelProfile::Desktop
            }
        }
    }
}

/// Read-only application settings consumed by the pipeline.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Config {
    /// When set, queries only run the web search; no AI response is produced.
    #[serde(default)]
    pub disable_ai_response: bool,
    /// When set, a failed search fails the whole pipeline instead of
    /// generating from the query alone.
    #[serde(default)]
    pub require_search_context: bool,
    #[serde(default = "default_threads")]
    pub number_of_threads: usize,
    #[serde(default)]
    pub device_class: DeviceClass,
    #[serde(default = "default_search_endpoint")]
    pub search_endpoint: String,
    /// Bounded retries for a failed model load before giving up.
    #[serde(default = "default_load_attempts")]
    pub load_max_attempts: u32,
}

fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn default_search_endpoint() -> String {
    "http://127.0.0.1:8080/search".to_string()
}

fn default_load_attempts() -> u32 {
    3
}

impl Default for Config {
    fn default() -> Self {
        Self {
            disable_ai_response: false,
            require_search_context: false,
            number_of_threads: default_threads(),
            device_class: DeviceClass::default(),
            search_endpoint: default_search_endpoint(),
            load_max_attempts: default_load_attempts(),
        }
    }
}
