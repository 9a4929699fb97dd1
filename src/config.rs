//! Runtime configuration: directory roots and stage policy for the
//! orchestrator, endpoints and tool locations for the collaborators.

use std::path::PathBuf;

use crate::deadline::StagePolicy;

pub const DEFAULT_LLM_BASE_URL: &str = "https://api-inference.modelscope.cn/v1";
pub const DEFAULT_LLM_MODEL: &str = "qwen-plus";
pub const DEFAULT_ASR_MODEL: &str = "large-v3";
pub const DEFAULT_SEPARATOR_BIN: &str = "audio-separator";
pub const DEFAULT_SEPARATOR_MODEL: &str = "UVR_MDXNET_Main.onnx";
pub const DEFAULT_SEPARATOR_MODEL_DIR: &str = "models";
pub const DEFAULT_TARGET_LANGUAGE: &str = "English";
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.7;

/// What one pipeline run needs to know besides the input file.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub input_root: PathBuf,
    pub output_root: PathBuf,
    pub temp_root: PathBuf,
    pub resume: bool,
    pub target_language: String,
    pub policy: StagePolicy,
    pub song_story: bool,
    /// Explain the lyrics before translating; the explanation becomes
    /// translation context.
    pub explain: bool,
    /// Identification is used only above this confidence.
    pub min_confidence: f64,
}

impl PipelineConfig {
    pub fn new(
        input_root: impl Into<PathBuf>,
        output_root: impl Into<PathBuf>,
        temp_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            input_root: input_root.into(),
            output_root: output_root.into(),
            temp_root: temp_root.into(),
            resume: false,
            target_language: DEFAULT_TARGET_LANGUAGE.to_string(),
            policy: StagePolicy::default(),
            song_story: false,
            explain: false,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
        }
    }
}

/// An OpenAI-compatible HTTP service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

impl Endpoint {
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceConfig {
    pub llm: Endpoint,
    pub translation: Endpoint,
    pub asr: Endpoint,
    pub separator_bin: String,
    pub separator_model: String,
    pub separator_model_dir: PathBuf,
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// `TRANSLATION_*` and `ASR_*` fall back to `OPENAI_*` key by key.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| get(key).filter(|v| !v.trim().is_empty());
        let or = |key: &str, fallback: &str| var(key).unwrap_or_else(|| fallback.to_string());

        let llm = Endpoint {
            base_url: or("OPENAI_BASE_URL", DEFAULT_LLM_BASE_URL),
            api_key: or("OPENAI_API_KEY", ""),
            model: or("OPENAI_MODEL", DEFAULT_LLM_MODEL),
        };
        let translation = Endpoint {
            base_url: or("TRANSLATION_BASE_URL", &llm.base_url),
            api_key: or("TRANSLATION_API_KEY", &llm.api_key),
            model: or("TRANSLATION_MODEL", &llm.model),
        };
        let asr = Endpoint {
            base_url: or("ASR_BASE_URL", &llm.base_url),
            api_key: or("ASR_API_KEY", &llm.api_key),
            model: or("ASR_MODEL", DEFAULT_ASR_MODEL),
        };

        Self {
            separator_bin: or("SEPARATOR_BIN", DEFAULT_SEPARATOR_BIN),
            separator_model: or("SEPARATOR_MODEL", DEFAULT_SEPARATOR_MODEL),
            separator_model_dir: PathBuf::from(or("SEPARATOR_MODEL_DIR", DEFAULT_SEPARATOR_MODEL_DIR)),
            llm,
            translation,
            asr,
        }
    }
}
