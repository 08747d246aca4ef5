use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Default ensemble weights. Tactic carries the largest share; the three
/// must sum to 1.
pub const DOMAIN_WEIGHT: f64 = 0.3;
pub const TACTIC_WEIGHT: f64 = 0.4;
pub const MODEL_WEIGHT: f64 = 0.3;

/// A blended confidence at or above this is flagged suspicious.
pub const SUSPICION_THRESHOLD: f64 = 0.5;

/// Confidence floor applied when any domain is blocklisted.
pub const BLOCKLIST_CONFIDENCE_FLOOR: f64 = 0.9;

pub const TYPOSQUAT_MAX_DISTANCE: usize = 2;
pub const TYPOSQUAT_MIN_LEN: usize = 6;

const DEFAULT_LLM_TIMEOUT_SECS: u64 = 10;

/// Relative weight of each signal in the confidence blend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EnsembleWeights {
    #[serde(default = "default_domain_weight")]
    pub domain: f64,
    #[serde(default = "default_tactic_weight")]
    pub tactic: f64,
    #[serde(default = "default_model_weight")]
    pub model: f64,
}

impl Default for EnsembleWeights {
    fn default() -> Self {
        Self {
            domain: DOMAIN_WEIGHT,
            tactic: TACTIC_WEIGHT,
            model: MODEL_WEIGHT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_enabled")]
    pub enabled: bool,
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: default_llm_enabled(),
            endpoint: default_llm_endpoint(),
            model: default_llm_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub weights: EnsembleWeights,
    #[serde(default = "default_suspicion_threshold")]
    pub suspicion_threshold: f64,
    #[serde(default = "default_typosquat_max_distance")]
    pub typosquat_max_distance: usize,
    #[serde(default = "default_typosquat_min_len")]
    pub typosquat_min_len: usize,
    /// Optional path to a knowledge base YAML file; builtin table when unset.
    #[serde(default)]
    pub knowledge_base: Option<String>,
    #[serde(default)]
    pub llm: LlmConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            weights: EnsembleWeights::default(),
            suspicion_threshold: SUSPICION_THRESHOLD,
            typosquat_max_distance: TYPOSQUAT_MAX_DISTANCE,
            typosquat_min_len: TYPOSQUAT_MIN_LEN,
            knowledge_base: None,
            llm: LlmConfig::default(),
        }
    }
}

impl Config {
    pub fn load_from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let sum = self.weights.domain + self.weights.tactic + self.weights.model;
        if (sum - 1.0).abs() > 1e-6 {
            anyhow::bail!("ensemble weights must sum to 1.0, got {sum}");
        }
        if self.weights.domain < 0.0 || self.weights.tactic < 0.0 || self.weights.model < 0.0 {
            anyhow::bail!("ensemble weights must be non-negative");
        }
        // Domain and tactic carry the whole blend when the model is
        // unavailable; they must not both be zero.
        if self.weights.domain + self.weights.tactic <= 0.0 {
            anyhow::bail!("domain and tactic weights must not both be zero");
        }
        if !(0.0..=1.0).contains(&self.suspicion_threshold) {
            anyhow::bail!(
                "suspicion threshold must be within [0, 1], got {}",
                self.suspicion_threshold
            );
        }
        if self.llm.timeout_secs == 0 {
            anyhow::bail!("llm timeout must be at least one second");
        }
        Ok(())
    }

    /// YAML document with the default settings, for --generate-config.
    pub fn default_yaml() -> String {
        let body = serde_yaml::to_string(&Config::default())
            .unwrap_or_else(|_| String::from("{}\n"));
        format!(
            "# phishtrap configuration\n\
             # Ensemble weights must sum to 1.0. The model weight is\n\
             # redistributed over the other signals when the LLM is\n\
             # unavailable or disabled.\n{body}"
        )
    }
}

fn default_domain_weight() -> f64 {
    DOMAIN_WEIGHT
}

fn default_tactic_weight() -> f64 {
    TACTIC_WEIGHT
}

fn default_model_weight() -> f64 {
    MODEL_WEIGHT
}

fn default_suspicion_threshold() -> f64 {
    SUSPICION_THRESHOLD
}

fn default_typosquat_max_distance() -> usize {
    TYPOSQUAT_MAX_DISTANCE
}

fn default_typosquat_min_len() -> usize {
    TYPOSQUAT_MIN_LEN
}

fn default_llm_enabled() -> bool {
    true
}

fn default_llm_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_llm_timeout_secs() -> u64 {
    DEFAULT_LLM_TIMEOUT_SECS
}
