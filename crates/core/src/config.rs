use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `OUTREACH__`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub throttle: ThrottleConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub personalization: PersonalizationConfig,
    #[serde(default)]
    pub leads: LeadsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Upper bound on targets per run. Values above 50 are clamped.
    #[serde(default = "default_max_targets")]
    pub max_targets: usize,
    /// Re-verify the session every Nth target.
    #[serde(default = "default_verify_every")]
    pub verify_every: usize,
    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThrottleConfig {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
    #[serde(default = "default_progressive_step_ms")]
    pub progressive_step_ms: u64,
    #[serde(default = "default_safety_threshold")]
    pub safety_threshold: usize,
    #[serde(default = "default_safety_penalty_ms")]
    pub safety_penalty_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_failure_cooldown_ms")]
    pub failure_cooldown_ms: u64,
    #[serde(default = "default_rate_limit_cooldown_ms")]
    pub rate_limit_cooldown_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_cooldown_ms")]
    pub cooldown_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersonalizationConfig {
    /// Marker that requests generative rewriting of a template.
    #[serde(default = "default_marker")]
    pub marker: String,
    #[serde(default = "default_prompt_max_chars")]
    pub prompt_max_chars: usize,
    #[serde(default = "default_topic")]
    pub default_topic: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeadsConfig {
    #[serde(default = "default_candidate_limit")]
    pub candidate_limit: usize,
}

// Default functions
fn default_max_targets() -> usize {
    50
}
fn default_verify_every() -> usize {
    3
}
fn default_max_message_chars() -> usize {
    1000
}
fn default_base_delay_ms() -> u64 {
    90_000
}
fn default_jitter_ms() -> u64 {
    30_000
}
fn default_progressive_step_ms() -> u64 {
    45_000
}
fn default_safety_threshold() -> usize {
    10
}
fn default_safety_penalty_ms() -> u64 {
    60_000
}
fn default_max_delay_ms() -> u64 {
    300_000
}
fn default_failure_cooldown_ms() -> u64 {
    60_000
}
fn default_rate_limit_cooldown_ms() -> u64 {
    300_000
}
fn default_max_attempts() -> u32 {
    2
}
fn default_retry_cooldown_ms() -> u64 {
    30_000
}
fn default_marker() -> String {
    "[[ai]]".to_string()
}
fn default_prompt_max_chars() -> usize {
    600
}
fn default_topic() -> String {
    "tu contenido".to_string()
}
fn default_candidate_limit() -> usize {
    20
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_targets: default_max_targets(),
            verify_every: default_verify_every(),
            max_message_chars: default_max_message_chars(),
        }
    }
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            jitter_ms: default_jitter_ms(),
            progressive_step_ms: default_progressive_step_ms(),
            safety_threshold: default_safety_threshold(),
            safety_penalty_ms: default_safety_penalty_ms(),
            max_delay_ms: default_max_delay_ms(),
            failure_cooldown_ms: default_failure_cooldown_ms(),
            rate_limit_cooldown_ms: default_rate_limit_cooldown_ms(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            cooldown_ms: default_retry_cooldown_ms(),
        }
    }
}

impl Default for PersonalizationConfig {
    fn default() -> Self {
        Self {
            marker: default_marker(),
            prompt_max_chars: default_prompt_max_chars(),
            default_topic: default_topic(),
        }
    }
}

impl Default for LeadsConfig {
    fn default() -> Self {
        Self {
            candidate_limit: default_candidate_limit(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("OUTREACH")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}
