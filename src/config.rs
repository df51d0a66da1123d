//! Flat preview configuration.
//!
//! Hosts own loading; this crate only reads the values. Every field has a
//! default so a partial JSON object is always accepted.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{PreviewError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewConfig {
    /// Maximum accepted source size in bytes.
    #[serde(default = "default_max_code_size")]
    pub max_code_size: usize,

    /// Identifiers rejected when followed by a call, e.g. `eval(`.
    #[serde(default = "default_blocked_keywords")]
    pub blocked_keywords: Vec<String>,

    /// A render that produces neither Ready nor Error within this window is stuck.
    #[serde(default = "default_max_render_time_ms")]
    pub max_render_time_ms: u64,

    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Error boundary retries the user may trigger from inside the sandbox.
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,

    /// Stateful-call count above which a quality warning is emitted.
    #[serde(default = "default_hook_warning_threshold")]
    pub hook_warning_threshold: usize,

    /// Delay between first successful render and the Ready message.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Upper bound on identifiers the sandbox may stub on the fly.
    #[serde(default = "default_max_runtime_stubs")]
    pub max_runtime_stubs: u32,

    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    #[serde(default)]
    pub runtime: RuntimeUrls,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeUrls {
    #[serde(default = "default_react_url")]
    pub react: String,
    #[serde(default = "default_react_dom_url")]
    pub react_dom: String,
    #[serde(default = "default_babel_url")]
    pub babel: String,
}

fn default_max_code_size() -> usize {
    100 * 1024
}

fn default_blocked_keywords() -> Vec<String> {
    vec!["eval".to_string(), "Function".to_string()]
}

fn default_max_render_time_ms() -> u64 {
    5_000
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_retry_limit() -> u32 {
    3
}

fn default_hook_warning_threshold() -> usize {
    5
}

fn default_settle_delay_ms() -> u64 {
    100
}

fn default_max_runtime_stubs() -> u32 {
    10
}

fn default_cache_capacity() -> usize {
    64
}

fn default_react_url() -> String {
    String::from("https://unpkg.com/react@18/umd/react.development.js")
}

fn default_react_dom_url() -> String {
    String::from("https://unpkg.com/react-dom@18/umd/react-dom.development.js")
}

fn default_babel_url() -> String {
    String::from("https://unpkg.com/@babel/standalone@7/babel.min.js")
}

impl Default for RuntimeUrls {
    fn default() -> Self {
        Self {
            react: default_react_url(),
            react_dom: default_react_dom_url(),
            babel: default_babel_url(),
        }
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            max_code_size: default_max_code_size(),
            blocked_keywords: default_blocked_keywords(),
            max_render_time_ms: default_max_render_time_ms(),
            debounce_ms: default_debounce_ms(),
            retry_limit: default_retry_limit(),
            hook_warning_threshold: default_hook_warning_threshold(),
            settle_delay_ms: default_settle_delay_ms(),
            max_runtime_stubs: default_max_runtime_stubs(),
            cache_capacity: default_cache_capacity(),
            runtime: RuntimeUrls::default(),
        }
    }
}

impl PreviewConfig {
    /// Parse a config object handed over by the embedding host.
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: PreviewConfig = serde_json::from_str(raw)
            .map_err(|e| PreviewError::Config(format!("Failed to parse config: {}", e)))?;
        config.check()?;
        Ok(config)
    }

    pub fn check(&self) -> Result<()> {
        if self.max_code_size == 0 {
            return Err(PreviewError::Config(
                "maxCodeSize must be greater than zero".to_string(),
            ));
        }
        if self.blocked_keywords.iter().any(|k| k.trim().is_empty()) {
            return Err(PreviewError::Config(
                "blockedKeywords may not contain empty entries".to_string(),
            ));
        }
        Ok(())
    }

    /// Stable digest of everything that influences the generated document.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        if let Ok(bytes) = serde_json::to_vec(self) {
            hasher.update(&bytes);
        }
        format!("{:x}", hasher.finalize())
    }

    pub fn debounce(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.debounce_ms)
    }

    pub fn max_render_time(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.max_render_time_ms)
    }
}
