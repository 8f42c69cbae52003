// Logger configuration
use serde::{Deserialize, Serialize};

use crate::redactor::RedactionConfig;

/// Output format of the fmt layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable, for development
    #[default]
    Pretty,
    /// One JSON object per line, for production
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub log_level: String,
    pub format: LogFormat,
    pub redaction_enabled: bool,
    /// Replace PII with a short hash instead of a mask, so log lines about
    /// the same recipient can still be correlated
    pub hash_for_correlation: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            format: LogFormat::Pretty,
            redaction_enabled: true,
            hash_for_correlation: false,
        }
    }
}

impl LoggerConfig {
    pub fn verbose(mut self, verbose: bool) -> Self {
        if verbose {
            self.log_level = "debug".to_string();
        }
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Filter used when `RUST_LOG` is not set.
    pub fn default_directives(&self) -> String {
        format!("{},sqlx=warn,reqwest=info,hyper=info", self.log_level)
    }

    pub fn redaction(&self) -> RedactionConfig {
        RedactionConfig {
            redact_emails: self.redaction_enabled,
            redact_phones: self.redaction_enabled,
            hash_for_correlation: self.hash_for_correlation,
        }
    }
}
