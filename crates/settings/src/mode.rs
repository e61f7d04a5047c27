use std::env;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Environment variable selecting development or production behaviour.
/// 選擇開發或正式模式的環境變數。
pub const MODE_ENV_VAR: &str = "LASOPRINTER_ENV";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Development,
    #[default]
    Production,
}

impl RunMode {
    pub fn from_env() -> Self {
        Self::from_value(env::var(MODE_ENV_VAR).ok().as_deref())
    }

    /// `development`/`dev` (any case) selects development; everything else is production.
    pub fn from_value(value: Option<&str>) -> Self {
        match value.map(|raw| raw.trim().to_ascii_lowercase()) {
            Some(value) if value == "development" || value == "dev" => RunMode::Development,
            _ => RunMode::Production,
        }
    }

    pub fn is_development(self) -> bool {
        self == RunMode::Development
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Development => f.write_str("development"),
            RunMode::Production => f.write_str("production"),
        }
    }
}
