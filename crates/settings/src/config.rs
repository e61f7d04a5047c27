use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use lasoprinter_deeplink::DEFAULT_SCHEME;
use lasoprinter_printing::{DocumentMode, MarginType, PageSize, PrintOptions, SurfacePolicy};
use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mode::RunMode;

const CONFIG_VERSION: u32 = 1;
const DEFAULT_INSTANCE_PORT: u16 = 47613;
const DEFAULT_SCALE_FACTOR: f32 = 2.0;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize config {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to prepare directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// When the single-instance lock is taken.
/// 何時啟用單一執行個體鎖。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SingleInstanceScope {
    #[default]
    Always,
    DevelopmentOnly,
    Never,
}

impl SingleInstanceScope {
    pub fn applies(self, mode: RunMode) -> bool {
        match self {
            SingleInstanceScope::Always => true,
            SingleInstanceScope::DevelopmentOnly => mode == RunMode::Development,
            SingleInstanceScope::Never => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default = "default_scheme")]
    pub scheme: String,
    #[serde(default)]
    pub printer: Option<String>,
    #[serde(default)]
    pub surface_policy: SurfacePolicy,
    #[serde(default)]
    pub document_mode: DocumentMode,
    #[serde(default)]
    pub single_instance: SingleInstanceScope,
    #[serde(default = "default_instance_port")]
    pub instance_port: u16,
    #[serde(default)]
    pub stay_resident: Option<bool>,
    #[serde(default)]
    pub page: PageConfig,
    #[serde(default)]
    pub spool_dir: Option<PathBuf>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

fn default_scheme() -> String {
    DEFAULT_SCHEME.to_string()
}

fn default_instance_port() -> u16 {
    DEFAULT_INSTANCE_PORT
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            scheme: default_scheme(),
            printer: None,
            surface_policy: SurfacePolicy::default(),
            document_mode: DocumentMode::default(),
            single_instance: SingleInstanceScope::default(),
            instance_port: DEFAULT_INSTANCE_PORT,
            stay_resident: None,
            page: PageConfig::default(),
            spool_dir: None,
            log_level: default_log_level(),
        }
    }
}

impl AppConfig {
    pub fn sanitize(&mut self) {
        if self.version == 0 {
            self.version = CONFIG_VERSION;
        }
        let scheme = self.scheme.trim().to_ascii_lowercase();
        if is_valid_scheme(&scheme) {
            self.scheme = scheme;
        } else {
            warn!("ignoring invalid scheme '{}'", self.scheme);
            self.scheme = default_scheme();
        }
        if self
            .printer
            .as_deref()
            .map_or(false, |name| name.trim().is_empty())
        {
            self.printer = None;
        }
        if self.instance_port == 0 {
            self.instance_port = DEFAULT_INSTANCE_PORT;
        }
        if self.log_level.trim().is_empty() {
            self.log_level = default_log_level();
        }
        self.page.sanitize();
    }

    /// Print options for every job, before any per-link device override.
    /// 每個列印作業使用的選項。
    pub fn print_options(&self) -> PrintOptions {
        PrintOptions {
            silent: true,
            print_background: self.page.print_background,
            margins: MarginType::None,
            device_scale_factor: self.page.device_scale_factor,
            color: self.page.color,
            page_size: PageSize::new(self.page.width_microns, self.page.height_microns),
            device_name: self.printer.clone(),
        }
    }

    /// macOS keeps running without a surface; other platforms exit.
    pub fn stays_resident(&self) -> bool {
        self.stay_resident.unwrap_or(cfg!(target_os = "macos"))
    }
}

fn is_valid_scheme(scheme: &str) -> bool {
    let mut chars = scheme.chars();
    match chars.next() {
        Some(first) if first.is_ascii_lowercase() => {}
        _ => return false,
    }
    chars.all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || matches!(ch, '+' | '-' | '.'))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageConfig {
    #[serde(default = "default_width")]
    pub width_microns: u32,
    #[serde(default = "default_height")]
    pub height_microns: u32,
    #[serde(default = "default_scale_factor")]
    pub device_scale_factor: f32,
    #[serde(default = "default_true")]
    pub color: bool,
    #[serde(default = "default_true")]
    pub print_background: bool,
}

fn default_width() -> u32 {
    PageSize::LETTER.width_microns
}

fn default_height() -> u32 {
    PageSize::LETTER.height_microns
}

fn default_scale_factor() -> f32 {
    DEFAULT_SCALE_FACTOR
}

fn default_true() -> bool {
    true
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            width_microns: default_width(),
            height_microns: default_height(),
            device_scale_factor: DEFAULT_SCALE_FACTOR,
            color: true,
            print_background: true,
        }
    }
}

impl PageConfig {
    fn sanitize(&mut self) {
        if self.width_microns == 0 {
            self.width_microns = default_width();
        }
        if self.height_microns == 0 {
            self.height_microns = default_height();
        }
        if !self.device_scale_factor.is_finite() || self.device_scale_factor <= 0.0 {
            self.device_scale_factor = DEFAULT_SCALE_FACTOR;
        }
        self.device_scale_factor = self.device_scale_factor.clamp(0.25, 8.0);
    }
}

/// Default location of `config.json`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("lasoprinter").join("config.json"))
}

/// Default directory for rotated log files.
pub fn default_log_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|dir| dir.join("lasoprinter").join("logs"))
}

#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    data: AppConfig,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>, config: AppConfig) -> Self {
        Self {
            path: path.into(),
            data: config,
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            let mut data = AppConfig::default();
            data.sanitize();
            return Ok(Self { path, data });
        }

        let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let mut data: AppConfig =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.clone(),
                source,
            })?;
        data.sanitize();
        Ok(Self { path, data })
    }

    pub fn config(&self) -> &AppConfig {
        &self.data
    }

    pub fn update<F>(&mut self, mut op: F) -> Result<(), ConfigError>
    where
        F: FnMut(&mut AppConfig),
    {
        op(&mut self.data);
        self.data.sanitize();
        self.save()
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let payload =
            serde_json::to_string_pretty(&self.data).map_err(|source| ConfigError::Serialize {
                path: self.path.clone(),
                source,
            })?;

        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, payload.as_bytes()).map_err(|source| ConfigError::Write {
            path: tmp_path.clone(),
            source,
        })?;
        fs::rename(&tmp_path, &self.path).map_err(|source| ConfigError::Write {
            path: self.path.clone(),
            source,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn into_config(self) -> AppConfig {
        self.data
    }
}
