// src/config.rs

//! Defines the configuration structures for the harness.
//!
//! Settings are grouped by the component they steer: which implementation of
//! the native library and of the compute queue to drive, and how the runner
//! isolates and times scenarios. Every struct deserializes with defaults for
//! missing fields, so a config file only needs to name what it changes.
//!
//! Precedence, lowest first: defaults, JSON file, `CAS_LIBRARY_PATH`, CLI flags.
//! Workers never read files; they receive the parent's effective config as JSON
//! through [`CONFIG_HANDOFF_ENV`].

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Path to a JSON config file.
pub const CONFIG_PATH_ENV: &str = "CAS_HARNESS_CONFIG";
/// Serialized effective config passed from the runner to its workers.
pub const CONFIG_HANDOFF_ENV: &str = "CAS_HARNESS_CONFIG_JSON";
/// Explicit path of the CAS shared library.
pub const LIBRARY_PATH_ENV: &str = "CAS_LIBRARY_PATH";

// --- Top-Level Configuration Structure ---

/// The complete harness configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Native library selection.
    pub library: LibraryConfig,
    /// Compute queue selection and simulated device limits.
    pub compute: ComputeConfig,
    /// Isolation, timeouts and reporting.
    pub runner: RunnerConfig,
}

// --- Library Configuration ---

/// Which implementation of the four-function CAS API the workers call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum NativeBackend {
    /// The real shared library, loaded at run time.
    #[default]
    Native,
    /// The in-crate model of the library's unguarded behavior.
    Simulated,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct LibraryConfig {
    pub backend: NativeBackend,
    /// Path of the shared library. `None` falls back to the build-time
    /// pkg-config directory, then to the bare platform file name.
    pub path: Option<PathBuf>,
    /// Reject out-of-range sharpen parameters before they reach the library.
    /// Off by default: whether the library validates them is under test.
    pub validate_sharpen_params: bool,
}

impl LibraryConfig {
    /// Resolves the library path to hand to the dynamic loader.
    pub fn resolved_path(&self) -> PathBuf {
        if let Some(path) = &self.path {
            return path.clone();
        }
        let file_name = libloading::library_filename("CAS");
        match option_env!("CAS_HARNESS_DEFAULT_LIB_DIR") {
            Some(dir) => Path::new(dir).join(file_name),
            None => PathBuf::from(file_name),
        }
    }
}

// --- Compute Configuration ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ComputeBackend {
    /// OpenCL through the ICD loader (requires the `opencl` feature).
    #[value(name = "opencl")]
    OpenCl,
    /// CPU copy with OpenCL work-group validation rules.
    #[default]
    Simulated,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ComputeConfig {
    pub backend: ComputeBackend,
    /// Index into the platform list reported by the ICD loader.
    pub platform_index: usize,
    /// Index into the selected platform's device list (all device types).
    pub device_index: usize,
    /// `CL_DEVICE_MAX_WORK_GROUP_SIZE` reported by the simulated device.
    pub simulated_max_work_group_size: usize,
    /// `CL_DEVICE_MAX_WORK_ITEM_SIZES` reported by the simulated device.
    pub simulated_max_work_item_sizes: [usize; 3],
}

impl Default for ComputeConfig {
    fn default() -> Self {
        ComputeConfig {
            backend: ComputeBackend::default(),
            platform_index: 0,
            device_index: 0,
            simulated_max_work_group_size: 256,
            simulated_max_work_item_sizes: [256, 256, 256],
        }
    }
}

// --- Runner Configuration ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunnerConfig {
    /// Bounded wait per scenario attempt. Expiry is reported as a hang.
    pub timeout_ms: u64,
    /// Attempts per scenario. Disagreeing attempts make the verdict inconclusive.
    pub repeats: u32,
    pub report: ReportFormat,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        RunnerConfig {
            timeout_ms: 30_000,
            repeats: 1,
            report: ReportFormat::default(),
        }
    }
}

impl Config {
    /// Loads a config file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Builds the config a top-level invocation starts from.
    ///
    /// An explicit `path` wins over `CAS_HARNESS_CONFIG`. `CAS_LIBRARY_PATH`
    /// overrides the library path of whichever source was used.
    pub fn from_env(path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
        let mut config = match path.map(Path::to_path_buf).or(env_path) {
            Some(path) => Self::load(&path)?,
            None => Self::default(),
        };
        if let Some(library) = std::env::var_os(LIBRARY_PATH_ENV) {
            config.library.path = Some(PathBuf::from(library));
        }
        Ok(config)
    }

    /// Reads the config handed to a worker by its runner.
    pub fn from_handoff() -> Result<Self> {
        let json = std::env::var(CONFIG_HANDOFF_ENV)
            .with_context(|| format!("{} is not set", CONFIG_HANDOFF_ENV))?;
        serde_json::from_str(&json).context("Failed to parse handed-off worker config")
    }

    /// Serializes the config for [`CONFIG_HANDOFF_ENV`].
    pub fn to_handoff(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to serialize worker config")
    }
}
