use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::assembler::UnmatchedPolicy;
use super::error::ConfigError;
use super::plugins::builtin_module_names;

/// Structure representing the application configuration. Contains pathing and run information
/// Configs are seralizable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub spec_paths: Vec<PathBuf>,
    pub output_path: PathBuf,
    /// Handler modules to load, in load order
    #[serde(default = "builtin_module_names")]
    pub modules: Vec<String>,
    #[serde(default)]
    pub unmatched: UnmatchedPolicy,
    /// Only export these scan numbers; all scans if None
    #[serde(default)]
    pub scans: Option<Vec<String>>,
    pub n_threads: i32,
}

impl Default for Config {
    /// Generate a new Config object. Paths will be empty/invalid
    fn default() -> Self {
        Self {
            spec_paths: Vec::new(),
            output_path: PathBuf::from("None"),
            modules: builtin_module_names(),
            unmatched: UnmatchedPolicy::default(),
            scans: None,
            n_threads: 1,
        }
    }
}

impl Config {
    /// Read the configuration in a YAML file
    /// Returns a Config if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }

    /// Get the path to the export of a SPEC file: `<output_path>/<file name>.yml`
    pub fn get_output_file_name(&self, spec_path: &Path) -> Result<PathBuf, ConfigError> {
        if !self.output_path.exists() {
            return Err(ConfigError::BadFilePath(self.output_path.clone()));
        }
        match spec_path.file_name() {
            Some(name) => Ok(self
                .output_path
                .join(format!("{}.yml", name.to_string_lossy()))),
            None => Err(ConfigError::BadFilePath(spec_path.to_path_buf())),
        }
    }

    pub fn does_spec_file_exist(&self, spec_path: &Path) -> bool {
        spec_path.is_file()
    }

    pub fn is_n_threads_valid(&self) -> bool {
        self.n_threads >= 1
    }

    pub fn has_scan_subset(&self) -> bool {
        self.scans.is_some()
    }
}
