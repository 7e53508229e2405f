//! Explicit compiler configuration (§9 Design Notes, "Global state"). The
//! process-wide defaults a notebook-style helper might reach for — default
//! engine, import search path, a live database connection — are threaded
//! through here instead, so running the compiler twice never depends on
//! anything mutated out-of-band.

use std::collections::HashMap;

use serde::Deserialize;

use crate::concertina::display::DisplayMode;
use crate::runner::{NullRunner, SqlRunner};

/// On-disk shape of a config file, loaded with `serde_yaml`; every field is
/// optional so a file only needs to say what it's overriding.
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    pub default_engine: Option<String>,
    pub search_paths: Option<Vec<String>>,
    #[serde(default)]
    pub flag_overrides: HashMap<String, String>,
}

pub struct Config {
    pub default_engine: String,
    pub search_paths: Vec<String>,
    pub flag_overrides: HashMap<String, String>,
    pub runner: Box<dyn SqlRunner>,
    pub display_mode: DisplayMode,
}

impl Config {
    pub fn new(default_engine: impl Into<String>) -> Self {
        Config {
            default_engine: default_engine.into(),
            search_paths: Vec::new(),
            flag_overrides: HashMap::new(),
            runner: Box::new(NullRunner),
            display_mode: DisplayMode::None,
        }
    }

    /// `LOGICAPATH` is colon-separated (§6 Environment variables); empty
    /// segments are dropped rather than resolving to the current directory.
    pub fn with_search_paths_from_env(mut self, logicapath: &str) -> Self {
        self.search_paths = logicapath.split(':').filter(|s| !s.is_empty()).map(|s| s.to_string()).collect();
        self
    }

    pub fn with_runner(mut self, runner: Box<dyn SqlRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_display_mode(mut self, mode: DisplayMode) -> Self {
        self.display_mode = mode;
        self
    }

    /// Layers a `ConfigFile` parsed from YAML on top of `self`: an absent
    /// field in the file leaves the existing value untouched.
    pub fn with_config_file(mut self, file: ConfigFile) -> Self {
        if let Some(engine) = file.default_engine {
            self.default_engine = engine;
        }
        if let Some(paths) = file.search_paths {
            self.search_paths = paths;
        }
        self.flag_overrides.extend(file.flag_overrides);
        self
    }

    pub fn from_yaml_str(yaml: &str) -> Result<ConfigFile, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    pub fn from_yaml_file(path: &str) -> Result<ConfigFile, crate::error::Error> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| crate::error::Error::simple(format!("failed to read config file `{path}`: {e}")))?;
        Self::from_yaml_str(&contents)
            .map_err(|e| crate::error::Error::simple(format!("failed to parse config file `{path}`: {e}")))
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::new("sqlite")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logicapath_splits_on_colon_and_drops_empty_segments() {
        let config = Config::default().with_search_paths_from_env("/a/b::/c/d");
        assert_eq!(config.search_paths, vec!["/a/b".to_string(), "/c/d".to_string()]);
    }

    #[test]
    fn yaml_config_file_overrides_only_the_fields_it_sets() {
        let file = Config::from_yaml_str("default_engine: psql\nflag_overrides:\n  threshold: \"10\"\n").unwrap();
        let config = Config::default().with_config_file(file);
        assert_eq!(config.default_engine, "psql");
        assert_eq!(config.flag_overrides.get("threshold"), Some(&"10".to_string()));
        assert!(config.search_paths.is_empty());
    }

    #[test]
    fn empty_yaml_config_file_leaves_defaults_untouched() {
        let file = Config::from_yaml_str("{}").unwrap();
        let config = Config::default().with_config_file(file);
        assert_eq!(config.default_engine, "sqlite");
    }
}
