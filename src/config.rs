use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

use crate::types::exercise::Domain;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}. Please ensure it exists.")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("templates_dir specified in {path} ('{dir}') is not a valid directory.")]
    TemplatesDir { path: String, dir: String },
}

/// Everything the parser, the language-model adapter and the session manager
/// need, loaded once at startup and handed to their constructors.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Config {
    pub results_dir: PathBuf,
    pub templates_dir: Option<PathBuf>,
    pub llm: LlmConfig,
    pub engine: EngineConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from("results"),
            templates_dir: None,
            llm: LlmConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub enabled: bool,
    /// Program and arguments; the prompt is written to its stdin.
    pub command: Vec<String>,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_new_tokens: u32,
    /// Optional per-domain prompt files overriding the built-in prompts.
    pub prompts: BTreeMap<Domain, PathBuf>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            command: vec!["ollama".to_string(), "run".to_string(), "gemma3n".to_string()],
            temperature: 0.7,
            top_p: 0.9,
            top_k: 50,
            max_new_tokens: 1024,
            prompts: BTreeMap::new(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct EngineConfig {
    pub time_step: f64,
    /// Simulated seconds after which `run()` stops on its own.
    pub max_duration: f64,
    pub gravity: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            time_step: 1.0 / 60.0,
            max_duration: 10.0,
            gravity: 9.81,
        }
    }
}

pub fn load_config_from_file(file_path: &str) -> Result<Config, ConfigError> {
    let contents = fs::read_to_string(file_path).map_err(|source| ConfigError::Read {
        path: file_path.to_string(),
        source,
    })?;
    let loaded_config: Config = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: file_path.to_string(),
        source,
    })?;

    if let Some(dir) = &loaded_config.templates_dir {
        if !dir.is_dir() {
            return Err(ConfigError::TemplatesDir {
                path: file_path.to_string(),
                dir: dir.display().to_string(),
            });
        }
    }
    Ok(loaded_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_missing_keys_fall_back_to_defaults() {
        let config: Config = toml::from_str("results_dir = \"out\"\n[llm]\nenabled = true\n").unwrap();
        assert_eq!(config.results_dir, PathBuf::from("out"));
        assert!(config.llm.enabled);
        assert_eq!(config.llm.top_k, 50);
        assert!((config.engine.gravity - 9.81).abs() < 1e-12);
    }

    #[test]
    fn test_prompt_overrides_keyed_by_domain() {
        let config: Config =
            toml::from_str("[llm.prompts]\nchemistry = \"prompts/chem.txt\"\n").unwrap();
        assert_eq!(
            config.llm.prompts.get(&Domain::Chemistry),
            Some(&PathBuf::from("prompts/chem.txt"))
        );
    }

    #[test]
    fn test_load_rejects_missing_templates_dir() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "templates_dir = \"{}\"", dir.path().join("nope").display()).unwrap();

        let result = load_config_from_file(path.to_str().unwrap());
        assert!(matches!(result, Err(ConfigError::TemplatesDir { .. })));
    }

    #[test]
    fn test_load_missing_file() {
        let result = load_config_from_file("/definitely/not/here/config.toml");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }
}
