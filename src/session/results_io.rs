use crate::types::exercise::{ParameterSpec, Target};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResultsIoError {
    #[error("Results file not found at {0:?}")]
    NotFound(PathBuf),

    #[error("Failed to access results file at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to (de)serialize results at {path:?}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// What a learner did with one exercise, as written to the results directory.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ResultsRecord {
    pub timestamp: String,
    /// Display name of the exercise.
    pub exercise: String,
    pub parameters: BTreeMap<String, ParameterSpec>,
    pub user_answers: BTreeMap<String, String>,
    pub targets: Vec<Target>,
}

pub fn default_results_file_name(now: &DateTime<Local>) -> String {
    format!("simulation_results_{}.json", now.format("%Y%m%d_%H%M%S"))
}

/// The requested name with `.json` appended when missing, or a timestamped
/// default when none (or an empty one) was given.
pub fn results_file_name(requested: Option<&str>, now: &DateTime<Local>) -> String {
    match requested.map(str::trim).filter(|name| !name.is_empty()) {
        Some(name) if name.ends_with(".json") => name.to_string(),
        Some(name) => format!("{}.json", name),
        None => default_results_file_name(now),
    }
}

/// Writes `record` as pretty JSON, creating the parent directory if needed.
pub fn save_results_record(record: &ResultsRecord, file_path: &Path) -> Result<(), ResultsIoError> {
    let io_error = |source: std::io::Error| ResultsIoError::Io {
        path: file_path.to_path_buf(),
        source,
    };

    if let Some(parent) = file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_error)?;
    }
    let file = File::create(file_path).map_err(io_error)?;
    let mut writer = BufWriter::new(file);

    serde_json::to_writer_pretty(&mut writer, record).map_err(|source| ResultsIoError::Json {
        path: file_path.to_path_buf(),
        source,
    })?;
    writer.flush().map_err(io_error)?;
    Ok(())
}

pub fn load_results_record(file_path: &Path) -> Result<ResultsRecord, ResultsIoError> {
    if !file_path.exists() {
        return Err(ResultsIoError::NotFound(file_path.to_path_buf()));
    }

    let file = File::open(file_path).map_err(|source| ResultsIoError::Io {
        path: file_path.to_path_buf(),
        source,
    })?;
    let reader = BufReader::new(file);

    serde_json::from_reader(reader).map_err(|source| ResultsIoError::Json {
        path: file_path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn fixed_time() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
    }

    #[test]
    fn test_file_names() {
        let now = fixed_time();
        assert_eq!(default_results_file_name(&now), "simulation_results_20240309_140507.json");
        assert_eq!(results_file_name(None, &now), "simulation_results_20240309_140507.json");
        assert_eq!(results_file_name(Some("  "), &now), "simulation_results_20240309_140507.json");
        assert_eq!(results_file_name(Some("run1"), &now), "run1.json");
        assert_eq!(results_file_name(Some("run1.json"), &now), "run1.json");
    }

    #[test]
    fn test_save_creates_directory_and_loads_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("out.json");
        let mut parameters = BTreeMap::new();
        parameters.insert("angle".to_string(), ParameterSpec::new(30.0).with_unit("degrees"));
        let record = ResultsRecord {
            timestamp: fixed_time().to_rfc3339(),
            exercise: "Projectile motion".to_string(),
            parameters,
            user_answers: BTreeMap::from([("h_max".to_string(), "5.1".to_string())]),
            targets: Vec::new(),
        };

        save_results_record(&record, &path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\n  \"exercise\": \"Projectile motion\""));
        assert_eq!(load_results_record(&path).unwrap(), record);
    }

    #[test]
    fn test_load_missing_and_corrupt() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(matches!(load_results_record(&missing), Err(ResultsIoError::NotFound(_))));

        let corrupt = dir.path().join("corrupt.json");
        fs::write(&corrupt, "{ not json").unwrap();
        assert!(matches!(load_results_record(&corrupt), Err(ResultsIoError::Json { .. })));
    }
}
