//! Discretization log persistence — JSON reader/writer.
//!
//! The on-disk form is the serde projection of the in-memory structures;
//! nested side-channels stay nested objects. The reader validates the log
//! and reports config drift against the caller's defaults as data (the
//! engine itself never logs).

use crate::discretize::schema::{
    compare_configs, validate_log, DiscretizationLog, DiscretizerConfig,
};
use std::fs;
use std::io::Write;
use std::path::Path;
use thiserror::Error;

/// Errors from log persistence.
#[derive(Debug, Error)]
pub enum LogIoError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("log validation failed: {0:?}")]
    Validation(Vec<String>),
}

/// A read log plus the differences between its recorded config and the
/// reader's defaults. A non-empty `config_warnings` means results may not
/// be comparable to fresh discretizations.
#[derive(Debug)]
pub struct LogReadOutcome {
    pub log: DiscretizationLog,
    pub config_warnings: Vec<String>,
}

/// Write a log as pretty-printed JSON, creating parent directories.
pub fn write_log(log: &DiscretizationLog, path: &Path) -> Result<(), LogIoError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(log)?;
    let mut file = fs::File::create(path)?;
    file.write_all(json.as_bytes())?;
    Ok(())
}

/// Read a log back, validating its structure and comparing its recorded
/// config against the current defaults.
pub fn read_log(path: &Path) -> Result<LogReadOutcome, LogIoError> {
    read_log_with_defaults(path, &DiscretizerConfig::default())
}

/// Read a log, comparing its recorded config against the given expected
/// config instead of the built-in defaults.
pub fn read_log_with_defaults(
    path: &Path,
    expected: &DiscretizerConfig,
) -> Result<LogReadOutcome, LogIoError> {
    let json = fs::read_to_string(path)?;
    let log: DiscretizationLog = serde_json::from_str(&json)?;

    let errors = validate_log(&log);
    if !errors.is_empty() {
        return Err(LogIoError::Validation(errors));
    }

    let config_warnings = compare_configs(&log.meta.config, expected);
    Ok(LogReadOutcome {
        log,
        config_warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discretize::discretizer::{DetectedSwing, Discretizer};
    use crate::domain::{Bar, Direction, Scale};
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    fn sample_log() -> DiscretizationLog {
        let bars = vec![
            Bar::new(0, 1_700_000_000, dec!(5000), dec!(5005), dec!(4995), dec!(5000)),
            Bar::new(1, 1_700_000_060, dec!(5000), dec!(5105), dec!(4999), dec!(5050)),
            Bar::new(2, 1_700_000_120, dec!(5050), dec!(5200), dec!(5040), dec!(5200)),
        ];
        let mut swings = BTreeMap::new();
        swings.insert(
            Scale::S,
            vec![DetectedSwing {
                direction: Direction::Bull,
                high_price: dec!(5100),
                high_bar_index: 1,
                low_price: dec!(5000),
                low_bar_index: 0,
            }],
        );
        Discretizer::new(DiscretizerConfig::default())
            .unwrap()
            .discretize(&bars, &swings, "ES", "1m")
            .unwrap()
    }

    #[test]
    fn write_read_roundtrip() {
        let log = sample_log();
        let dir = std::env::temp_dir().join("swinglab_io_roundtrip");
        let path = dir.join("log.json");
        write_log(&log, &path).unwrap();

        let outcome = read_log(&path).unwrap();
        assert_eq!(outcome.log, log);
        assert!(outcome.config_warnings.is_empty());

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn reader_reports_config_drift() {
        let log = sample_log();
        let dir = std::env::temp_dir().join("swinglab_io_drift");
        let path = dir.join("log.json");
        write_log(&log, &path).unwrap();

        let mut expected = DiscretizerConfig::default();
        expected.gap_threshold_pct = dec!(0.01);
        let outcome = read_log_with_defaults(&path, &expected).unwrap();
        assert_eq!(outcome.config_warnings.len(), 1);
        assert!(outcome.config_warnings[0].contains("gap_threshold_pct"));

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn reader_rejects_invalid_log() {
        let mut log = sample_log();
        // Break event ordering.
        log.events.reverse();
        let dir = std::env::temp_dir().join("swinglab_io_invalid");
        let path = dir.join("log.json");
        write_log(&log, &path).unwrap();

        let err = read_log(&path);
        assert!(matches!(err, Err(LogIoError::Validation(_))));

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = read_log(Path::new("/nonexistent/swinglab/log.json"));
        assert!(matches!(err, Err(LogIoError::Io(_))));
    }
}
