//! Configuration file handling.
//!
//! Settings come from an optional `absence-report.toml`; command-line flags
//! override them in `main`.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::aggregate::AbsenceRule;
use crate::ingest::ReadOptions;
use crate::report::{Layout, Locale};

pub const DEFAULT_CONFIG_FILE: &str = "absence-report.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub input: InputConfig,

    #[serde(default)]
    pub report: ReportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// File read when no path is given, looked up next to the executable.
    #[serde(default = "default_file")]
    pub default_file: String,

    #[serde(default = "default_delimiter")]
    pub delimiter: String,

    /// Encoding label tried when the file is not valid UTF-8.
    #[serde(default = "default_fallback_encoding")]
    pub fallback_encoding: String,

    #[serde(default)]
    pub absence_rule: AbsenceRule,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            default_file: default_file(),
            delimiter: default_delimiter(),
            fallback_encoding: default_fallback_encoding(),
            absence_rule: AbsenceRule::default(),
        }
    }
}

fn default_file() -> String {
    "absences.csv".to_string()
}

fn default_delimiter() -> String {
    ";".to_string()
}

fn default_fallback_encoding() -> String {
    "windows-1252".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default)]
    pub locale: Locale,

    #[serde(default = "default_student_width")]
    pub student_width: usize,

    #[serde(default = "default_column_width")]
    pub column_width: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            locale: Locale::default(),
            student_width: default_student_width(),
            column_width: default_column_width(),
        }
    }
}

fn default_student_width() -> usize {
    30
}

fn default_column_width() -> usize {
    18
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Loads `absence-report.toml` from the working directory, if present.
    pub fn load_default() -> Result<Option<Self>> {
        let path = Path::new(DEFAULT_CONFIG_FILE);
        if path.exists() {
            Self::load(path).map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.read_options()?;
        Ok(config)
    }

    pub fn read_options(&self) -> Result<ReadOptions> {
        let delimiter = match self.input.delimiter.as_bytes() {
            [byte] => *byte,
            _ => bail!(
                "delimiter must be a single ASCII character, got {:?}",
                self.input.delimiter
            ),
        };

        let options = ReadOptions {
            delimiter,
            ..ReadOptions::default()
        }
        .with_fallback_label(&self.input.fallback_encoding)?;
        Ok(options)
    }

    pub fn layout(&self) -> Layout {
        Layout {
            student_width: self.report.student_width,
            column_width: self.report.column_width,
        }
    }
}

/// Picks the attendance file: an explicit path is taken relative to the
/// working directory, then to `program_dir`; otherwise `default_file` inside
/// `program_dir`.
pub fn resolve_input(explicit: Option<&Path>, default_file: &str, program_dir: &Path) -> PathBuf {
    match explicit {
        Some(path) if path.is_absolute() || path.exists() => path.to_path_buf(),
        Some(path) => program_dir.join(path),
        None => program_dir.join(default_file),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.input.default_file, "absences.csv");
        assert_eq!(config.input.absence_rule, AbsenceRule::Marker);
        assert_eq!(config.report.locale, Locale::Fr);
        assert_eq!(config.layout(), Layout::default());

        let options = config.read_options().unwrap();
        assert_eq!(options.delimiter, b';');
        assert_eq!(options.fallback, encoding_rs::WINDOWS_1252);
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[input]
delimiter = ","
fallback_encoding = "iso-8859-15"
absence_rule = "excuse"

[report]
locale = "en"
column_width = 22
"#;

        let config = Config::parse(toml_content).unwrap();
        assert_eq!(config.input.absence_rule, AbsenceRule::Excuse);
        assert_eq!(config.input.default_file, "absences.csv");
        assert_eq!(config.report.locale, Locale::En);
        assert_eq!(config.report.student_width, 30);
        assert_eq!(config.report.column_width, 22);

        let options = config.read_options().unwrap();
        assert_eq!(options.delimiter, b',');
        assert_eq!(options.fallback, encoding_rs::ISO_8859_15);
    }

    #[test]
    fn test_rejects_bad_delimiter_and_encoding() {
        assert!(Config::parse("[input]\ndelimiter = \";;\"\n").is_err());
        assert!(Config::parse("[input]\nfallback_encoding = \"nope\"\n").is_err());
        assert!(Config::parse("[input]\nabsence_rule = \"sometimes\"\n").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&path, "[report]\nstudent_width = 40\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.report.student_width, 40);
        assert!(Config::load(&dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_resolve_input() {
        let dir = tempfile::tempdir().unwrap();
        let program_dir = dir.path();

        assert_eq!(
            resolve_input(None, "absences.csv", program_dir),
            program_dir.join("absences.csv")
        );

        let absolute = program_dir.join("other.csv");
        assert_eq!(
            resolve_input(Some(&absolute), "absences.csv", program_dir),
            absolute
        );

        let relative = Path::new("does-not-exist-here.csv");
        assert_eq!(
            resolve_input(Some(relative), "absences.csv", program_dir),
            program_dir.join(relative)
        );
    }
}
