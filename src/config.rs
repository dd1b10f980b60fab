use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{DocprobeError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Project configuration
    pub project: ProjectConfig,

    /// Source code parsing configuration
    pub parsing: ParsingConfig,

    /// Structured documentation tree settings
    pub rest: RestConfig,

    /// Output settings
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name
    pub name: String,

    /// Directories searched for importable modules
    pub source_dirs: Vec<PathBuf>,

    /// Directories to ignore
    pub ignore_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsingConfig {
    /// Source encoding (utf-8 or latin-1)
    pub encoding: String,

    /// Which doc comment is kept when a name is assigned more than once
    pub duplicate_comments: DuplicatePolicy,

    /// What happens to `__all__` entries that do not resolve to anything
    pub unresolved_all_entries: UnresolvedPolicy,

    /// Maximum file size to parse (in bytes)
    pub max_file_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestConfig {
    /// Pre-built environment file
    pub environment: Option<PathBuf>,

    /// External builder command, `{source}` and `{output}` are substituted
    pub builder_command: Vec<String>,

    /// Document the tree walk starts from
    pub root_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Default output format (text or json)
    pub format: String,

    /// Include members whose name starts with an underscore
    pub include_private: bool,
}

/// Tie-break for `(namespace, name)` pairs documented more than once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicatePolicy {
    /// The first documented assignment in reading order wins.
    #[default]
    FirstWins,
    /// Every later documented assignment replaces the earlier one.
    LastWins,
}

/// Handling of `__all__` names that neither exist nor import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnresolvedPolicy {
    /// Keep the member with the "no value known" sentinel.
    #[default]
    KeepEmpty,
    /// Drop the member from the module.
    Skip,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project: ProjectConfig {
                name: "Unnamed Project".to_string(),
                source_dirs: vec![PathBuf::from(".")],
                ignore_patterns: vec![
                    "target/".to_string(),
                    ".git/".to_string(),
                    "__pycache__/".to_string(),
                    ".venv/".to_string(),
                ],
            },
            parsing: ParsingConfig {
                encoding: "utf-8".to_string(),
                duplicate_comments: DuplicatePolicy::FirstWins,
                unresolved_all_entries: UnresolvedPolicy::KeepEmpty,
                max_file_size: 1024 * 1024, // 1MB
            },
            rest: RestConfig {
                environment: None,
                builder_command: vec![
                    "sphinx-build".to_string(),
                    "-b".to_string(),
                    "json".to_string(),
                    "{source}".to_string(),
                    "{output}".to_string(),
                ],
                root_path: "index".to_string(),
            },
            output: OutputConfig {
                format: "text".to_string(),
                include_private: false,
            },
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| DocprobeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| DocprobeError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration with fallback to default
    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        match path {
            Some(p) => {
                if p.as_ref().exists() {
                    Self::load(p)
                } else {
                    Ok(Self::default())
                }
            }
            None => {
                // Try common config file locations
                let candidates = [
                    "Docprobe.toml",
                    "docprobe.toml",
                    ".docprobe.toml",
                ];

                for candidate in &candidates {
                    if Path::new(candidate).exists() {
                        return Self::load(candidate);
                    }
                }

                Ok(Self::default())
            }
        }
    }

    fn validate(&self) -> Result<()> {
        crate::core::program::SourceEncoding::from_label(&self.parsing.encoding)?;
        if !matches!(self.output.format.as_str(), "text" | "json") {
            return Err(DocprobeError::Config(format!(
                "unknown output format '{}'",
                self.output.format
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docprobe.toml");

        let mut config = Config::default();
        config.parsing.duplicate_comments = DuplicatePolicy::LastWins;
        config.parsing.unresolved_all_entries = UnresolvedPolicy::Skip;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.parsing.duplicate_comments, DuplicatePolicy::LastWins);
        assert_eq!(loaded.parsing.unresolved_all_entries, UnresolvedPolicy::Skip);
        assert_eq!(loaded.rest.root_path, "index");
    }

    #[test]
    fn test_rejects_unknown_encoding() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docprobe.toml");

        let mut config = Config::default();
        config.parsing.encoding = "ebcdic".to_string();
        config.save(&path).unwrap();

        assert!(matches!(Config::load(&path), Err(DocprobeError::Config(_))));
    }

    #[test]
    fn test_missing_file_falls_back_to_default() {
        let config = Config::load_or_default(Some("/nonexistent/docprobe.toml")).unwrap();
        assert_eq!(config.parsing.encoding, "utf-8");
        assert_eq!(config.parsing.duplicate_comments, DuplicatePolicy::FirstWins);
    }
}
