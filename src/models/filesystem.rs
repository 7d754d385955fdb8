//! File-system placement requested for a demand execution.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{AppError, Result};

/// One candidate mount: a file system and/or access point plus where to mount it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileSystemConfiguration {
    /// File system id or `Name` tag
    #[serde(
        default,
        rename = "file_system",
        alias = "file_system_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub file_system_id: Option<String>,

    /// Access point id or `Name` tag
    #[serde(
        default,
        rename = "access_point",
        alias = "access_point_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub access_point_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_path: Option<PathBuf>,
}

impl FileSystemConfiguration {
    pub fn has_identifier(&self) -> bool {
        self.file_system_id.is_some() || self.access_point_id.is_some()
    }
}

/// How to pick among several candidate file systems for the same role.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SelectionStrategy {
    #[default]
    Random,
    LeastUtilized,
}

impl fmt::Display for SelectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionStrategy::Random => write!(f, "RANDOM"),
            SelectionStrategy::LeastUtilized => write!(f, "LEAST_UTILIZED"),
        }
    }
}

impl FromStr for SelectionStrategy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RANDOM" => Ok(SelectionStrategy::Random),
            "LEAST_UTILIZED" => Ok(SelectionStrategy::LeastUtilized),
            other => Err(AppError::invalid_input(format!(
                "unknown selection strategy '{other}'"
            ))),
        }
    }
}

/// Candidate file systems per role.
///
/// Each role accepts either a single configuration object or a list.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DemandFileSystemConfigurations {
    /// Mounted read-only; holds shared inputs
    #[serde(default, deserialize_with = "one_or_many")]
    pub shared: Vec<FileSystemConfiguration>,

    /// Mounted read-write; holds the execution working directory
    #[serde(default, deserialize_with = "one_or_many")]
    pub scratch: Vec<FileSystemConfiguration>,

    #[serde(
        default,
        deserialize_with = "optional_one_or_many",
        skip_serializing_if = "Option::is_none"
    )]
    pub tmp: Option<Vec<FileSystemConfiguration>>,

    #[serde(default)]
    pub selection_strategy: SelectionStrategy,
}

impl DemandFileSystemConfigurations {
    /// Reject requests missing a required role before any lookup happens.
    pub fn validate(&self) -> Result<()> {
        if self.scratch.is_empty() {
            return Err(AppError::invalid_input(
                "file_system_configurations.scratch requires at least one file system",
            ));
        }
        if self.shared.is_empty() {
            return Err(AppError::invalid_input(
                "file_system_configurations.shared requires at least one file system",
            ));
        }
        Ok(())
    }

    /// Tmp candidates, treating an empty list as absent.
    pub fn tmp_candidates(&self) -> Option<&[FileSystemConfiguration]> {
        self.tmp.as_deref().filter(|candidates| !candidates.is_empty())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    // Many first: an empty list must not be read as one all-default struct
    Many(Vec<T>),
    One(T),
}

impl<T> From<OneOrMany<T>> for Vec<T> {
    fn from(value: OneOrMany<T>) -> Self {
        match value {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

fn one_or_many<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(OneOrMany::<T>::deserialize(deserializer)?.into())
}

fn optional_one_or_many<'de, D, T>(
    deserializer: D,
) -> std::result::Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<OneOrMany<T>>::deserialize(deserializer)?.map(Vec::from))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_single_object_or_list() {
        let json = r#"{
            "scratch": {"file_system": "fs-1", "access_point": "fsap-1", "container_path": "/opt/efs/scratch"},
            "shared": [
                {"file_system": "fs-1", "access_point": "fsap-2"},
                {"access_point": "fsap-3"}
            ]
        }"#;
        let configs: DemandFileSystemConfigurations = serde_json::from_str(json).unwrap();
        assert_eq!(configs.scratch.len(), 1);
        assert_eq!(configs.shared.len(), 2);
        assert_eq!(configs.shared[1].access_point_id.as_deref(), Some("fsap-3"));
        assert!(configs.tmp.is_none());
        assert_eq!(configs.selection_strategy, SelectionStrategy::Random);
        assert!(configs.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_roles() {
        let configs = DemandFileSystemConfigurations {
            shared: vec![FileSystemConfiguration::default()],
            ..Default::default()
        };
        let err = configs.validate().unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
        assert!(err.to_string().contains("scratch"));
    }

    #[test]
    fn test_selection_strategy_names() {
        let strategy: SelectionStrategy = serde_json::from_str(r#""LEAST_UTILIZED""#).unwrap();
        assert_eq!(strategy, SelectionStrategy::LeastUtilized);
        assert_eq!("random".parse::<SelectionStrategy>().unwrap(), SelectionStrategy::Random);
        assert!(matches!(
            "BIGGEST".parse::<SelectionStrategy>(),
            Err(AppError::InvalidInput(_))
        ));
        assert!(serde_json::from_str::<SelectionStrategy>(r#""BIGGEST""#).is_err());
    }

    #[test]
    fn test_empty_list_stays_empty() {
        let configs: DemandFileSystemConfigurations =
            serde_json::from_str(r#"{"scratch": [], "shared": [{"access_point": "fsap-1"}]}"#)
                .unwrap();
        assert!(configs.scratch.is_empty());
        assert!(configs.validate().is_err());
    }

    #[test]
    fn test_empty_tmp_is_absent() {
        let configs = DemandFileSystemConfigurations {
            tmp: Some(Vec::new()),
            ..Default::default()
        };
        assert!(configs.tmp_candidates().is_none());
    }
}
