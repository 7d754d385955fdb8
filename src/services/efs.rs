//! EFS file-system and access-point lookup.
//!
//! Lookups accept either a resource id (`fs-...`, `fsap-...`) or the value of
//! the resource's `Name` tag. Name lookups are narrowed by the `env_base` tag
//! so that one account can host several environments side by side.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Tag holding the human-readable resource name.
pub const NAME_TAG: &str = "Name";

/// Tag holding the environment label.
pub const ENV_BASE_TAG: &str = "env_base";

/// The subset of an EFS file system the scaffolding needs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileSystemDescriptor {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Metered size of the file system in bytes
    #[serde(default)]
    pub used_bytes: u64,

    #[serde(default)]
    pub tags: IndexMap<String, String>,
}

/// The subset of an EFS access point the scaffolding needs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessPointDescriptor {
    pub id: String,
    pub file_system_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Directory inside the file system exposed as the access point root
    #[serde(default = "default_root_directory")]
    pub root_directory: PathBuf,

    #[serde(default)]
    pub tags: IndexMap<String, String>,
}

fn default_root_directory() -> PathBuf {
    PathBuf::from("/")
}

/// External lookup of EFS resources.
#[async_trait]
pub trait EfsResolver: Send + Sync {
    /// Find one file system by id, or by `Name` tag within `env_base`.
    async fn file_system(
        &self,
        name_or_id: &str,
        env_base: Option<&str>,
    ) -> Result<FileSystemDescriptor>;

    /// Find one access point by id, or by `Name` tag within `env_base`,
    /// optionally restricted to one file system.
    async fn access_point(
        &self,
        name_or_id: &str,
        file_system_id: Option<&str>,
        env_base: Option<&str>,
    ) -> Result<AccessPointDescriptor>;
}

trait Tagged {
    fn id(&self) -> &str;
    fn tags(&self) -> &IndexMap<String, String>;
}

impl Tagged for FileSystemDescriptor {
    fn id(&self) -> &str {
        &self.id
    }
    fn tags(&self) -> &IndexMap<String, String> {
        &self.tags
    }
}

impl Tagged for AccessPointDescriptor {
    fn id(&self) -> &str {
        &self.id
    }
    fn tags(&self) -> &IndexMap<String, String> {
        &self.tags
    }
}

/// Pick exactly one resource from `items`.
///
/// An id match wins outright. Otherwise the `Name` tag must equal
/// `name_or_id` and, when `env_base` is given, the `env_base` tag must match.
fn match_one<T: Tagged + Clone>(
    items: &[T],
    kind: &str,
    name_or_id: &str,
    env_base: Option<&str>,
) -> Result<T> {
    if let Some(item) = items.iter().find(|item| item.id() == name_or_id) {
        return Ok(item.clone());
    }

    let matches: Vec<&T> = items
        .iter()
        .filter(|item| item.tags().get(NAME_TAG).map(String::as_str) == Some(name_or_id))
        .filter(|item| match env_base {
            Some(env) => item.tags().get(ENV_BASE_TAG).map(String::as_str) == Some(env),
            None => true,
        })
        .collect();

    let resource = format!("{kind} {name_or_id}");
    match matches.as_slice() {
        [] => Err(AppError::resolution(
            resource,
            match env_base {
                Some(env) => format!("not found (env_base={env})"),
                None => "not found".to_string(),
            },
        )),
        [one] => Ok((*one).clone()),
        many => Err(AppError::resolution(
            resource,
            format!(
                "ambiguous, {} matches: {}",
                many.len(),
                many.iter().map(|item| item.id()).collect::<Vec<_>>().join(", ")
            ),
        )),
    }
}

/// Resources known ahead of time, e.g. for local runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EfsInventory {
    #[serde(default)]
    pub file_systems: Vec<FileSystemDescriptor>,

    #[serde(default)]
    pub access_points: Vec<AccessPointDescriptor>,
}

/// Resolver backed by a fixed inventory.
#[derive(Debug, Clone, Default)]
pub struct StaticEfsResolver {
    inventory: EfsInventory,
}

impl StaticEfsResolver {
    pub fn new(inventory: EfsInventory) -> Self {
        Self { inventory }
    }

    /// Load an inventory from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::new(serde_json::from_str(&content)?))
    }
}

#[async_trait]
impl EfsResolver for StaticEfsResolver {
    async fn file_system(
        &self,
        name_or_id: &str,
        env_base: Option<&str>,
    ) -> Result<FileSystemDescriptor> {
        match_one(
            &self.inventory.file_systems,
            "file system",
            name_or_id,
            env_base,
        )
    }

    async fn access_point(
        &self,
        name_or_id: &str,
        file_system_id: Option<&str>,
        env_base: Option<&str>,
    ) -> Result<AccessPointDescriptor> {
        let candidates: Vec<AccessPointDescriptor> = self
            .inventory
            .access_points
            .iter()
            .filter(|ap| file_system_id.is_none_or(|fs| ap.file_system_id == fs))
            .cloned()
            .collect();
        match_one(&candidates, "access point", name_or_id, env_base)
    }
}

#[cfg(feature = "aws")]
pub use aws::AwsEfsResolver;

#[cfg(feature = "aws")]
mod aws {
    use std::path::PathBuf;

    use async_trait::async_trait;
    use aws_sdk_efs::Client;
    use aws_sdk_efs::error::DisplayErrorContext;
    use aws_sdk_efs::types::{AccessPointDescription, FileSystemDescription, Tag};
    use indexmap::IndexMap;
    use tracing::debug;

    use super::{AccessPointDescriptor, EfsResolver, FileSystemDescriptor, match_one};
    use crate::error::{AppError, Result};

    /// Resolver calling the EFS API.
    #[derive(Clone)]
    pub struct AwsEfsResolver {
        client: Client,
    }

    impl AwsEfsResolver {
        pub fn new(client: Client) -> Self {
            Self { client }
        }

        /// Create a resolver from the default AWS credential chain.
        pub async fn from_env() -> Self {
            let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
            Self::new(Client::new(&config))
        }

        async fn list_file_systems(&self, id: Option<&str>) -> Result<Vec<FileSystemDescriptor>> {
            let mut descriptors = Vec::new();
            let mut marker: Option<String> = None;
            loop {
                let output = self
                    .client
                    .describe_file_systems()
                    .set_file_system_id(id.map(str::to_string))
                    .set_marker(marker.take())
                    .send()
                    .await
                    .map_err(|e| {
                        AppError::resolution(
                            format!("file system {}", id.unwrap_or("*")),
                            DisplayErrorContext(&e),
                        )
                    })?;

                descriptors.extend(output.file_systems().iter().map(file_system_descriptor));
                match output.next_marker() {
                    Some(next) => marker = Some(next.to_string()),
                    None => break,
                }
            }
            debug!("Described {} file systems", descriptors.len());
            Ok(descriptors)
        }

        async fn list_access_points(
            &self,
            id: Option<&str>,
            file_system_id: Option<&str>,
        ) -> Result<Vec<AccessPointDescriptor>> {
            let mut descriptors = Vec::new();
            let mut next_token: Option<String> = None;
            loop {
                let output = self
                    .client
                    .describe_access_points()
                    .set_access_point_id(id.map(str::to_string))
                    .set_file_system_id(if id.is_some() {
                        None
                    } else {
                        file_system_id.map(str::to_string)
                    })
                    .set_next_token(next_token.take())
                    .send()
                    .await
                    .map_err(|e| {
                        AppError::resolution(
                            format!("access point {}", id.unwrap_or("*")),
                            DisplayErrorContext(&e),
                        )
                    })?;

                descriptors.extend(output.access_points().iter().filter_map(access_point_descriptor));
                match output.next_token() {
                    Some(next) => next_token = Some(next.to_string()),
                    None => break,
                }
            }
            debug!("Described {} access points", descriptors.len());
            Ok(descriptors)
        }
    }

    fn tag_map(tags: &[Tag]) -> IndexMap<String, String> {
        tags.iter()
            .map(|tag| (tag.key().to_string(), tag.value().to_string()))
            .collect()
    }

    fn file_system_descriptor(fs: &FileSystemDescription) -> FileSystemDescriptor {
        FileSystemDescriptor {
            id: fs.file_system_id().to_string(),
            name: fs.name().map(str::to_string),
            used_bytes: fs
                .size_in_bytes()
                .map(|size| u64::try_from(size.value()).unwrap_or(0))
                .unwrap_or(0),
            tags: tag_map(fs.tags()),
        }
    }

    fn access_point_descriptor(ap: &AccessPointDescription) -> Option<AccessPointDescriptor> {
        Some(AccessPointDescriptor {
            id: ap.access_point_id()?.to_string(),
            file_system_id: ap.file_system_id()?.to_string(),
            name: ap.name().map(str::to_string),
            root_directory: ap
                .root_directory()
                .and_then(|root| root.path())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("/")),
            tags: tag_map(ap.tags()),
        })
    }

    #[async_trait]
    impl EfsResolver for AwsEfsResolver {
        async fn file_system(
            &self,
            name_or_id: &str,
            env_base: Option<&str>,
        ) -> Result<FileSystemDescriptor> {
            let by_id = name_or_id.starts_with("fs-").then_some(name_or_id);
            let candidates = self.list_file_systems(by_id).await?;
            match_one(&candidates, "file system", name_or_id, env_base)
        }

        async fn access_point(
            &self,
            name_or_id: &str,
            file_system_id: Option<&str>,
            env_base: Option<&str>,
        ) -> Result<AccessPointDescriptor> {
            let by_id = name_or_id.starts_with("fsap-").then_some(name_or_id);
            let candidates = self.list_access_points(by_id, file_system_id).await?;
            match_one(&candidates, "access point", name_or_id, env_base)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn inventory() -> EfsInventory {
        EfsInventory {
            file_systems: vec![
                FileSystemDescriptor {
                    id: "fs-111111111111".into(),
                    name: Some("data".into()),
                    used_bytes: 10,
                    tags: tags(&[("Name", "data"), ("env_base", "dev")]),
                },
                FileSystemDescriptor {
                    id: "fs-222222222222".into(),
                    name: Some("data".into()),
                    used_bytes: 20,
                    tags: tags(&[("Name", "data"), ("env_base", "prod")]),
                },
            ],
            access_points: vec![
                AccessPointDescriptor {
                    id: "fsap-aaaaaaaaaaaa".into(),
                    file_system_id: "fs-111111111111".into(),
                    name: Some("scratch".into()),
                    root_directory: PathBuf::from("/scratch"),
                    tags: tags(&[("Name", "scratch"), ("env_base", "dev")]),
                },
                AccessPointDescriptor {
                    id: "fsap-bbbbbbbbbbbb".into(),
                    file_system_id: "fs-222222222222".into(),
                    name: Some("scratch".into()),
                    root_directory: PathBuf::from("/scratch"),
                    tags: tags(&[("Name", "scratch"), ("env_base", "prod")]),
                },
            ],
        }
    }

    #[tokio::test]
    async fn test_lookup_by_id_ignores_env() {
        let resolver = StaticEfsResolver::new(inventory());
        let fs = resolver
            .file_system("fs-222222222222", Some("dev"))
            .await
            .unwrap();
        assert_eq!(fs.used_bytes, 20);
    }

    #[tokio::test]
    async fn test_lookup_by_name_filters_env() {
        let resolver = StaticEfsResolver::new(inventory());
        let fs = resolver.file_system("data", Some("prod")).await.unwrap();
        assert_eq!(fs.id, "fs-222222222222");

        let ap = resolver
            .access_point("scratch", None, Some("dev"))
            .await
            .unwrap();
        assert_eq!(ap.id, "fsap-aaaaaaaaaaaa");
    }

    #[tokio::test]
    async fn test_ambiguous_name_is_resolution_error() {
        let resolver = StaticEfsResolver::new(inventory());
        let err = resolver.file_system("data", None).await.unwrap_err();
        assert!(matches!(err, AppError::Resolution { .. }));
        assert!(err.to_string().contains("ambiguous"));
    }

    #[tokio::test]
    async fn test_access_point_restricted_to_file_system() {
        let resolver = StaticEfsResolver::new(inventory());
        let ap = resolver
            .access_point("scratch", Some("fs-222222222222"), None)
            .await
            .unwrap();
        assert_eq!(ap.id, "fsap-bbbbbbbbbbbb");

        let err = resolver
            .access_point("missing", None, Some("dev"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("access point missing"));
    }

    #[test]
    fn test_inventory_deserializes_with_defaults() {
        let json = r#"{
            "file_systems": [{"id": "fs-1"}],
            "access_points": [{"id": "fsap-1", "file_system_id": "fs-1"}]
        }"#;
        let inventory: EfsInventory = serde_json::from_str(json).unwrap();
        assert_eq!(inventory.file_systems[0].used_bytes, 0);
        assert_eq!(inventory.access_points[0].root_directory, PathBuf::from("/"));
    }
}
