//! Turning a chosen file-system configuration into a container mount.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{AppError, Result};
use crate::models::{
    EfsAuthorizationConfig, EfsPath, EfsVolumeConfiguration, FileSystemConfiguration, MountPoint,
    Volume,
};
use crate::services::EfsResolver;
use crate::utils::slugify_path;

/// A resolved volume plus where it appears inside the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountSpec {
    pub mount_path: PathBuf,
    pub volume_name: String,
    pub read_only: bool,
    pub file_system_id: String,
    pub access_point_id: String,
    /// Access point root inside the file system
    pub root_directory: PathBuf,
}

impl MountSpec {
    /// Batch volume backed by the access point.
    pub fn volume(&self) -> Volume {
        Volume {
            name: self.volume_name.clone(),
            efs_volume_configuration: EfsVolumeConfiguration {
                file_system_id: self.file_system_id.clone(),
                root_directory: "/".to_string(),
                transit_encryption: "ENABLED".to_string(),
                authorization_config: Some(EfsAuthorizationConfig {
                    access_point_id: self.access_point_id.clone(),
                    iam: "DISABLED".to_string(),
                }),
            },
        }
    }

    pub fn mount_point(&self) -> MountPoint {
        MountPoint {
            container_path: self.mount_path.display().to_string(),
            read_only: self.read_only,
            source_volume: self.volume_name.clone(),
        }
    }

    /// Location in the file system of a path seen inside the container.
    pub fn efs_path(&self, container_path: &Path) -> Result<EfsPath> {
        let relative = container_path.strip_prefix(&self.mount_path).map_err(|_| {
            AppError::invalid_input(format!(
                "{} is not under mount {}",
                container_path.display(),
                self.mount_path.display()
            ))
        })?;
        let path = if relative.as_os_str().is_empty() {
            self.root_directory.clone()
        } else {
            self.root_directory.join(relative)
        };
        EfsPath::new(self.file_system_id.clone(), path)
    }
}

/// Volume name for a file system mounted at `mount_path`.
pub fn volume_name(file_system_id: &str, mount_path: &Path) -> String {
    format!("{}-{}-vol", file_system_id, slugify_path(mount_path))
}

/// Resolves mounts through an [`EfsResolver`].
pub struct MountResolver<'a> {
    resolver: &'a dyn EfsResolver,
    env_base: Option<&'a str>,
}

impl<'a> MountResolver<'a> {
    pub fn new(resolver: &'a dyn EfsResolver, env_base: Option<&'a str>) -> Self {
        Self { resolver, env_base }
    }

    /// Resolve `config` into a mount at its container path, or at
    /// `default_container_path` when none is set.
    ///
    /// The access point is required; a file system, when also given, must own it.
    pub async fn resolve(
        &self,
        config: &FileSystemConfiguration,
        default_container_path: &Path,
        read_only: bool,
    ) -> Result<MountSpec> {
        let mount_path = config
            .container_path
            .clone()
            .unwrap_or_else(|| default_container_path.to_path_buf());
        if !mount_path.is_absolute() {
            return Err(AppError::invalid_input(format!(
                "container_path {} must be absolute",
                mount_path.display()
            )));
        }

        let access_point_name = config.access_point_id.as_deref().ok_or_else(|| {
            AppError::invalid_input(format!(
                "no access point given for mount {}",
                mount_path.display()
            ))
        })?;

        let file_system = match config.file_system_id.as_deref() {
            Some(fs) => Some(self.resolver.file_system(fs, self.env_base).await?),
            None => None,
        };
        let access_point = self
            .resolver
            .access_point(
                access_point_name,
                file_system.as_ref().map(|fs| fs.id.as_str()),
                self.env_base,
            )
            .await?;

        if let Some(fs) = &file_system {
            if fs.id != access_point.file_system_id {
                return Err(AppError::invalid_input(format!(
                    "access point {} belongs to {}, not {}",
                    access_point.id, access_point.file_system_id, fs.id
                )));
            }
        }

        let spec = MountSpec {
            volume_name: volume_name(&access_point.file_system_id, &mount_path),
            mount_path,
            read_only,
            file_system_id: access_point.file_system_id,
            access_point_id: access_point.id,
            root_directory: access_point.root_directory,
        };
        info!(
            volume = %spec.volume_name,
            access_point = %spec.access_point_id,
            read_only,
            "Resolved mount at {}",
            spec.mount_path.display()
        );
        Ok(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{
        AccessPointDescriptor, EfsInventory, FileSystemDescriptor, StaticEfsResolver,
    };
    use serde_json::json;

    fn resolver() -> StaticEfsResolver {
        StaticEfsResolver::new(EfsInventory {
            file_systems: vec![
                FileSystemDescriptor {
                    id: "fs-123456789012".into(),
                    name: None,
                    used_bytes: 0,
                    tags: Default::default(),
                },
                FileSystemDescriptor {
                    id: "fs-999999999999".into(),
                    name: None,
                    used_bytes: 0,
                    tags: Default::default(),
                },
            ],
            access_points: vec![AccessPointDescriptor {
                id: "fsap-123456789012".into(),
                file_system_id: "fs-123456789012".into(),
                name: None,
                root_directory: PathBuf::from("/scratch"),
                tags: [("Name".to_string(), "scratch".to_string())].into_iter().collect(),
            }],
        })
    }

    #[test]
    fn test_volume_name() {
        assert_eq!(
            volume_name("fs-123456789012", Path::new("/opt/efs")),
            "fs-123456789012-opt-efs-vol"
        );
        assert_eq!(
            volume_name("fs-1", Path::new("/opt/efs/shared")),
            volume_name("fs-1", Path::new("/opt/efs/shared"))
        );
        assert_ne!(
            volume_name("fs-1", Path::new("/opt/efs/shared")),
            volume_name("fs-1", Path::new("/opt/efs/scratch"))
        );
        assert_ne!(
            volume_name("fs-1", Path::new("/opt/efs")),
            volume_name("fs-2", Path::new("/opt/efs"))
        );
        assert_ne!(
            volume_name("fs-1", Path::new("/opt/efs-x")),
            volume_name("fs-1", Path::new("/opt/efs/x"))
        );
    }

    #[tokio::test]
    async fn test_resolve_applies_default_path() {
        let resolver = resolver();
        let mounts = MountResolver::new(&resolver, None);
        let config = FileSystemConfiguration {
            access_point_id: Some("scratch".into()),
            ..Default::default()
        };

        let spec = mounts
            .resolve(&config, Path::new("/opt/efs/scratch"), false)
            .await
            .unwrap();
        assert_eq!(spec.mount_path, PathBuf::from("/opt/efs/scratch"));
        assert_eq!(spec.volume_name, "fs-123456789012-opt-efs-scratch-vol");
        assert_eq!(spec.access_point_id, "fsap-123456789012");

        assert_eq!(
            serde_json::to_value(spec.volume()).unwrap(),
            json!({
                "name": "fs-123456789012-opt-efs-scratch-vol",
                "efsVolumeConfiguration": {
                    "fileSystemId": "fs-123456789012",
                    "rootDirectory": "/",
                    "transitEncryption": "ENABLED",
                    "authorizationConfig": {"accessPointId": "fsap-123456789012", "iam": "DISABLED"}
                }
            })
        );
        assert_eq!(
            serde_json::to_value(spec.mount_point()).unwrap(),
            json!({
                "containerPath": "/opt/efs/scratch",
                "readOnly": false,
                "sourceVolume": "fs-123456789012-opt-efs-scratch-vol"
            })
        );
    }

    #[tokio::test]
    async fn test_efs_path_maps_through_access_point_root() {
        let resolver = resolver();
        let mounts = MountResolver::new(&resolver, None);
        let config = FileSystemConfiguration {
            access_point_id: Some("fsap-123456789012".into()),
            container_path: Some(PathBuf::from("/mnt/scratch")),
            ..Default::default()
        };
        let spec = mounts
            .resolve(&config, Path::new("/opt/efs/scratch"), false)
            .await
            .unwrap();

        let path = spec.efs_path(Path::new("/mnt/scratch/run-1/outs")).unwrap();
        assert_eq!(path.to_string(), "fs-123456789012:/scratch/run-1/outs");
        assert!(spec.efs_path(Path::new("/elsewhere")).is_err());
    }

    #[tokio::test]
    async fn test_mismatched_file_system_rejected() {
        let resolver = resolver();
        let mounts = MountResolver::new(&resolver, None);
        let config = FileSystemConfiguration {
            file_system_id: Some("fs-999999999999".into()),
            access_point_id: Some("fsap-123456789012".into()),
            container_path: None,
        };
        assert!(
            mounts
                .resolve(&config, Path::new("/opt/efs/shared"), true)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_relative_container_path_rejected() {
        let resolver = resolver();
        let mounts = MountResolver::new(&resolver, None);
        let config = FileSystemConfiguration {
            access_point_id: Some("scratch".into()),
            container_path: Some(PathBuf::from("opt/efs")),
            ..Default::default()
        };
        let err = mounts
            .resolve(&config, Path::new("/opt/efs/scratch"), false)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }
}
