//! Choosing one file system among several candidates for a role.

use std::collections::HashMap;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::error::{AppError, Result};
use crate::models::{FileSystemConfiguration, SelectionStrategy};
use crate::services::{EfsResolver, FileSystemDescriptor};

/// One way of picking a candidate.
#[async_trait]
pub trait Selector: Send + Sync {
    /// Pick one of at least two candidates.
    async fn select(&self, candidates: &[FileSystemConfiguration]) -> Result<FileSystemConfiguration>;
}

/// Uniform pick, reproducible when seeded.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomSelector {
    seed: Option<u64>,
}

impl RandomSelector {
    pub fn new(seed: Option<u64>) -> Self {
        Self { seed }
    }
}

#[async_trait]
impl Selector for RandomSelector {
    async fn select(&self, candidates: &[FileSystemConfiguration]) -> Result<FileSystemConfiguration> {
        let index = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed).random_range(0..candidates.len()),
            None => rand::rng().random_range(0..candidates.len()),
        };
        Ok(candidates[index].clone())
    }
}

/// Picks the candidate whose file system reports the fewest used bytes.
pub struct LeastUtilizedSelector<'a> {
    resolver: &'a dyn EfsResolver,
    env_base: Option<&'a str>,
}

impl<'a> LeastUtilizedSelector<'a> {
    pub fn new(resolver: &'a dyn EfsResolver, env_base: Option<&'a str>) -> Self {
        Self { resolver, env_base }
    }

    async fn describe(
        &self,
        cache: &mut HashMap<String, FileSystemDescriptor>,
        name_or_id: &str,
    ) -> Result<FileSystemDescriptor> {
        if let Some(descriptor) = cache.get(name_or_id) {
            return Ok(descriptor.clone());
        }
        let descriptor = self.resolver.file_system(name_or_id, self.env_base).await?;
        cache.insert(name_or_id.to_string(), descriptor.clone());
        if descriptor.id != name_or_id {
            cache.insert(descriptor.id.clone(), descriptor.clone());
        }
        Ok(descriptor)
    }

    /// Resolve a candidate's file system, filling its id when only an access
    /// point was given.
    async fn resolve(
        &self,
        cache: &mut HashMap<String, FileSystemDescriptor>,
        candidate: &FileSystemConfiguration,
    ) -> Result<(FileSystemConfiguration, FileSystemDescriptor)> {
        let mut resolved = candidate.clone();
        let descriptor = match (&candidate.file_system_id, &candidate.access_point_id) {
            (Some(fs), _) => self.describe(cache, fs).await?,
            (None, Some(ap)) => {
                let access_point = self.resolver.access_point(ap, None, self.env_base).await?;
                let descriptor = self.describe(cache, &access_point.file_system_id).await?;
                resolved.file_system_id = Some(descriptor.id.clone());
                descriptor
            }
            (None, None) => {
                return Err(AppError::invalid_input(
                    "LEAST_UTILIZED selection needs a file_system or access_point on every candidate",
                ));
            }
        };
        Ok((resolved, descriptor))
    }
}

#[async_trait]
impl Selector for LeastUtilizedSelector<'_> {
    async fn select(&self, candidates: &[FileSystemConfiguration]) -> Result<FileSystemConfiguration> {
        // Per-call cache: several candidates often share one file system
        let mut cache = HashMap::new();
        let mut best: Option<(FileSystemConfiguration, u64)> = None;

        for candidate in candidates {
            let (resolved, descriptor) = self.resolve(&mut cache, candidate).await?;
            debug!(
                file_system = %descriptor.id,
                used_bytes = descriptor.used_bytes,
                "Candidate utilization"
            );
            // Strictly smaller only, so ties keep the earliest candidate
            if best
                .as_ref()
                .is_none_or(|(_, used)| descriptor.used_bytes < *used)
            {
                best = Some((resolved, descriptor.used_bytes));
            }
        }

        best.map(|(config, _)| config)
            .ok_or_else(|| AppError::invalid_input("no file system candidates"))
    }
}

/// Strategy dispatch for file-system selection.
pub struct FileSystemSelector<'a> {
    resolver: &'a dyn EfsResolver,
    env_base: Option<&'a str>,
}

impl<'a> FileSystemSelector<'a> {
    pub fn new(resolver: &'a dyn EfsResolver, env_base: Option<&'a str>) -> Self {
        Self { resolver, env_base }
    }

    /// Pick one candidate according to `strategy`.
    ///
    /// A single candidate is returned as is, even without identifiers.
    pub async fn select(
        &self,
        candidates: &[FileSystemConfiguration],
        strategy: SelectionStrategy,
        seed: Option<u64>,
    ) -> Result<FileSystemConfiguration> {
        match candidates {
            [] => Err(AppError::invalid_input("no file system candidates to select from")),
            [only] => Ok(only.clone()),
            _ => match strategy {
                SelectionStrategy::Random => RandomSelector::new(seed).select(candidates).await,
                SelectionStrategy::LeastUtilized => {
                    LeastUtilizedSelector::new(self.resolver, self.env_base)
                        .select(candidates)
                        .await
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{AccessPointDescriptor, EfsInventory, StaticEfsResolver};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts file-system lookups made through the wrapped resolver.
    struct CountingResolver {
        inner: StaticEfsResolver,
        file_system_calls: AtomicUsize,
    }

    #[async_trait]
    impl EfsResolver for CountingResolver {
        async fn file_system(
            &self,
            name_or_id: &str,
            env_base: Option<&str>,
        ) -> Result<FileSystemDescriptor> {
            self.file_system_calls.fetch_add(1, Ordering::SeqCst);
            self.inner.file_system(name_or_id, env_base).await
        }

        async fn access_point(
            &self,
            name_or_id: &str,
            file_system_id: Option<&str>,
            env_base: Option<&str>,
        ) -> Result<AccessPointDescriptor> {
            self.inner
                .access_point(name_or_id, file_system_id, env_base)
                .await
        }
    }

    fn file_system(id: &str, used_bytes: u64) -> FileSystemDescriptor {
        FileSystemDescriptor {
            id: id.to_string(),
            name: None,
            used_bytes,
            tags: Default::default(),
        }
    }

    fn resolver() -> CountingResolver {
        CountingResolver {
            inner: StaticEfsResolver::new(EfsInventory {
                file_systems: vec![
                    file_system("fs-a", 2000),
                    file_system("fs-b", 1000),
                    file_system("fs-c", 1000),
                ],
                access_points: vec![AccessPointDescriptor {
                    id: "fsap-c".to_string(),
                    file_system_id: "fs-c".to_string(),
                    name: None,
                    root_directory: PathBuf::from("/"),
                    tags: Default::default(),
                }],
            }),
            file_system_calls: AtomicUsize::new(0),
        }
    }

    fn by_fs(id: &str) -> FileSystemConfiguration {
        FileSystemConfiguration {
            file_system_id: Some(id.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_least_utilized_breaks_ties_by_order() {
        let resolver = resolver();
        let selector = FileSystemSelector::new(&resolver, None);
        let candidates = vec![by_fs("fs-a"), by_fs("fs-b"), by_fs("fs-c")];

        let chosen = selector
            .select(&candidates, SelectionStrategy::LeastUtilized, None)
            .await
            .unwrap();
        assert_eq!(chosen.file_system_id.as_deref(), Some("fs-b"));
    }

    #[tokio::test]
    async fn test_least_utilized_caches_lookups() {
        let resolver = resolver();
        let selector = FileSystemSelector::new(&resolver, None);
        let candidates = vec![by_fs("fs-a"), by_fs("fs-a"), by_fs("fs-b"), by_fs("fs-a")];

        selector
            .select(&candidates, SelectionStrategy::LeastUtilized, None)
            .await
            .unwrap();
        assert_eq!(resolver.file_system_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_access_point_candidate_gets_file_system_filled() {
        let resolver = resolver();
        let selector = FileSystemSelector::new(&resolver, None);
        let via_ap = FileSystemConfiguration {
            access_point_id: Some("fsap-c".to_string()),
            ..Default::default()
        };
        let candidates = vec![by_fs("fs-a"), via_ap.clone()];

        let chosen = selector
            .select(&candidates, SelectionStrategy::LeastUtilized, None)
            .await
            .unwrap();
        assert_eq!(chosen.file_system_id.as_deref(), Some("fs-c"));
        assert_eq!(chosen.access_point_id.as_deref(), Some("fsap-c"));
        // Input untouched
        assert!(candidates[1].file_system_id.is_none());
    }

    #[tokio::test]
    async fn test_least_utilized_requires_ids() {
        let resolver = resolver();
        let selector = FileSystemSelector::new(&resolver, None);
        let candidates = vec![by_fs("fs-a"), FileSystemConfiguration::default()];

        let err = selector
            .select(&candidates, SelectionStrategy::LeastUtilized, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_single_candidate_without_ids() {
        let resolver = resolver();
        let selector = FileSystemSelector::new(&resolver, None);
        let only = FileSystemConfiguration {
            container_path: Some(PathBuf::from("/opt/efs/scratch")),
            ..Default::default()
        };

        for strategy in [SelectionStrategy::Random, SelectionStrategy::LeastUtilized] {
            let chosen = selector
                .select(std::slice::from_ref(&only), strategy, None)
                .await
                .unwrap();
            assert_eq!(chosen, only);
        }
        assert_eq!(resolver.file_system_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_candidates_rejected() {
        let resolver = resolver();
        let selector = FileSystemSelector::new(&resolver, None);
        let err = selector
            .select(&[], SelectionStrategy::Random, Some(1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_seeded_random_is_reproducible() {
        let resolver = resolver();
        let selector = FileSystemSelector::new(&resolver, None);
        let candidates: Vec<_> = (0..8).map(|i| by_fs(&format!("fs-{i}"))).collect();

        let first = selector
            .select(&candidates, SelectionStrategy::Random, Some(42))
            .await
            .unwrap();
        for _ in 0..5 {
            let again = selector
                .select(&candidates, SelectionStrategy::Random, Some(42))
                .await
                .unwrap();
            assert_eq!(again, first);
        }
    }
}
