//! Scaffolding assembly for one demand execution.
//!
//! Steps, in order:
//! 1. Select shared, scratch, and optional tmp file systems
//! 2. Resolve them into mounts
//! 3. Rewrite execution parameters to container paths
//! 4. Build environment and command
//! 5. Emit the Batch job plus setup and cleanup requests
//!
//! The only side effect, the env file write, happens after every other step
//! has succeeded.

use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::json;
use tracing::info;

use crate::error::{AppError, Result};
use crate::models::{
    BatchJobSpec, DataPath, DataSyncRequest, DemandExecution, DemandExecutionCleanupConfigs,
    DemandExecutionSetupConfigs, FileSystemConfiguration, PrepareDemandScaffoldingRequest,
    PrepareDemandScaffoldingResponse, RemoveDataPathsRequest, ResourceRequirement, RetryStrategy,
    ScaffoldingConfig,
};
use crate::pipeline::environment::{
    EnvironmentMaterializer, InfrastructureEnv, build_command, job_environment,
};
use crate::pipeline::mount::{MountResolver, MountSpec};
use crate::pipeline::paths::{MountedPath, RewrittenParameters, rewrite_parameters};
use crate::pipeline::select::FileSystemSelector;
use crate::services::EfsResolver;
use crate::services::efs::ENV_BASE_TAG;
use crate::storage::SharedStorage;
use crate::utils::{seed_from, sha256_hex};

/// Mounts chosen for one execution.
#[derive(Debug, Clone)]
struct Mounts {
    shared: MountSpec,
    scratch: MountSpec,
    tmp: Option<MountSpec>,
}

impl Mounts {
    fn iter(&self) -> impl Iterator<Item = &MountSpec> {
        [&self.shared, &self.scratch]
            .into_iter()
            .chain(self.tmp.as_ref())
    }

    /// Reject two roles mounted at the same container path.
    fn check_distinct(&self) -> Result<()> {
        let mounts: Vec<&MountSpec> = self.iter().collect();
        for (i, a) in mounts.iter().enumerate() {
            for b in &mounts[i + 1..] {
                if a.mount_path == b.mount_path {
                    return Err(AppError::invalid_input(format!(
                        "file system roles collide at {}",
                        a.mount_path.display()
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Produces [`PrepareDemandScaffoldingResponse`]s.
#[derive(Clone)]
pub struct ScaffoldingAssembler {
    config: ScaffoldingConfig,
    resolver: Arc<dyn EfsResolver>,
    storage: Arc<dyn SharedStorage>,
}

impl ScaffoldingAssembler {
    pub fn new(
        config: ScaffoldingConfig,
        resolver: Arc<dyn EfsResolver>,
        storage: Arc<dyn SharedStorage>,
    ) -> Self {
        Self {
            config,
            resolver,
            storage,
        }
    }

    pub fn config(&self) -> &ScaffoldingConfig {
        &self.config
    }

    /// Build the full scaffolding for `request`.
    pub async fn prepare(
        &self,
        request: &PrepareDemandScaffoldingRequest,
    ) -> Result<PrepareDemandScaffoldingResponse> {
        let execution = &request.demand_execution;
        let context = &request.context_manager_configuration;

        request.file_system_configurations.validate()?;
        validate_execution_id(&execution.execution_id)?;
        let job_queue_name = execution.job_queue_name()?.to_string();

        info!(
            execution_id = %execution.execution_id,
            execution_type = %execution.execution_type,
            "Preparing demand scaffolding"
        );

        let mounts = self.select_mounts(request).await?;
        mounts.check_distinct()?;

        let scratch = &mounts.scratch;
        let working_container = scratch.mount_path.join(&execution.execution_id);
        let working = MountedPath::new(&working_container, scratch.efs_path(&working_container)?);
        let shared = MountedPath::new(
            &mounts.shared.mount_path,
            mounts.shared.efs_path(&mounts.shared.mount_path)?,
        );
        let tmp_dir = match &mounts.tmp {
            Some(tmp) => tmp.mount_path.clone(),
            None => scratch.mount_path.join("tmp"),
        };

        let rewritten = rewrite_parameters(
            &execution.execution_parameters,
            &shared,
            &working,
            context.isolate_inputs,
        )?;

        let env = job_environment(&rewritten.parameters)?;
        let materializer = EnvironmentMaterializer::new(
            self.storage.as_ref(),
            self.config.environment.file_threshold_bytes,
        );
        let materialized = materializer.plan(
            &execution.execution_id,
            &InfrastructureEnv {
                env_base: self.config.env_base.clone(),
                aws_region: self.config.aws_region.clone(),
                working_dir: working.container_path.clone(),
                tmp_dir,
            },
            &env,
            context.env_file_write_mode,
            &working,
        );
        let command = build_command(
            &rewritten.parameters.command,
            materialized.command_prefix.as_deref(),
        )?;

        let batch_create_request = self.job_spec(
            execution,
            job_queue_name,
            command,
            materialized.environment.clone(),
            &mounts,
        )?;
        let setup_configs = DemandExecutionSetupConfigs {
            data_sync_requests: self.pre_sync_requests(request, &rewritten),
            batch_create_request,
        };
        let cleanup_configs = self.cleanup_configs(request, &rewritten, &working);

        materializer.write(&materialized).await?;

        info!(
            execution_id = %execution.execution_id,
            job_definition = %setup_configs.batch_create_request.job_definition_name,
            env_file = materialized.uses_file(),
            pre_syncs = setup_configs.data_sync_requests.len(),
            post_syncs = cleanup_configs.data_sync_requests.len(),
            removals = cleanup_configs.remove_data_paths_requests.len(),
            "Prepared demand scaffolding"
        );

        Ok(PrepareDemandScaffoldingResponse {
            demand_execution: DemandExecution {
                execution_parameters: rewritten.parameters,
                ..execution.clone()
            },
            setup_configs,
            cleanup_configs,
        })
    }

    async fn select_mounts(&self, request: &PrepareDemandScaffoldingRequest) -> Result<Mounts> {
        let configs = &request.file_system_configurations;
        let execution_id = request.demand_execution.execution_id.as_str();
        let env_base = Some(self.config.env_base.as_str());
        let selector = FileSystemSelector::new(self.resolver.as_ref(), env_base);
        let resolver = MountResolver::new(self.resolver.as_ref(), env_base);
        let mount = &self.config.mount;
        let names = &self.config.access_points;

        let scratch = selector
            .select(
                &configs.scratch,
                configs.selection_strategy,
                Some(role_seed(execution_id, "scratch")),
            )
            .await?;
        let scratch = resolver
            .resolve(
                &with_default_access_point(scratch, &names.scratch),
                &mount.scratch_path,
                false,
            )
            .await?;

        let shared = selector
            .select(
                &configs.shared,
                configs.selection_strategy,
                Some(role_seed(execution_id, "shared")),
            )
            .await?;
        let shared = resolver
            .resolve(
                &with_default_access_point(shared, &names.shared),
                &mount.shared_path,
                true,
            )
            .await?;

        let tmp = match configs.tmp_candidates() {
            Some(candidates) => {
                let tmp = selector
                    .select(
                        candidates,
                        configs.selection_strategy,
                        Some(role_seed(execution_id, "tmp")),
                    )
                    .await?;
                Some(
                    resolver
                        .resolve(
                            &with_default_access_point(tmp, &names.tmp),
                            &mount.tmp_path,
                            false,
                        )
                        .await?,
                )
            }
            None => None,
        };

        Ok(Mounts {
            shared,
            scratch,
            tmp,
        })
    }

    fn job_spec(
        &self,
        execution: &DemandExecution,
        job_queue_name: String,
        command: Vec<String>,
        environment: IndexMap<String, String>,
        mounts: &Mounts,
    ) -> Result<BatchJobSpec> {
        let env_base = &self.config.env_base;
        let execution_type = &execution.execution_type;
        let mount_points: Vec<_> = mounts.iter().map(MountSpec::mount_point).collect();
        let volumes: Vec<_> = mounts.iter().map(MountSpec::volume).collect();
        let resource_requirements =
            ResourceRequirement::from_demand(&execution.resource_requirements);

        // Identical definitions share a name, so Batch can reuse them
        let definition = json!({
            "image": execution.execution_image,
            "command": command,
            "environment": environment,
            "mount_points": mount_points,
            "volumes": volumes,
            "resource_requirements": resource_requirements,
            "privileged": false,
        });
        let digest = sha256_hex(serde_json::to_vec(&definition)?);

        let mut job_definition_tags = IndexMap::new();
        job_definition_tags.insert(ENV_BASE_TAG.to_string(), env_base.clone());
        job_definition_tags.insert("execution_type".to_string(), execution_type.clone());

        Ok(BatchJobSpec {
            image: execution.execution_image.clone(),
            job_definition_name: format!("{env_base}-{execution_type}-{digest}"),
            job_name: format!("{env_base}-{execution_type}-{}", execution.execution_id),
            job_queue_name,
            job_definition_tags,
            command,
            environment,
            resource_requirements,
            mount_points,
            volumes,
            retry_strategy: Some(RetryStrategy::infrastructure_only(
                self.config.batch.retry_attempts,
            )),
            privileged: false,
        })
    }

    fn pre_sync_requests(
        &self,
        request: &PrepareDemandScaffoldingRequest,
        rewritten: &RewrittenParameters,
    ) -> Vec<DataSyncRequest> {
        let sync = request.context_manager_configuration.input_sync();
        rewritten
            .inputs
            .iter()
            .map(|input| {
                DataSyncRequest::new(
                    input.remote.clone(),
                    DataPath::Efs(input.location.efs_path.clone()),
                    true,
                    &sync,
                )
            })
            .collect()
    }

    fn cleanup_configs(
        &self,
        request: &PrepareDemandScaffoldingRequest,
        rewritten: &RewrittenParameters,
        working: &MountedPath,
    ) -> DemandExecutionCleanupConfigs {
        let context = &request.context_manager_configuration;
        let sync = context.output_sync();

        let data_sync_requests = rewritten
            .outputs
            .iter()
            .map(|output| {
                DataSyncRequest::new(
                    DataPath::Efs(output.location.efs_path.clone()),
                    output.remote.clone(),
                    false,
                    &sync,
                )
            })
            .collect();

        let mut remove_data_paths_requests = Vec::new();
        if context.cleanup_inputs && !rewritten.inputs.is_empty() {
            remove_data_paths_requests.push(RemoveDataPathsRequest {
                paths: rewritten
                    .inputs
                    .iter()
                    .map(|input| DataPath::Efs(input.location.efs_path.clone()))
                    .collect(),
            });
        }
        if context.cleanup_working_dir {
            remove_data_paths_requests.push(RemoveDataPathsRequest {
                paths: vec![DataPath::Efs(working.efs_path.clone())],
            });
        }

        DemandExecutionCleanupConfigs {
            data_sync_requests,
            remove_data_paths_requests,
        }
    }
}

/// Fill the role's default access point name when none was requested.
fn with_default_access_point(
    mut config: FileSystemConfiguration,
    default_name: &str,
) -> FileSystemConfiguration {
    if config.access_point_id.is_none() {
        config.access_point_id = Some(default_name.to_string());
    }
    config
}

/// Selection seed for one role of one execution.
fn role_seed(execution_id: &str, role: &str) -> u64 {
    seed_from(&format!("{execution_id}/{role}"))
}

/// The execution id names the working directory, so it must be one path segment.
fn validate_execution_id(execution_id: &str) -> Result<()> {
    let mut components = Path::new(execution_id).components();
    let single_segment = matches!(
        (components.next(), components.next()),
        (Some(std::path::Component::Normal(_)), None)
    );
    if execution_id.trim().is_empty() || !single_segment || execution_id.contains('/') {
        return Err(AppError::invalid_input(format!(
            "execution_id '{execution_id}' must be a single path segment"
        )));
    }
    Ok(())
}
