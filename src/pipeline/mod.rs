//! Scaffolding pipeline stages.
//!
//! - `select`: pick one file system per role
//! - `mount`: resolve a file system into a container mount
//! - `paths`: rewrite parameters to container paths
//! - `environment`: inline variables or a sourced env file
//! - `scaffold`: run all of the above for one request

pub mod environment;
pub mod mount;
pub mod paths;
pub mod scaffold;
pub mod select;

pub use environment::{EnvironmentMaterializer, Materialized, build_command};
pub use mount::{MountResolver, MountSpec, volume_name};
pub use paths::{MountedPath, RewrittenParameters, rewrite_parameters};
pub use scaffold::ScaffoldingAssembler;
pub use select::{FileSystemSelector, LeastUtilizedSelector, RandomSelector, Selector};
