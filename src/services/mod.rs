//! External collaborators consulted while preparing scaffolding.
//!
//! - EFS file-system and access-point lookup (`EfsResolver`)

pub mod efs;

#[cfg(feature = "aws")]
pub use efs::AwsEfsResolver;
pub use efs::{
    AccessPointDescriptor, EfsInventory, EfsResolver, FileSystemDescriptor, StaticEfsResolver,
};
