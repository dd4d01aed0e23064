//! Deployment orchestration.
//!
//! Provides:
//! - `Deployer` - Run package, upload and install phases in order
//! - `DeployPlan` - What a deployment would do, for dry runs

pub mod deployer;
pub mod plan;

pub use deployer::{DeployError, DeployReport, Deployer, Phase};
pub use plan::DeployPlan;
