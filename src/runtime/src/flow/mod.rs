//! Flow instance deployment and inspection.
//!
//! An instance is one TOML definition file in the deploy directory, named
//! after the instance. Deploying regenerates that file from the artifact's
//! bundled template (or a minimal document) and the user's overrides.

pub mod deploy;
pub mod instance;
pub mod template;

pub use deploy::{deploy, deploy_local, DeployRequest, Deployment, ENTRYPOINT};
pub use instance::{
    instance_path, remove_instance, validate_instance_name, InstanceDefinition, InstanceRegistry,
    InstanceSummary, Instances, SUMMARY_COLUMNS,
};
pub use template::{find_template, set_nested, Overrides, TEMPLATE_CANDIDATES};
