//! Container labels that identify deployments
//!
//! The runtime is the only store of deployment metadata: everything needed to
//! rebuild a deployment lives in these labels.

use std::collections::HashMap;

use crate::models::deployment::DeploymentAction;

pub const TASK_TYPE: &str = "task.type";
pub const TASK_TYPE_DEPLOYMENT: &str = "deployment";
pub const DEPLOYMENT_ID: &str = "deployment.id";
pub const DEPLOYMENT_ACTION: &str = "deployment.action";
pub const DEPLOY_IMAGE_TAG: &str = "deployment.image.deploy.tag";
pub const DESTROY_IMAGE_TAG: &str = "deployment.image.destroy.tag";

/// Labels for a container launched for `action`
pub fn deployment_labels(
    deployment_id: &str,
    action: DeploymentAction,
    deploy_image_tag: &str,
    destroy_image_tag: &str,
) -> HashMap<String, String> {
    HashMap::from([
        (TASK_TYPE.to_string(), TASK_TYPE_DEPLOYMENT.to_string()),
        (DEPLOYMENT_ID.to_string(), deployment_id.to_string()),
        (DEPLOYMENT_ACTION.to_string(), action.as_label().to_string()),
        (DEPLOY_IMAGE_TAG.to_string(), deploy_image_tag.to_string()),
        (DESTROY_IMAGE_TAG.to_string(), destroy_image_tag.to_string()),
    ])
}

/// Tag of the image that destroys what `deploy_image_tag` deployed.
///
/// `repo:tag` becomes `repo:tag-destroy` and `repo` becomes `repo:destroy`. A
/// tag that already names a destroyer (`repo:destroy`, `repo:v1-destroy`) is
/// returned unchanged. Destroyer images are built externally against exactly
/// this naming.
pub fn destroy_image_tag(deploy_image_tag: &str) -> String {
    match deploy_image_tag.split_once(':') {
        Some((_, tag)) if tag == "destroy" || tag.ends_with("-destroy") => {
            deploy_image_tag.to_string()
        }
        Some((repository, tag)) => format!("{}:{}-destroy", repository, tag),
        None => format!("{}:destroy", deploy_image_tag),
    }
}
