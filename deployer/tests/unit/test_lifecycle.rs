//! Lifecycle engine and registry tests against in-memory collaborators

mod stubs;

use std::collections::HashMap;

use tokio_test::assert_ok;

use glidergun::deploy::engine::{NetworkOptions, RegistryCredentials, RegistryOptions};
use glidergun::docker::log_stream::{LogFrame, StreamKind};
use glidergun::docker::{ImageSummary, NetworkSummary};
use glidergun::filesys::file::File;
use glidergun::models::deployment::{DeploymentAction, DeploymentState};
use secrecy::SecretString;
use stubs::{deployment_container, Harness, EXTERNAL_IP};

fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

#[tokio::test]
async fn test_deploy_then_get_running() {
    let harness = Harness::new();

    let outcome = harness
        .engine
        .deploy("d1", "myimg:latest", params(&[("a", "1")]), params(&[("secret", "s")]))
        .await
        .unwrap();

    assert_eq!(outcome.state, DeploymentState::Initiated);
    assert_eq!(outcome.action, "Deploy");
    assert_eq!(outcome.deployment_id, "d1");

    let deployment = harness.registry.get_deployment("d1").await.unwrap().unwrap();
    assert_eq!(deployment.state, DeploymentState::Running);
    assert_eq!(deployment.action, Some(DeploymentAction::Deploy));
    assert!(deployment.outputs.is_empty());
}

#[tokio::test]
async fn test_deploy_stages_parameters_and_secrets() {
    let harness = Harness::new();

    harness
        .engine
        .deploy("d1", "myimg:latest", params(&[("a", "1")]), params(&[("secret", "s")]))
        .await
        .unwrap();

    let tfvars = File::new(harness.temp.path().join("local/d1/tfvars.json"));
    let written: HashMap<String, String> = tfvars.read_json().await.unwrap();
    assert_eq!(written.get("a").map(String::as_str), Some("1"));
    assert_eq!(written.get("deployment_ip").map(String::as_str), Some(EXTERNAL_IP));
    assert!(!written.contains_key("secret"));

    let secrets = harness.store.secrets.lock().unwrap();
    assert_eq!(secrets["secret/glidergun/d1"].get("secret").map(String::as_str), Some("s"));
    assert!(harness.temp.path().join("host/d1").is_dir());
}

#[tokio::test]
async fn test_deploy_launches_labelled_container() {
    let harness = Harness::new();

    harness
        .engine
        .deploy("d1", "myimg:v2", HashMap::new(), HashMap::new())
        .await
        .unwrap();

    assert_eq!(*harness.runtime.pulled.lock().unwrap(), vec!["myimg:v2".to_string()]);

    let created = harness.runtime.created.lock().unwrap();
    assert_eq!(created.len(), 1);

    let spec = &created[0];
    assert_eq!(spec.name, "deploy-d1");
    assert_eq!(spec.image, "myimg:v2");
    assert_eq!(spec.labels["task.type"], "deployment");
    assert_eq!(spec.labels["deployment.id"], "d1");
    assert_eq!(spec.labels["deployment.action"], "Deploy");
    assert_eq!(spec.labels["deployment.image.deploy.tag"], "myimg:v2");
    assert_eq!(spec.labels["deployment.image.destroy.tag"], "myimg:v2-destroy");

    let host_dir = harness.temp.path().join("host").join("d1");
    assert_eq!(spec.binds, vec![format!("{}:/root/state", host_dir.display())]);

    assert!(spec.env.contains(&"ANSIBLE_NOCOLOR=1".to_string()));
    assert!(spec.env.contains(&"VAULT_ADDR=http://vault:8200".to_string()));
    assert!(spec.env.contains(&"VAULT_PATH=secret/glidergun/d1".to_string()));
    assert!(spec.env.contains(&"VAULT_TOKEN=s.root".to_string()));
    assert!(spec.network.is_none());
}

#[tokio::test]
async fn test_deploy_qualifies_image_and_attaches_network() {
    let registry = RegistryOptions {
        address: Some("registry.example.com:5000".to_string()),
        namespace: Some("templates".to_string()),
        credentials: Some(RegistryCredentials {
            username: "deployer".to_string(),
            password: SecretString::from("hunter2"),
        }),
    };
    let network = NetworkOptions {
        name: "deployers".to_string(),
        links: vec!["vault".to_string()],
    };
    let harness = Harness::build(registry, Some(network), false);
    harness.runtime.networks.lock().unwrap().push(NetworkSummary {
        id: "net-1".to_string(),
        name: "deployers".to_string(),
    });

    let outcome = harness
        .engine
        .deploy("d1", "tmpl:v1", HashMap::new(), HashMap::new())
        .await
        .unwrap();
    assert_eq!(outcome.state, DeploymentState::Initiated);

    let qualified = "registry.example.com:5000/templates/tmpl:v1";
    assert_eq!(*harness.runtime.pulled.lock().unwrap(), vec![qualified.to_string()]);

    let created = harness.runtime.created.lock().unwrap();
    assert_eq!(created[0].image, qualified);
    assert_eq!(
        created[0].labels["deployment.image.destroy.tag"],
        "registry.example.com:5000/templates/tmpl:v1-destroy"
    );

    let network = created[0].network.as_ref().unwrap();
    assert_eq!(network.network_id, "net-1");
    assert_eq!(network.links, vec!["vault:vault".to_string()]);
}

#[tokio::test]
async fn test_deploy_missing_network_fails() {
    let network = NetworkOptions {
        name: "deployers".to_string(),
        links: vec![],
    };
    let harness = Harness::build(RegistryOptions::default(), Some(network), false);

    let outcome = harness
        .engine
        .deploy("d1", "tmpl:v1", HashMap::new(), HashMap::new())
        .await
        .unwrap();

    assert_eq!(outcome.state, DeploymentState::Failed);
    assert!(harness.runtime.created.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_deploy_pull_failure_aborts() {
    let harness = Harness::new();
    *harness.runtime.fail_pull.lock().unwrap() = true;

    let outcome = harness
        .engine
        .deploy("d1", "missing:v1", HashMap::new(), params(&[("secret", "s")]))
        .await
        .unwrap();

    assert_eq!(outcome.state, DeploymentState::Failed);
    assert!(harness.runtime.created.lock().unwrap().is_empty());
    assert!(harness.store.secrets.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_deploy_lookup_failure_fails() {
    let harness = Harness::build(RegistryOptions::default(), None, true);

    let outcome = harness
        .engine
        .deploy("d1", "myimg:latest", HashMap::new(), HashMap::new())
        .await
        .unwrap();

    assert_eq!(outcome.state, DeploymentState::Failed);
    assert!(harness.runtime.created.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_deploy_create_failure_leaves_secrets() {
    let harness = Harness::new();
    *harness.runtime.fail_create.lock().unwrap() = true;

    let outcome = harness
        .engine
        .deploy("d1", "myimg:latest", HashMap::new(), params(&[("secret", "s")]))
        .await
        .unwrap();

    assert_eq!(outcome.state, DeploymentState::Failed);
    assert!(harness.store.secrets.lock().unwrap().contains_key("secret/glidergun/d1"));
}

#[tokio::test]
async fn test_validation_errors_are_returned() {
    let harness = Harness::new();

    let err = harness
        .engine
        .deploy("d1", "  ", HashMap::new(), HashMap::new())
        .await
        .unwrap_err();
    assert!(err.is_validation());

    let err = harness
        .engine
        .deploy("", "myimg:latest", HashMap::new(), HashMap::new())
        .await
        .unwrap_err();
    assert!(err.is_validation());

    assert!(harness.engine.destroy(" ").await.unwrap_err().is_validation());
    assert!(harness.engine.purge("").await.unwrap_err().is_validation());
    assert!(harness.registry.get_deployment("").await.unwrap_err().is_validation());
    assert!(harness.runtime.pulled.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_deploy_rejects_id_unusable_as_container_name() {
    let harness = Harness::new();

    let err = harness
        .engine
        .deploy("0HL8:0000001", "myimg:latest", params(&[("a", "1")]), params(&[("secret", "s")]))
        .await
        .unwrap_err();
    assert!(err.is_validation());

    assert!(harness.runtime.pulled.lock().unwrap().is_empty());
    assert!(harness.runtime.created.lock().unwrap().is_empty());
    assert!(harness.store.secrets.lock().unwrap().is_empty());
    assert!(!harness.state_dirs.local_root().subdir("0HL8:0000001").exists().await);
}

#[tokio::test]
async fn test_get_missing_deployment() {
    let harness = Harness::new();
    assert!(harness.registry.get_deployment("d1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_get_uses_latest_container() {
    let harness = Harness::new();
    harness.runtime.add_container(deployment_container(
        "old", "d1", "Deploy", 100, "exited", "Exited (0) 1 hour ago",
    ));
    harness.runtime.add_container(deployment_container(
        "new", "d1", "Destroy", 200, "running", "Up 5 seconds",
    ));
    harness.runtime.add_container(deployment_container(
        "other", "d2", "Deploy", 300, "running", "Up 1 second",
    ));

    let deployment = harness.registry.get_deployment("d1").await.unwrap().unwrap();
    assert_eq!(deployment.container_id, "new");
    assert_eq!(deployment.state, DeploymentState::Running);
    assert_eq!(deployment.action, Some(DeploymentAction::Destroy));
}

#[tokio::test]
async fn test_exited_state_mapping() {
    let cases = [
        ("Deploy", "Exited (0) 1 minute ago", DeploymentState::Deployed),
        ("Destroy", "Exited (0) 1 minute ago", DeploymentState::Destroyed),
        ("Deploy", "Exited (1) 1 minute ago", DeploymentState::Failed),
        ("Destroy", "Exited (2) 1 minute ago", DeploymentState::Failed),
    ];

    for (action, status, expected) in cases {
        let harness = Harness::new();
        harness
            .runtime
            .add_container(deployment_container("c1", "d1", action, 100, "exited", status));

        let deployment = harness.registry.get_deployment("d1").await.unwrap().unwrap();
        assert_eq!(deployment.state, expected, "{} / {}", action, status);
        assert!(deployment.is_complete());
    }
}

#[tokio::test]
async fn test_unexpected_runtime_state_is_unknown() {
    let harness = Harness::new();
    harness
        .runtime
        .add_container(deployment_container("c1", "d1", "Deploy", 100, "paused", "Up 1 minute (Paused)"));

    let deployment = harness.registry.get_deployment("d1").await.unwrap().unwrap();
    assert_eq!(deployment.state, DeploymentState::Unknown);
}

#[tokio::test]
async fn test_exited_deployment_attaches_logs_and_outputs() {
    let harness = Harness::new();
    harness.runtime.add_container(deployment_container(
        "c1", "d1", "Deploy", 100, "exited", "Exited (0) 1 minute ago",
    ));

    let state_dir = harness.temp.path().join("local").join("d1");
    File::new(state_dir.join("terraform.output.json"))
        .write_string(r#"{"server_ip": {"value": "10.0.0.5"}}"#)
        .await
        .unwrap();
    File::new(state_dir.join("logs").join("terraform.log"))
        .write_string("Apply complete!\n")
        .await
        .unwrap();

    let mut raw = LogFrame {
        stream: StreamKind::Stdout,
        payload: b"PLAY RECAP\n".to_vec(),
    }
    .encode();
    raw.extend(
        LogFrame {
            stream: StreamKind::Stderr,
            payload: b"done\n".to_vec(),
        }
        .encode(),
    );
    harness.runtime.logs.lock().unwrap().insert("c1".to_string(), raw);

    let deployment = harness.registry.get_deployment("d1").await.unwrap().unwrap();
    assert_eq!(deployment.state, DeploymentState::Deployed);
    assert_eq!(deployment.outputs["server_ip"]["value"], "10.0.0.5");

    let files: Vec<&str> = deployment.logs.iter().map(|l| l.file.as_str()).collect();
    assert_eq!(files, vec!["terraform.log", "ContainerLog"]);
    assert_eq!(deployment.logs[0].content, "Apply complete!\n");
    assert_eq!(deployment.logs[1].content, "PLAY RECAP\ndone\n");
}

#[tokio::test]
async fn test_get_deployment_survives_unreadable_container_log() {
    let harness = Harness::new();
    harness.runtime.add_container(deployment_container(
        "c1", "d1", "Deploy", 100, "exited", "Exited (0) 1 minute ago",
    ));
    File::new(harness.temp.path().join("local").join("d1").join("logs").join("terraform.log"))
        .write_string("Apply complete!\n")
        .await
        .unwrap();
    *harness.runtime.fail_logs.lock().unwrap() = true;

    let deployment = assert_ok!(harness.registry.get_deployment("d1").await).unwrap();

    assert_eq!(deployment.state, DeploymentState::Deployed);
    let files: Vec<&str> = deployment.logs.iter().map(|l| l.file.as_str()).collect();
    assert_eq!(files, vec!["terraform.log"]);
}

#[tokio::test]
async fn test_list_deployments() {
    let harness = Harness::new();
    harness.runtime.add_container(deployment_container(
        "c1", "d1", "Deploy", 100, "running", "Up 1 minute",
    ));
    harness.runtime.add_container(deployment_container(
        "c2", "d2", "Deploy", 200, "exited", "Exited (3) 1 minute ago",
    ));

    let mut deployments = harness.registry.list_deployments().await.unwrap();
    deployments.sort_by(|a, b| a.id.cmp(&b.id));

    assert_eq!(deployments.len(), 2);
    assert_eq!(deployments[0].state, DeploymentState::Running);
    assert_eq!(deployments[1].state, DeploymentState::Failed);
}

#[tokio::test]
async fn test_destroy_launches_destroyer() {
    let harness = Harness::new();
    assert_ok!(
        harness
            .engine
            .deploy("d1", "myimg:latest", HashMap::new(), HashMap::new())
            .await
    );

    let outcome = harness.engine.destroy("d1").await.unwrap();
    assert_eq!(outcome.state, DeploymentState::Running);
    assert_eq!(outcome.action, "Destroy");

    {
        let created = harness.runtime.created.lock().unwrap();
        assert_eq!(created.len(), 2);

        let spec = &created[1];
        assert_eq!(spec.name, "destroy-d1");
        assert_eq!(spec.image, "myimg:latest-destroy");
        assert_eq!(spec.labels["deployment.action"], "Destroy");
        assert_eq!(spec.labels["deployment.image.destroy.tag"], "myimg:latest-destroy");
        assert_eq!(spec.binds, created[0].binds);
        assert!(spec.env.contains(&"VAULT_PATH=secret/glidergun/d1".to_string()));
    }

    let deployment = harness.registry.get_deployment("d1").await.unwrap().unwrap();
    assert_eq!(deployment.action, Some(DeploymentAction::Destroy));
}

#[tokio::test]
async fn test_destroy_missing_deployment() {
    let harness = Harness::new();

    let outcome = harness.engine.destroy("d1").await.unwrap();
    assert_eq!(outcome.state, DeploymentState::NotFound);
    assert!(harness.runtime.created.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_purge_removes_everything() {
    let harness = Harness::new();
    harness
        .engine
        .deploy("d1", "myimg:latest", HashMap::new(), params(&[("secret", "s")]))
        .await
        .unwrap();
    harness.engine.destroy("d1").await.unwrap();
    harness.runtime.add_container(deployment_container(
        "c-other", "d2", "Deploy", 1, "running", "Up",
    ));

    let outcome = harness.engine.purge("d1").await.unwrap();
    assert_eq!(outcome.state, DeploymentState::Deleted);

    assert_eq!(harness.runtime.removed.lock().unwrap().len(), 2);
    assert_eq!(harness.runtime.container_ids(), vec!["c-other".to_string()]);
    assert!(harness.store.secrets.lock().unwrap().is_empty());
    assert!(harness.registry.get_deployment("d1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_purge_missing_deployment_is_harmless() {
    let harness = Harness::new();
    harness
        .store
        .secrets
        .lock()
        .unwrap()
        .insert("secret/glidergun/d2".to_string(), params(&[("k", "v")]));

    let outcome = harness.engine.purge("d1").await.unwrap();
    assert_eq!(outcome.state, DeploymentState::NotFound);

    assert!(harness.runtime.removed.lock().unwrap().is_empty());
    assert!(harness.store.secrets.lock().unwrap().contains_key("secret/glidergun/d2"));
}

#[tokio::test]
async fn test_purge_continues_when_secret_deletion_fails() {
    let harness = Harness::new();
    harness.runtime.add_container(deployment_container(
        "c1", "d1", "Deploy", 100, "exited", "Exited (0) 1 minute ago",
    ));
    *harness.store.fail_delete.lock().unwrap() = true;

    let outcome = harness.engine.purge("d1").await.unwrap();
    assert_eq!(outcome.state, DeploymentState::Deleted);
    assert_eq!(*harness.store.deletes.lock().unwrap(), vec!["secret/glidergun/d1".to_string()]);
    assert!(harness.runtime.container_ids().is_empty());
}

#[tokio::test]
async fn test_list_images() {
    let harness = Harness::new();
    harness.runtime.images.lock().unwrap().extend([
        ImageSummary {
            id: "sha256:tmpl".to_string(),
            repo_tags: vec!["tmpl:v1".to_string()],
            repo_digests: vec!["tmpl@sha256:abc".to_string()],
            created: 1_600_000_000,
            labels: HashMap::from([("dimensiondata".to_string(), "true".to_string())]),
        },
        ImageSummary {
            id: "sha256:other".to_string(),
            repo_tags: vec!["nginx:latest".to_string()],
            ..Default::default()
        },
    ]);

    let images = harness.registry.list_images().await.unwrap();
    assert_eq!(images.len(), 1);
    assert_eq!(images[0].id, "sha256:tmpl");
    assert!(images[0].digests.contains("tmpl@sha256:abc"));
}
