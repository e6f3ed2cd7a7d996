//! Provisioning orchestrator: create, poll, bootstrap, roll back.
//!
//! One invocation is one sequential transaction. The keypair registered at
//! the provider lives only for the duration of the create-server call; the
//! server itself survives a failed run only when retention was requested.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::bootstrap::{self, BootstrapRunner};
use crate::cloud::{CloudProvider, Flavor, Image, ServerDetails, ServerSpec};
use crate::keys::{KeyGenerator, KeyMaterial, keypair_name};
use crate::output::Reporter;
use crate::ssh::{DEFAULT_LOGIN_CANDIDATES, SshConnector, wait_for_ssh};
use crate::workspace::{BootstrapWorkspace, InventoryHost};

/// Everything the orchestrator needs, resolved and validated up front.
pub struct ProvisionConfig {
    pub name: String,
    pub group: String,
    pub flavor: Flavor,
    pub image: Image,
    pub network: Option<String>,
    pub availability_zone: Option<String>,
    pub config_drive: bool,
    pub boot_from_volume: bool,
    pub volume_size: String,
    pub volume: Option<String>,
    /// Budget for the provider's create wait and for SSH polling.
    pub timeout: Duration,
    /// Retain the instance (and workspace) on failure for debugging.
    pub keep: bool,
    /// Project directory containing the bootstrap playbook.
    pub project_dir: PathBuf,
    /// Roles search path for the playbook run.
    pub roles_path: PathBuf,
}

/// Identifiers of a successfully provisioned node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provisioned {
    pub id: String,
    pub public_v4: String,
    pub public_v6: String,
}

/// Primary outcome plus non-fatal rollback diagnostics. Cleanup failures
/// are observable here without ever replacing the triggering error.
pub struct ProvisionReport {
    pub result: Result<Provisioned>,
    pub rollback: Vec<String>,
}

/// Provision one node end to end.
///
/// Registers a fresh keypair, creates the server, disposes of the
/// provider-side keypair unconditionally as soon as the create call
/// returns, resolves a working SSH login, hands the host to the bootstrap
/// runner, and rolls the server back on any failure unless retention was
/// requested.
pub async fn provision<P, K, C, B>(
    provider: &P,
    keygen: &K,
    connector: &C,
    runner: &B,
    cfg: &ProvisionConfig,
    reporter: &impl Reporter,
) -> ProvisionReport
where
    P: CloudProvider,
    K: KeyGenerator,
    C: SshConnector,
    B: BootstrapRunner,
{
    let mut rollback = Vec::new();
    let result = build_server(provider, keygen, connector, runner, cfg, reporter, &mut rollback).await;
    ProvisionReport { result, rollback }
}

#[allow(clippy::too_many_arguments)]
async fn build_server<P, K, C, B>(
    provider: &P,
    keygen: &K,
    connector: &C,
    runner: &B,
    cfg: &ProvisionConfig,
    reporter: &impl Reporter,
    rollback: &mut Vec<String>,
) -> Result<Provisioned>
where
    P: CloudProvider,
    K: KeyGenerator,
    C: SshConnector,
    B: BootstrapRunner,
{
    let key_name = keypair_name();
    reporter.step(&format!("generating keypair {key_name}"));
    let key = keygen
        .generate(&key_name)
        .await
        .context("generating SSH keypair")?;
    provider
        .create_keypair(&key_name, &key.public_openssh)
        .await
        .with_context(|| format!("registering keypair {key_name}"))?;

    reporter.step(&format!("creating server {}", cfg.name));
    let created = provider.create_server(&server_spec(cfg, &key_name)).await;

    // The keypair is a one-shot credential-injection artifact: dispose of
    // it the moment the create call returns, whatever the outcome.
    if let Err(e) = provider.delete_keypair(&key_name).await {
        rollback.push(format!("could not delete keypair {key_name}: {e:#}"));
    }

    let server = created.with_context(|| format!("creating server {}", cfg.name))?;
    reporter.success(&format!("server {} active", server.id));

    match bootstrap_node(connector, runner, cfg, &key, &server, reporter).await {
        Ok(()) => Ok(Provisioned {
            id: server.id.clone(),
            public_v4: server.public_v4.clone(),
            public_v6: server.public_v6.clone(),
        }),
        Err(e) => {
            reporter.warn(&format!("server {} failed to build", server.id));
            roll_back_server(provider, &server, cfg.keep, rollback).await;
            Err(e)
        }
    }
}

fn server_spec<'a>(cfg: &'a ProvisionConfig, key_name: &'a str) -> ServerSpec<'a> {
    ServerSpec {
        name: &cfg.name,
        image_id: &cfg.image.id,
        flavor_id: &cfg.flavor.id,
        key_name,
        network: cfg.network.as_deref(),
        availability_zone: cfg.availability_zone.as_deref(),
        config_drive: cfg.config_drive,
        boot_from_volume: cfg.boot_from_volume,
        volume_size: &cfg.volume_size,
        volume: cfg.volume.as_deref(),
        timeout: cfg.timeout,
    }
}

/// SSH resolution, workspace assembly, and the bootstrap handoff.
async fn bootstrap_node<C, B>(
    connector: &C,
    runner: &B,
    cfg: &ProvisionConfig,
    key: &KeyMaterial,
    server: &ServerDetails,
    reporter: &impl Reporter,
) -> Result<()>
where
    C: SshConnector,
    B: BootstrapRunner,
{
    reporter.step(&format!("waiting for ssh on {}", server.public_v4));
    let user = wait_for_ssh(
        connector,
        &server.public_v4,
        key,
        DEFAULT_LOGIN_CANDIDATES,
        cfg.timeout,
        reporter,
    )
    .await?;
    reporter.step(&format!("resolved login {user}"));

    let host = InventoryHost {
        name: &cfg.name,
        group: &cfg.group,
        address: &server.interface_ip,
        user: &user,
    };
    let workspace = BootstrapWorkspace::create(key, &host, cfg.keep)?;
    let outcome = bootstrap::run_bootstrap(
        runner,
        &workspace,
        &cfg.project_dir,
        &cfg.roles_path,
        reporter,
    )
    .await;
    if let Some(path) = workspace.finish() {
        reporter.warn(&format!("bootstrap workspace kept at {}", path.display()));
    }
    outcome
}

/// Dispose of (or retain) a server whose build failed. Never escalates:
/// anything that goes wrong here lands in the diagnostics list alongside
/// the original error.
async fn roll_back_server<P: CloudProvider>(
    provider: &P,
    server: &ServerDetails,
    keep: bool,
    rollback: &mut Vec<String>,
) {
    if keep {
        rollback.push(format!(
            "Server {} kept as requested. Run to delete -> openstack server delete {}",
            server.id, server.id
        ));
        return;
    }
    match provider.delete_server(&server.id, true).await {
        Ok(()) => rollback.push(format!("server {} deleted", server.id)),
        Err(e) => rollback.push(format!("could not delete server {}: {e:#}", server.id)),
    }
}
