//! OpenStack provider backed by the `openstack` CLI.
//!
//! Every operation shells out through a [`CommandRunner`], scoped to one
//! cloud (and optional region) for the lifetime of the instance, and parses
//! `-f json` output. Catalog resolution follows
//! [`select_by_name`](crate::cloud::select_by_name).

use std::process::Output;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::Value;

use crate::cloud::{CloudProvider, Flavor, Image, ServerDetails, ServerSpec, select_by_name};
use crate::command_runner::CommandRunner;

/// Production [`CloudProvider`] delegating to the `openstack` client.
pub struct OpenStackCli<R: CommandRunner> {
    runner: R,
    cloud: String,
    region: Option<String>,
}

impl<R: CommandRunner> OpenStackCli<R> {
    #[must_use]
    pub fn new(runner: R, cloud: impl Into<String>, region: Option<String>) -> Self {
        Self {
            runner,
            cloud: cloud.into(),
            region,
        }
    }

    /// Scoping arguments prepended to every invocation.
    fn base_args(&self) -> Vec<String> {
        let mut args = vec!["--os-cloud".to_string(), self.cloud.clone()];
        if let Some(region) = &self.region {
            args.push("--os-region-name".to_string());
            args.push(region.clone());
        }
        args
    }

    async fn run_cli(&self, args: Vec<String>, timeout: Option<Duration>) -> Result<Output> {
        let mut full = self.base_args();
        full.extend(args);
        let refs: Vec<&str> = full.iter().map(String::as_str).collect();
        let output = match timeout {
            Some(t) => self.runner.run_with_timeout("openstack", &refs, t).await?,
            None => self.runner.run("openstack", &refs).await?,
        };
        anyhow::ensure!(
            output.status.success(),
            "openstack command failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
        Ok(output)
    }

    async fn run_json(&self, args: Vec<String>) -> Result<Value> {
        let output = self.run_cli(args, None).await?;
        serde_json::from_slice(&output.stdout).context("parsing openstack JSON output")
    }
}

fn to_args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| (*p).to_string()).collect()
}

impl<R: CommandRunner> CloudProvider for OpenStackCli<R> {
    async fn get_flavor(&self, name: &str) -> Result<Option<Flavor>> {
        Ok(select_by_name(self.list_flavors().await?, name, |f| &f.name))
    }

    async fn list_flavors(&self) -> Result<Vec<Flavor>> {
        let value = self
            .run_json(to_args(&["flavor", "list", "-f", "json"]))
            .await
            .context("listing flavors")?;
        serde_json::from_value(value).context("parsing flavor list")
    }

    async fn get_image(&self, name: &str, exclude: &str) -> Result<Option<Image>> {
        let images: Vec<Image> = self
            .list_images()
            .await?
            .into_iter()
            .filter(|image| !image.name.contains(exclude))
            .collect();
        Ok(select_by_name(images, name, |i| &i.name))
    }

    async fn list_images(&self) -> Result<Vec<Image>> {
        let value = self
            .run_json(to_args(&["image", "list", "-f", "json"]))
            .await
            .context("listing images")?;
        serde_json::from_value(value).context("parsing image list")
    }

    async fn create_keypair(&self, name: &str, public_key: &str) -> Result<()> {
        // The CLI only reads public keys from disk.
        let scratch = tempfile::tempdir().context("creating scratch dir for public key")?;
        let key_path = scratch.path().join("key.pub");
        std::fs::write(&key_path, public_key)
            .with_context(|| format!("writing {}", key_path.display()))?;
        let path = key_path.to_str().context("scratch path is not valid UTF-8")?;
        self.run_cli(
            to_args(&["keypair", "create", "--public-key", path, name]),
            None,
        )
        .await
        .with_context(|| format!("registering keypair {name}"))?;
        Ok(())
    }

    async fn delete_keypair(&self, name: &str) -> Result<()> {
        self.run_cli(to_args(&["keypair", "delete", name]), None)
            .await
            .with_context(|| format!("deleting keypair {name}"))?;
        Ok(())
    }

    async fn create_server(&self, spec: &ServerSpec<'_>) -> Result<ServerDetails> {
        let mut args = to_args(&[
            "server",
            "create",
            "--image",
            spec.image_id,
            "--flavor",
            spec.flavor_id,
            "--key-name",
            spec.key_name,
            "--wait",
            "-f",
            "json",
        ]);
        if let Some(network) = spec.network {
            args.push("--network".to_string());
            args.push(network.to_string());
        }
        if let Some(az) = spec.availability_zone {
            args.push("--availability-zone".to_string());
            args.push(az.to_string());
        }
        if spec.config_drive {
            args.push("--config-drive".to_string());
            args.push("True".to_string());
        }
        if spec.boot_from_volume {
            args.push("--boot-from-volume".to_string());
            args.push(spec.volume_size.to_string());
        }
        if let Some(volume) = spec.volume {
            args.push("--block-device".to_string());
            args.push(format!(
                "uuid={volume},source_type=volume,destination_type=volume"
            ));
        }
        args.push(spec.name.to_string());

        // The provider's own creation wait runs under the caller's budget.
        let output = self
            .run_cli(args, Some(spec.timeout))
            .await
            .with_context(|| format!("creating server {}", spec.name))?;
        let value: Value =
            serde_json::from_slice(&output.stdout).context("parsing server create output")?;
        parse_server_details(&value)
    }

    async fn delete_server(&self, id: &str, _delete_ips: bool) -> Result<()> {
        self.run_cli(to_args(&["server", "delete", "--wait", id]), None)
            .await
            .with_context(|| format!("deleting server {id}"))?;
        Ok(())
    }
}

/// Extract identifiers and addresses from `server create -f json` output.
///
/// Addresses come as a map of network name to address list; the first
/// non-colon address is taken as IPv4, the first colon address as IPv6,
/// and the interface address prefers IPv4.
fn parse_server_details(value: &Value) -> Result<ServerDetails> {
    let id = value
        .get("id")
        .and_then(Value::as_str)
        .context("server output missing id")?;
    let mut public_v4 = String::new();
    let mut public_v6 = String::new();
    if let Some(networks) = value.get("addresses").and_then(Value::as_object) {
        for addresses in networks.values() {
            for address in addresses.as_array().into_iter().flatten() {
                let Some(addr) = address.as_str() else { continue };
                if addr.contains(':') {
                    if public_v6.is_empty() {
                        public_v6 = addr.to_string();
                    }
                } else if public_v4.is_empty() {
                    public_v4 = addr.to_string();
                }
            }
        }
    }
    let interface_ip = if public_v4.is_empty() {
        public_v6.clone()
    } else {
        public_v4.clone()
    };
    Ok(ServerDetails {
        id: id.to_string(),
        name: value
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        public_v4,
        public_v6,
        interface_ip,
        status: value
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    })
}
