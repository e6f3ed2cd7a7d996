//! Cloud provider data model and port.
//!
//! The port is the interface the orchestrator provisions through; the
//! production implementation lives in [`crate::openstack`], and tests
//! supply call-recording doubles.

use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;

/// A compute flavor from the provider catalog.
#[derive(Debug, Clone, Deserialize)]
pub struct Flavor {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Name")]
    pub name: String,
}

/// A bootable image from the provider catalog.
#[derive(Debug, Clone, Deserialize)]
pub struct Image {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Name")]
    pub name: String,
}

/// Parameters for a create-server call. Struct-based to avoid breaking
/// test doubles on future parameter additions.
pub struct ServerSpec<'a> {
    pub name: &'a str,
    pub image_id: &'a str,
    pub flavor_id: &'a str,
    /// Provider-side keypair whose public half is injected at boot.
    pub key_name: &'a str,
    pub network: Option<&'a str>,
    pub availability_zone: Option<&'a str>,
    pub config_drive: bool,
    pub boot_from_volume: bool,
    /// Boot volume size in GB; only meaningful with `boot_from_volume`.
    pub volume_size: &'a str,
    /// UUID of an existing volume to attach at boot.
    pub volume: Option<&'a str>,
    /// Provider-side creation wait, passed through unchanged.
    pub timeout: Duration,
}

/// A created server as reported by the provider.
#[derive(Debug, Clone, Default)]
pub struct ServerDetails {
    pub id: String,
    pub name: String,
    pub public_v4: String,
    /// Empty when the provider assigned no IPv6 address.
    pub public_v6: String,
    /// Address the bootstrap run reaches the host on.
    pub interface_ip: String,
    pub status: String,
}

/// Cloud provider operations used by the orchestrator and the CLI layer.
#[allow(async_fn_in_trait)]
pub trait CloudProvider {
    /// Find a flavor by name or name substring.
    async fn get_flavor(&self, name: &str) -> Result<Option<Flavor>>;
    /// Full flavor catalog, for the lookup-miss listing.
    async fn list_flavors(&self) -> Result<Vec<Flavor>>;
    /// Find an image by name, skipping names containing `exclude`.
    async fn get_image(&self, name: &str, exclude: &str) -> Result<Option<Image>>;
    /// Full image catalog, for the lookup-miss listing.
    async fn list_images(&self) -> Result<Vec<Image>>;
    /// Register the public half of a keypair under `name`.
    async fn create_keypair(&self, name: &str, public_key: &str) -> Result<()>;
    /// Remove a registered keypair.
    async fn delete_keypair(&self, name: &str) -> Result<()>;
    /// Create a server and block until the provider reports it ready.
    async fn create_server(&self, spec: &ServerSpec<'_>) -> Result<ServerDetails>;
    /// Delete a server; `delete_ips` also releases its floating addresses.
    async fn delete_server(&self, id: &str, delete_ips: bool) -> Result<()>;
}

/// Resolve `wanted` against a catalog: an exact name match wins, otherwise
/// the first substring match in name-sorted order. Deterministic across
/// runs with identical catalogs.
pub fn select_by_name<T>(
    mut items: Vec<T>,
    wanted: &str,
    name_of: impl Fn(&T) -> &str,
) -> Option<T> {
    items.sort_by(|a, b| name_of(a).cmp(name_of(b)));
    if let Some(pos) = items.iter().position(|item| name_of(item) == wanted) {
        return Some(items.swap_remove(pos));
    }
    items.into_iter().find(|item| name_of(item).contains(wanted))
}
