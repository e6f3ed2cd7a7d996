//! Host-key discovery and optional known-hosts pinning.
//!
//! Trust establishment sits outside the provisioning hot path: callers that
//! want pinning scan the new host's key and store it; the orchestrator
//! itself never does. Two interchangeable scanners sit behind one port —
//! a direct handshake probe and a delegated `ssh-keyscan` run — both under
//! the same bounded-retry discipline as SSH readiness polling.

use std::net::{TcpStream, ToSocketAddrs as _};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use base64::Engine as _;

use crate::command_runner::CommandRunner;
use crate::retry::RetryTimer;
use crate::ssh::CONNECT_TIMEOUT;

/// Validates that `key` is an ed25519 public key with non-empty material.
///
/// Accepts the raw public key format: `ssh-ed25519 <base64-material>`.
///
/// # Errors
///
/// Returns an error if the key does not start with `ssh-ed25519 ` or has
/// no key material after the prefix.
pub fn validate_host_key(key: &str) -> Result<()> {
    let material = key
        .strip_prefix("ssh-ed25519 ")
        .ok_or_else(|| anyhow::anyhow!("host key must be an ed25519 key (got: {key:?})"))?;
    anyhow::ensure!(!material.trim().is_empty(), "host key has no key material");
    Ok(())
}

/// Retrieves a target's public host key as `<type> <base64>`.
///
/// A pure lookup with no side effects on the target.
#[allow(async_fn_in_trait)]
pub trait HostKeyScanner {
    /// Scan `address:port`, retrying within `budget`.
    ///
    /// # Errors
    ///
    /// Returns `DeadlineExceeded` when the budget runs out before a key is
    /// obtained.
    async fn scan(&self, address: &str, port: u16, budget: Duration) -> Result<String>;
}

/// Scanner backed by a direct ssh2 handshake probe.
pub struct HandshakeScanner;

impl HostKeyScanner for HandshakeScanner {
    async fn scan(&self, address: &str, port: u16, budget: Duration) -> Result<String> {
        let mut timer = RetryTimer::new(budget, format!("connection to {address} on port {port}"));
        loop {
            timer.next_attempt().await?;
            let target = address.to_string();
            match tokio::task::spawn_blocking(move || handshake_key(&target, port)).await {
                Ok(Ok(line)) => return Ok(line),
                // Transient: the host is still booting. Next token.
                Ok(Err(_)) | Err(_) => {}
            }
        }
    }
}

/// One blocking handshake, negotiating only ed25519 host keys.
fn handshake_key(address: &str, port: u16) -> Result<String> {
    let sockaddr = (address, port)
        .to_socket_addrs()
        .with_context(|| format!("resolving {address}"))?
        .next()
        .with_context(|| format!("no address for {address}"))?;
    let tcp = TcpStream::connect_timeout(&sockaddr, CONNECT_TIMEOUT)
        .with_context(|| format!("connecting to {address}:{port}"))?;
    let mut session = ssh2::Session::new().context("creating ssh session")?;
    session.set_tcp_stream(tcp);
    session
        .method_pref(ssh2::MethodType::HostKey, "ssh-ed25519")
        .context("restricting host key methods")?;
    session.handshake().context("ssh handshake")?;
    let (material, _) = session.host_key().context("no host key negotiated")?;
    let line = format!(
        "ssh-ed25519 {}",
        base64::engine::general_purpose::STANDARD.encode(material)
    );
    validate_host_key(&line)?;
    Ok(line)
}

/// Scanner delegating to the external `ssh-keyscan` utility.
pub struct KeyscanScanner<R: CommandRunner> {
    runner: R,
}

impl<R: CommandRunner> KeyscanScanner<R> {
    #[must_use]
    pub fn new(runner: R) -> Self {
        Self { runner }
    }
}

impl<R: CommandRunner> HostKeyScanner for KeyscanScanner<R> {
    async fn scan(&self, address: &str, port: u16, budget: Duration) -> Result<String> {
        let mut timer = RetryTimer::new(budget, format!("connection to {address} on port {port}"));
        let port_arg = port.to_string();
        loop {
            timer.next_attempt().await?;
            let output = self
                .runner
                .run("ssh-keyscan", &["-t", "ed25519", "-p", &port_arg, address])
                .await
                .context("running ssh-keyscan")?;
            if !output.status.success() {
                continue;
            }
            if let Some(line) = parse_keyscan_output(&String::from_utf8_lossy(&output.stdout)) {
                return Ok(line);
            }
        }
    }
}

/// Extracts `<type> <base64>` from `<host> <type> <base64>` keyscan lines.
fn parse_keyscan_output(stdout: &str) -> Option<String> {
    for line in stdout.lines() {
        if line.starts_with('#') {
            continue;
        }
        let mut fields = line.split_whitespace();
        let Some(_host) = fields.next() else { continue };
        let (Some(key_type), Some(material)) = (fields.next(), fields.next()) else {
            continue;
        };
        let key = format!("{key_type} {material}");
        if validate_host_key(&key).is_ok() {
            return Some(key);
        }
    }
    None
}

/// Known-hosts file for pinning a scanned key.
pub struct KnownHostsFile {
    path: PathBuf,
}

impl KnownHostsFile {
    #[must_use]
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    /// Writes `host_key_line`, creating parent dirs as needed.
    ///
    /// Sets file permissions to 600 and the parent directory to 700.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or permissions cannot
    /// be set.
    pub fn update(&self, host_key_line: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create dir {}", parent.display()))?;
            set_permissions(parent, 0o700)?;
        }
        std::fs::write(&self.path, host_key_line)
            .with_context(|| format!("write {}", self.path.display()))?;
        set_permissions(&self.path, 0o600)?;
        Ok(())
    }

    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Removes the file if it exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub fn remove(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)
                .with_context(|| format!("remove {}", self.path.display()))?;
        }
        Ok(())
    }
}

#[cfg(unix)]
fn set_permissions(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .with_context(|| format!("set permissions on {}", path.display()))
}

#[cfg(not(unix))]
fn set_permissions(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}


#[cfg(test)]
mod proptests {
    use proptest::prelude::*;

    use super::validate_host_key;

    proptest! {
        /// Any "ssh-ed25519 <material>" is accepted.
        #[test]
        fn prop_accepts_ed25519_with_material(material in "[A-Za-z0-9+/]{10,100}") {
            let key = format!("ssh-ed25519 {}", material);
            prop_assert!(validate_host_key(&key).is_ok());
        }

        /// Any other key type prefix is rejected.
        #[test]
        fn prop_rejects_non_ed25519_prefix(
            prefix in "(ssh-rsa|ecdsa-sha2-nistp256|sk-ssh-ed25519|ssh-dss)",
            material in "[A-Za-z0-9+/]{10,100}",
        ) {
            let key = format!("{} {}", prefix, material);
            prop_assert!(validate_host_key(&key).is_err());
        }
    }
}
