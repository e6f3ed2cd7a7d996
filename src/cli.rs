//! CLI argument parsing with clap derive.

use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use crate::bootstrap::{self, AnsibleRunnerCli};
use crate::cloud::CloudProvider;
use crate::command_runner::{DEFAULT_CMD_TIMEOUT, TokioCommandRunner};
use crate::keys::SshKeygen;
use crate::openstack::OpenStackCli;
use crate::output::{OutputContext, Reporter as _};
use crate::provision::{ProvisionConfig, provision};
use crate::ssh::Ssh2Connector;

/// Image names containing this marker are skipped during lookup.
const IMAGE_EXCLUDE: &str = "deprecated";

/// Outcome of resolving the requested flavor and image against the catalog.
pub enum CatalogLookup {
    Found {
        flavor: crate::cloud::Flavor,
        image: crate::cloud::Image,
    },
    /// Lookup miss: which catalog missed, and its full listing to print
    /// before exiting with status 1. No cloud resource has been touched.
    Miss {
        what: &'static str,
        listing: Vec<String>,
    },
}

/// Resolve the requested flavor and image names.
///
/// # Errors
///
/// Returns an error only if the provider itself cannot be queried; a name
/// that matches nothing is a [`CatalogLookup::Miss`], not an error.
pub async fn resolve_catalog<P: CloudProvider>(
    provider: &P,
    flavor: &str,
    image: &str,
) -> Result<CatalogLookup> {
    let Some(flavor) = provider.get_flavor(flavor).await? else {
        return Ok(CatalogLookup::Miss {
            what: "flavor",
            listing: provider
                .list_flavors()
                .await?
                .into_iter()
                .map(|f| f.name)
                .collect(),
        });
    };
    let Some(image) = provider.get_image(image, IMAGE_EXCLUDE).await? else {
        return Ok(CatalogLookup::Miss {
            what: "image",
            listing: provider
                .list_images()
                .await?
                .into_iter()
                .map(|i| i.name)
                .collect(),
        });
    };
    Ok(CatalogLookup::Found { flavor, image })
}

/// Launch one cloud node and run its initial configuration.
#[derive(Parser)]
#[command(name = "launch-node", version, arg_required_else_help = true)]
pub struct LaunchArgs {
    /// Server name
    pub name: String,

    /// Server group
    pub group: String,

    /// Cloud name
    #[arg(long)]
    pub cloud: String,

    /// Cloud region
    #[arg(long)]
    pub region: Option<String>,

    /// Name (or substring) of flavor
    #[arg(long, default_value = "1GB")]
    pub flavor: String,

    /// Image name
    #[arg(long, default_value = "Ubuntu 24.04 LTS (Noble Numbat)")]
    pub image: String,

    /// Network label to attach the instance to
    #[arg(long)]
    pub network: Option<String>,

    /// UUID of a volume to attach to the new server
    #[arg(long)]
    pub volume: Option<String>,

    /// Path to mount the attached volume at (read by the playbooks)
    #[arg(long)]
    pub mount_path: Option<String>,

    /// FS label to use when mounting the attached volume (read by the playbooks)
    #[arg(long)]
    pub fs_label: Option<String>,

    /// Create a boot volume for the server and use it
    #[arg(long)]
    pub boot_from_volume: bool,

    /// Size of volume (GB) for --boot-from-volume
    #[arg(long, default_value = "50")]
    pub volume_size: String,

    /// AZ to boot in
    #[arg(long = "az")]
    pub availability_zone: Option<String>,

    /// Boot with a config drive attached
    #[arg(long)]
    pub config_drive: bool,

    /// Timeout in seconds for server creation and SSH polling
    #[arg(long, default_value_t = 600)]
    pub timeout: u64,

    /// Don't clean up or delete the server on error
    #[arg(long)]
    pub keep: bool,

    /// Be verbose about cloud actions
    #[arg(short, long)]
    pub verbose: bool,
}

impl LaunchArgs {
    /// Execute the launch.
    ///
    /// # Errors
    ///
    /// Returns an error on any fatal provisioning failure. Flavor and image
    /// lookup misses are not errors: the catalog is printed and the process
    /// exits with status 1 without touching any cloud resource.
    pub async fn run(self) -> Result<ExitCode> {
        let LaunchArgs {
            name,
            group,
            cloud,
            region,
            flavor,
            image,
            network,
            volume,
            mount_path: _,
            fs_label: _,
            boot_from_volume,
            volume_size,
            availability_zone,
            config_drive,
            timeout,
            keep,
            verbose,
        } = self;

        let ctx = OutputContext::new(verbose);
        let provider = OpenStackCli::new(
            TokioCommandRunner::new(DEFAULT_CMD_TIMEOUT),
            cloud,
            region,
        );

        let (flavor, image) = match resolve_catalog(&provider, &flavor, &image).await? {
            CatalogLookup::Found { flavor, image } => (flavor, image),
            CatalogLookup::Miss { what, listing } => {
                println!("Unable to find matching {what}; {what} list:");
                for name in listing {
                    println!("{name}");
                }
                return Ok(ExitCode::FAILURE);
            }
        };
        println!("Found flavor {}", flavor.name);
        println!("Found image {}", image.name);

        let (project_dir, roles_path) = bootstrap::project_paths()?;
        let cfg = ProvisionConfig {
            name,
            group,
            flavor,
            image,
            network,
            availability_zone,
            config_drive,
            boot_from_volume,
            volume_size,
            volume,
            timeout: Duration::from_secs(timeout),
            keep,
            project_dir,
            roles_path,
        };

        let keygen = SshKeygen::new(TokioCommandRunner::new(DEFAULT_CMD_TIMEOUT));
        let ansible = AnsibleRunnerCli::new(TokioCommandRunner::new(DEFAULT_CMD_TIMEOUT));
        let report = provision(&provider, &keygen, &Ssh2Connector, &ansible, &cfg, &ctx).await;

        for note in &report.rollback {
            ctx.warn(note);
        }

        let node = report.result?;
        println!("UUID={}", node.id);
        println!("IPV4={}", node.public_v4);
        println!("IPV6={}", node.public_v6);
        Ok(ExitCode::SUCCESS)
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory as _;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        LaunchArgs::command().debug_assert();
    }

    #[test]
    fn cloud_flag_is_required() {
        let result = LaunchArgs::try_parse_from(["launch-node", "mirror01", "mirrors"]);
        assert!(result.is_err());
    }

    #[test]
    fn defaults_match_the_documented_surface() {
        let args = LaunchArgs::try_parse_from([
            "launch-node",
            "mirror01",
            "mirrors",
            "--cloud",
            "prod",
        ])
        .expect("parse");
        assert_eq!(args.flavor, "1GB");
        assert_eq!(args.volume_size, "50");
        assert_eq!(args.timeout, 600);
        assert!(!args.keep);
        assert!(!args.boot_from_volume);
    }

    #[test]
    fn all_flags_parse() {
        let args = LaunchArgs::try_parse_from([
            "launch-node",
            "mirror01",
            "mirrors",
            "--cloud",
            "prod",
            "--region",
            "RegionOne",
            "--flavor",
            "2GB",
            "--image",
            "Ubuntu-Foo",
            "--network",
            "public",
            "--volume",
            "vol-9",
            "--mount-path",
            "/srv",
            "--fs-label",
            "data",
            "--boot-from-volume",
            "--volume-size",
            "80",
            "--az",
            "nova",
            "--config-drive",
            "--timeout",
            "120",
            "--keep",
            "--verbose",
        ])
        .expect("parse");
        assert_eq!(args.availability_zone.as_deref(), Some("nova"));
        assert_eq!(args.timeout, 120);
        assert!(args.keep && args.verbose && args.config_drive);
    }

    use anyhow::bail;

    use crate::cloud::{Flavor, Image, ServerDetails, ServerSpec, select_by_name};

    /// Provider double serving a fixed catalog; instance operations are
    /// out of scope for lookups and fail loudly.
    struct CatalogProvider {
        flavors: Vec<(&'static str, &'static str)>,
        images: Vec<(&'static str, &'static str)>,
    }

    impl CloudProvider for CatalogProvider {
        async fn get_flavor(&self, name: &str) -> Result<Option<Flavor>> {
            Ok(select_by_name(self.list_flavors().await?, name, |f| &f.name))
        }

        async fn list_flavors(&self) -> Result<Vec<Flavor>> {
            Ok(self
                .flavors
                .iter()
                .map(|(id, name)| Flavor {
                    id: (*id).to_string(),
                    name: (*name).to_string(),
                })
                .collect())
        }

        async fn get_image(&self, name: &str, exclude: &str) -> Result<Option<Image>> {
            let images = self
                .list_images()
                .await?
                .into_iter()
                .filter(|i| !i.name.contains(exclude))
                .collect();
            Ok(select_by_name(images, name, |i| &i.name))
        }

        async fn list_images(&self) -> Result<Vec<Image>> {
            Ok(self
                .images
                .iter()
                .map(|(id, name)| Image {
                    id: (*id).to_string(),
                    name: (*name).to_string(),
                })
                .collect())
        }

        async fn create_keypair(&self, _name: &str, _public_key: &str) -> Result<()> {
            bail!("lookup must not create resources")
        }

        async fn delete_keypair(&self, _name: &str) -> Result<()> {
            bail!("lookup must not delete resources")
        }

        async fn create_server(&self, _spec: &ServerSpec<'_>) -> Result<ServerDetails> {
            bail!("lookup must not create resources")
        }

        async fn delete_server(&self, _id: &str, _delete_ips: bool) -> Result<()> {
            bail!("lookup must not delete resources")
        }
    }

    fn catalog() -> CatalogProvider {
        CatalogProvider {
            flavors: vec![("f1", "1GB"), ("f2", "2GB")],
            images: vec![("i1", "Ubuntu-Foo"), ("i2", "Ubuntu-Foo (deprecated)")],
        }
    }

    #[tokio::test]
    async fn resolving_known_names_finds_both_entries() {
        let lookup = resolve_catalog(&catalog(), "2GB", "Ubuntu-Foo")
            .await
            .expect("lookup");
        match lookup {
            CatalogLookup::Found { flavor, image } => {
                assert_eq!(flavor.id, "f2");
                assert_eq!(image.id, "i1", "deprecated images are skipped");
            }
            CatalogLookup::Miss { .. } => panic!("expected a catalog hit"),
        }
    }

    #[tokio::test]
    async fn unknown_flavor_misses_with_the_full_listing() {
        let lookup = resolve_catalog(&catalog(), "16GB", "Ubuntu-Foo")
            .await
            .expect("lookup");
        match lookup {
            CatalogLookup::Miss { what, listing } => {
                assert_eq!(what, "flavor");
                assert_eq!(listing, vec!["1GB", "2GB"]);
            }
            CatalogLookup::Found { .. } => panic!("expected a flavor miss"),
        }
    }

    #[tokio::test]
    async fn unknown_image_misses_with_the_full_listing() {
        let lookup = resolve_catalog(&catalog(), "1GB", "Debian-Bar")
            .await
            .expect("lookup");
        match lookup {
            CatalogLookup::Miss { what, listing } => {
                assert_eq!(what, "image");
                assert_eq!(listing.len(), 2, "the raw listing is unfiltered");
            }
            CatalogLookup::Found { .. } => panic!("expected an image miss"),
        }
    }
}
