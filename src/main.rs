use anyhow::Result;
use clap::Parser;
use gnetcli_provision::config::{
    DEFAULT_API_URL, DEFAULT_PACKAGE_ROOT, DEFAULT_RELEASE_HOST, DEFAULT_REPO, ProvisionConfig,
    Strategy, UpstreamConfig, UpstreamRepo,
};
use gnetcli_provision::manifest::read_project_version;
use gnetcli_provision::platform::native_tag;
use gnetcli_provision::release::ReleaseVersion;
use gnetcli_provision::runtime::RealRuntime;
use std::path::PathBuf;

/// gnetcli-provision - install the gnetcli server binary for a wheel platform
///
/// Resolves a Python wheel platform tag to an OS/architecture pair, then
/// downloads the matching prebuilt release asset (or builds it from source
/// with the Go toolchain) into `<package-root>/_bin/gnetcli_server`.
/// Nothing is fetched if the binary is already installed.
///
/// If the GITHUB_TOKEN environment variable is set, it will be used for authentication.
/// This is useful for avoiding rate limits.
///
/// Examples:
///   gnetcli-provision                                  # Native platform, version from pyproject.toml
///   gnetcli-provision --plat-name manylinux_2_17_x86_64 --release-version 1.2.3
///   gnetcli-provision --plat-name macosx_11_0_arm64 --mode build
#[derive(Parser, Debug)]
#[command(author, version = env!("GNETCLI_PROVISION_VERSION"), about)]
struct Cli {
    /// Wheel platform tag to provision for (defaults to this machine)
    #[arg(long = "plat-name", env = "GNETCLI_PLAT_NAME", value_name = "TAG")]
    plat_name: Option<String>,

    /// Release version to install (defaults to [project].version of the manifest)
    #[arg(long = "release-version", value_name = "VERSION")]
    release_version: Option<String>,

    /// Manifest to read the version from
    #[arg(long, value_name = "PATH", default_value = "pyproject.toml")]
    manifest: PathBuf,

    /// How to obtain the binary
    #[arg(long, value_enum, default_value_t = Strategy::DownloadPrebuilt)]
    mode: Strategy,

    /// Package directory; the binary goes to <PATH>/_bin/
    #[arg(long = "package-root", value_name = "PATH", default_value = DEFAULT_PACKAGE_ROOT)]
    package_root: PathBuf,

    /// Upstream repository in the format "owner/repo"
    #[arg(long, value_name = "OWNER/REPO", default_value = DEFAULT_REPO)]
    repo: UpstreamRepo,

    /// Host serving release assets
    #[arg(long = "release-host", value_name = "URL", default_value = DEFAULT_RELEASE_HOST)]
    release_host: String,

    /// GitHub API URL, used for source tarballs
    #[arg(long = "api-url", value_name = "URL", default_value = DEFAULT_API_URL)]
    api_url: String,
}

impl Cli {
    fn provision_config(&self) -> ProvisionConfig {
        ProvisionConfig {
            upstream: UpstreamConfig {
                repo: self.repo.clone(),
                release_host: self.release_host.clone(),
                api_url: self.api_url.clone(),
                ..UpstreamConfig::default()
            },
            strategy: self.mode,
            package_root: self.package_root.clone(),
            scratch_parent: None,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let runtime = RealRuntime;

    let platform_tag = cli.plat_name.clone().unwrap_or_else(native_tag);
    let version = match &cli.release_version {
        Some(raw) => ReleaseVersion::parse(raw)?,
        None => read_project_version(&runtime, &cli.manifest)?,
    };

    let installed =
        gnetcli_provision::provision(runtime, cli.provision_config(), &platform_tag, &version)
            .await?;
    println!("{}", installed.display());
    Ok(())
}
