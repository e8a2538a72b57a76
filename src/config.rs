use anyhow::Result;
use log::debug;
use reqwest::{
    Client,
    header::{AUTHORIZATION, HeaderMap, HeaderValue},
};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::ProvisionError;
use crate::runtime::Runtime;

pub const DEFAULT_REPO: &str = "annetutil/gnetcli";
pub const DEFAULT_BINARY_NAME: &str = "gnetcli_server";
pub const DEFAULT_RELEASE_HOST: &str = "https://github.com";
pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_PACKAGE_ROOT: &str = "gnetcli_server_bin";

/// Directory under the package root that holds the installed binary.
pub const BIN_DIR: &str = "_bin";

const USER_AGENT: &str = "gnetcli-provision";

/// Upstream repository identifier (owner/repo format).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UpstreamRepo {
    pub owner: String,
    pub repo: String,
}

impl fmt::Display for UpstreamRepo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

impl FromStr for UpstreamRepo {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('/').collect();
        if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
            Err(ProvisionError::Config(format!(
                "invalid repository {:?}, expected 'owner/repo'",
                s
            ))
            .into())
        } else {
            Ok(UpstreamRepo {
                owner: parts[0].to_string(),
                repo: parts[1].to_string(),
            })
        }
    }
}

/// Where releases come from and what they are called.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamConfig {
    pub repo: UpstreamRepo,
    pub binary_name: String,
    /// Web host serving `/<owner>/<repo>/releases/download/...`
    pub release_host: String,
    /// API host serving `/repos/<owner>/<repo>/tarball/...`
    pub api_url: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            repo: UpstreamRepo {
                owner: "annetutil".to_string(),
                repo: "gnetcli".to_string(),
            },
            binary_name: DEFAULT_BINARY_NAME.to_string(),
            release_host: DEFAULT_RELEASE_HOST.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
        }
    }
}

/// How the binary is obtained. Chosen up front; one never falls back to the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Strategy {
    /// Download the prebuilt release asset for the target
    #[default]
    #[value(name = "download")]
    DownloadPrebuilt,
    /// Download the source tarball and cross-compile it
    #[value(name = "build")]
    BuildFromSource,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::DownloadPrebuilt => write!(f, "download"),
            Strategy::BuildFromSource => write!(f, "build"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProvisionConfig {
    pub upstream: UpstreamConfig,
    pub strategy: Strategy,
    pub package_root: PathBuf,
    /// Parent of the scratch workspace; the system temp dir when unset
    pub scratch_parent: Option<PathBuf>,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            upstream: UpstreamConfig::default(),
            strategy: Strategy::default(),
            package_root: PathBuf::from(DEFAULT_PACKAGE_ROOT),
            scratch_parent: None,
        }
    }
}

impl ProvisionConfig {
    /// Final location of the installed binary: `<package_root>/_bin/<binary>`.
    pub fn destination(&self) -> PathBuf {
        self.package_root
            .join(BIN_DIR)
            .join(&self.upstream.binary_name)
    }
}

/// Builds the HTTP client used for every download.
///
/// TLS roots come from the bundled webpki store. If `GITHUB_TOKEN` is set it
/// is sent as a bearer token, which lifts anonymous API rate limits.
pub fn build_http_client<R: Runtime>(runtime: &R) -> Result<Client> {
    let mut headers = HeaderMap::new();
    if let Ok(token) = runtime.env_var("GITHUB_TOKEN")
        && !token.is_empty()
    {
        let mut auth_value = HeaderValue::from_str(&format!("Bearer {}", token))?;
        auth_value.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth_value);
        debug!("Using GITHUB_TOKEN for authentication");
    }

    let client = Client::builder()
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .build()?;

    Ok(client)
}
