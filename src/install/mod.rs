use anyhow::{Context, Result};
use log::info;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::{
    archive::{ArchiveExtractor, ExtractMode, TarGzExtractor},
    cleanup::{self, ScratchWorkspace, SharedCleanupContext},
    config::{ProvisionConfig, Strategy, build_http_client},
    download::fetch,
    http::HttpClient,
    platform::{TargetTriple, resolve},
    release::{ReleaseAsset, ReleaseVersion, source_tarball_url},
    runtime::Runtime,
    toolchain::{CrossTarget, GoToolchain, ToolchainBuilder},
};

mod placement;

pub use placement::place_binary;

/// Provisions the binary for `platform_tag` with the default collaborators:
/// an HTTP client built from the environment, the tar.gz extractor and the
/// Go toolchain.
#[tracing::instrument(skip(runtime, config))]
pub async fn provision<R: Runtime + 'static>(
    runtime: R,
    config: ProvisionConfig,
    platform_tag: &str,
    version: &ReleaseVersion,
) -> Result<PathBuf> {
    let http = HttpClient::new(build_http_client(&runtime)?);
    let toolchain = GoToolchain::for_binary(&config.upstream.binary_name);
    let provisioner = Provisioner::new(runtime, http, TarGzExtractor, toolchain, config);
    provisioner.provision(platform_tag, version).await
}

/// The acquisition pipeline: resolve, obtain, install.
pub struct Provisioner<R, E, T> {
    runtime: R,
    http: HttpClient,
    extractor: E,
    toolchain: T,
    config: ProvisionConfig,
}

impl<R, E, T> Provisioner<R, E, T>
where
    R: Runtime + 'static,
    E: ArchiveExtractor,
    T: ToolchainBuilder,
{
    pub fn new(runtime: R, http: HttpClient, extractor: E, toolchain: T, config: ProvisionConfig) -> Self {
        Self {
            runtime,
            http,
            extractor,
            toolchain,
            config,
        }
    }

    /// Makes sure the binary for `platform_tag` is installed and returns its path.
    ///
    /// If the destination already exists nothing else happens: no download,
    /// extraction or compilation. Otherwise every intermediate file lives in
    /// a scratch workspace that is gone when this returns, whether it
    /// succeeded or not.
    #[tracing::instrument(skip(self))]
    pub async fn provision(&self, platform_tag: &str, version: &ReleaseVersion) -> Result<PathBuf> {
        let target = resolve(platform_tag)?;
        let destination = self.config.destination();

        if self.runtime.exists(&destination) {
            info!(
                "{:?} already exists. Skipping download and build.",
                destination
            );
            return Ok(destination);
        }

        eprintln!("   resolving {} -> {}", platform_tag, target);

        let cleanup_ctx = cleanup::new_shared();
        let cleanup_ctx_clone = Arc::clone(&cleanup_ctx);

        // Register Ctrl-C handler
        let ctrl_c_handler = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nInterrupted, cleaning up...");
                if let Ok(ctx) = cleanup_ctx_clone.lock() {
                    ctx.cleanup();
                }
                std::process::exit(130); // Standard exit code for Ctrl-C
            }
        });

        let result = self
            .acquire_and_install(&target, version, &destination, cleanup_ctx)
            .await;

        ctrl_c_handler.abort();

        result?;
        Ok(destination)
    }

    async fn acquire_and_install(
        &self,
        target: &TargetTriple,
        version: &ReleaseVersion,
        destination: &Path,
        cleanup_ctx: SharedCleanupContext,
    ) -> Result<()> {
        let scratch =
            ScratchWorkspace::create(&self.runtime, self.config.scratch_parent.clone(), cleanup_ctx)?;

        let produced = match self.config.strategy {
            Strategy::DownloadPrebuilt => self.download_prebuilt(&scratch, target, version).await?,
            Strategy::BuildFromSource => self.build_from_source(&scratch, target, version).await?,
        };

        eprintln!("  installing {}", destination.display());
        place_binary(&self.runtime, &produced, destination, target.os)
    }

    async fn download_prebuilt(
        &self,
        scratch: &ScratchWorkspace<'_, R>,
        target: &TargetTriple,
        version: &ReleaseVersion,
    ) -> Result<PathBuf> {
        let upstream = &self.config.upstream;
        let asset = ReleaseAsset::for_target(upstream, version, target);
        let archive_path = scratch.join(&asset.name);

        eprintln!(" downloading {}", asset.url);
        fetch(&self.runtime, &self.http, &asset.url, &archive_path)
            .await
            .with_context(|| format!("Failed to download release asset {}", asset.name))?;

        let extracted = self.extractor.extract(
            &self.runtime,
            &archive_path,
            &scratch.join("bin"),
            &ExtractMode::SingleBinary {
                name: upstream.binary_name.clone(),
            },
        )?;
        Ok(extracted.path().to_path_buf())
    }

    async fn build_from_source(
        &self,
        scratch: &ScratchWorkspace<'_, R>,
        target: &TargetTriple,
        version: &ReleaseVersion,
    ) -> Result<PathBuf> {
        let upstream = &self.config.upstream;

        self.toolchain.probe().await?;

        let url = source_tarball_url(upstream, version);
        let tarball = scratch.join(format!("{}.tar.gz", upstream.repo.repo));

        eprintln!(" downloading {}", url);
        fetch(&self.runtime, &self.http, &url, &tarball)
            .await
            .with_context(|| format!("Failed to download {} sources for {}", upstream.repo, version.tag()))?;

        let tree = self.extractor.extract(
            &self.runtime,
            &tarball,
            &scratch.join("src"),
            &ExtractMode::SourceTree,
        )?;

        let output = scratch.join(&upstream.binary_name);
        self.toolchain
            .build(tree.path(), &CrossTarget::from(target), &output)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::MockArchiveExtractor;
    use crate::config::UpstreamConfig;
    use crate::error::ProvisionError;
    use crate::runtime::{MockRuntime, RealRuntime};
    use crate::test_utils::{TarEntry, tar_gz};
    use crate::toolchain::MockToolchainBuilder;
    use mockall::predicate::eq;
    use reqwest::Client;
    use std::fs;
    use tempfile::{TempDir, tempdir};

    const ASSET_PATH: &str =
        "/annetutil/gnetcli/releases/download/v1.2.3/gnetcli_server-v1.2.3-linux-amd64.tar.gz";
    const SOURCE_PATH: &str = "/repos/annetutil/gnetcli/tarball/v1.2.3";

    struct Fixture {
        dir: TempDir,
        config: ProvisionConfig,
    }

    impl Fixture {
        fn new(server_url: &str, strategy: Strategy) -> Self {
            let dir = tempdir().unwrap();
            let scratch_parent = dir.path().join("scratch");
            fs::create_dir_all(&scratch_parent).unwrap();
            let config = ProvisionConfig {
                upstream: UpstreamConfig {
                    release_host: server_url.to_string(),
                    api_url: server_url.to_string(),
                    ..UpstreamConfig::default()
                },
                strategy,
                package_root: dir.path().join("gnetcli_server_bin"),
                scratch_parent: Some(scratch_parent),
            };
            Self { dir, config }
        }

        fn destination(&self) -> PathBuf {
            self.config.destination()
        }

        fn scratch_is_empty(&self) -> bool {
            fs::read_dir(self.dir.path().join("scratch"))
                .unwrap()
                .next()
                .is_none()
        }
    }

    fn version() -> ReleaseVersion {
        ReleaseVersion::parse("1.2.3").unwrap()
    }

    fn http() -> HttpClient {
        HttpClient::new(Client::new())
    }

    fn classified(err: &anyhow::Error) -> &ProvisionError {
        ProvisionError::find(err).unwrap_or_else(|| panic!("unclassified error: {:#}", err))
    }

    #[test_log::test(tokio::test)]
    async fn test_download_prebuilt_installs_binary() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", ASSET_PATH)
            .with_status(200)
            .with_body(tar_gz(&[
                TarEntry::file("README.md", "docs"),
                TarEntry::file("gnetcli_server", "prebuilt-linux-amd64"),
            ]))
            .expect(1)
            .create_async()
            .await;
        let fixture = Fixture::new(&server.url(), Strategy::DownloadPrebuilt);

        let provisioner = Provisioner::new(
            RealRuntime,
            http(),
            TarGzExtractor,
            MockToolchainBuilder::new(),
            fixture.config.clone(),
        );
        let installed = provisioner
            .provision("manylinux_2_17_x86_64", &version())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(installed, fixture.destination());
        assert_eq!(
            fs::read_to_string(&installed).unwrap(),
            "prebuilt-linux-amd64"
        );
        assert!(!installed.with_file_name("README.md").exists());
        assert!(fixture.scratch_is_empty());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&installed).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }

    #[tokio::test]
    async fn test_second_run_does_no_work() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", ASSET_PATH)
            .with_status(200)
            .with_body(tar_gz(&[TarEntry::file("gnetcli_server", "v1")]))
            .expect(1)
            .create_async()
            .await;
        let fixture = Fixture::new(&server.url(), Strategy::DownloadPrebuilt);
        let provisioner = Provisioner::new(
            RealRuntime,
            http(),
            TarGzExtractor,
            MockToolchainBuilder::new(),
            fixture.config.clone(),
        );

        let first = provisioner
            .provision("manylinux_2_17_x86_64", &version())
            .await
            .unwrap();
        let before = fs::read(&first).unwrap();

        let second = provisioner
            .provision("manylinux_2_17_x86_64", &version())
            .await
            .unwrap();

        // Only the first run hit the server
        mock.assert_async().await;
        assert_eq!(first, second);
        assert_eq!(fs::read(&second).unwrap(), before);
    }

    #[tokio::test]
    async fn test_existing_destination_short_circuits() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", mockito::Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let config = ProvisionConfig {
            upstream: UpstreamConfig {
                release_host: server.url(),
                api_url: server.url(),
                ..UpstreamConfig::default()
            },
            package_root: PathBuf::from("/pkg"),
            ..ProvisionConfig::default()
        };
        let destination = config.destination();

        for strategy in [Strategy::DownloadPrebuilt, Strategy::BuildFromSource] {
            // Any call other than the existence check panics
            let mut runtime = MockRuntime::new();
            runtime
                .expect_exists()
                .with(eq(destination.clone()))
                .times(1)
                .returning(|_| true);

            let provisioner = Provisioner::new(
                runtime,
                http(),
                MockArchiveExtractor::new(),
                MockToolchainBuilder::new(),
                ProvisionConfig {
                    strategy,
                    ..config.clone()
                },
            );

            let installed = provisioner
                .provision("macosx_11_0_arm64", &version())
                .await
                .unwrap();
            assert_eq!(installed, destination);
        }

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_asset_not_found() {
        let mut server = mockito::Server::new_async().await;
        let asset = server
            .mock("GET", ASSET_PATH)
            .with_status(404)
            .expect(1)
            .create_async()
            .await;
        // Download mode must never fall back to building from source
        let source = server
            .mock("GET", SOURCE_PATH)
            .expect(0)
            .create_async()
            .await;
        let fixture = Fixture::new(&server.url(), Strategy::DownloadPrebuilt);

        let provisioner = Provisioner::new(
            RealRuntime,
            http(),
            TarGzExtractor,
            MockToolchainBuilder::new(),
            fixture.config.clone(),
        );
        let err = provisioner
            .provision("manylinux_2_17_x86_64", &version())
            .await
            .unwrap_err();

        asset.assert_async().await;
        source.assert_async().await;
        assert_eq!(
            classified(&err),
            &ProvisionError::NotFound {
                url: format!("{}{}", server.url(), ASSET_PATH)
            }
        );
        assert!(!classified(&err).is_retryable());
        assert!(!fixture.destination().exists());
        assert!(!fixture.config.package_root.exists());
        assert!(fixture.scratch_is_empty());
    }

    #[tokio::test]
    async fn test_connection_failure_is_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);
        let fixture = Fixture::new(&url, Strategy::DownloadPrebuilt);

        let provisioner = Provisioner::new(
            RealRuntime,
            http(),
            TarGzExtractor,
            MockToolchainBuilder::new(),
            fixture.config.clone(),
        );
        let err = provisioner
            .provision("win_amd64", &version())
            .await
            .unwrap_err();

        let classified = classified(&err);
        assert!(matches!(classified, ProvisionError::Network { url: u, .. }
            if u.ends_with("gnetcli_server-v1.2.3-windows-amd64.tar.gz")));
        assert!(classified.is_retryable());
        assert!(fixture.scratch_is_empty());
    }

    #[tokio::test]
    async fn test_asset_without_binary_is_extraction_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", ASSET_PATH)
            .with_status(200)
            .with_body(tar_gz(&[TarEntry::file("README.md", "docs")]))
            .create_async()
            .await;
        let fixture = Fixture::new(&server.url(), Strategy::DownloadPrebuilt);

        let provisioner = Provisioner::new(
            RealRuntime,
            http(),
            TarGzExtractor,
            MockToolchainBuilder::new(),
            fixture.config.clone(),
        );
        let err = provisioner
            .provision("manylinux_2_17_x86_64", &version())
            .await
            .unwrap_err();

        assert!(matches!(classified(&err), ProvisionError::Extraction { .. }));
        assert!(!fixture.destination().exists());
        assert!(fixture.scratch_is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_platform_touches_nothing() {
        let provisioner = Provisioner::new(
            MockRuntime::new(),
            http(),
            MockArchiveExtractor::new(),
            MockToolchainBuilder::new(),
            ProvisionConfig::default(),
        );

        let err = provisioner
            .provision("win32", &version())
            .await
            .unwrap_err();

        assert_eq!(
            classified(&err),
            &ProvisionError::UnsupportedPlatform {
                tag: "win32".into()
            }
        );
    }

    #[tokio::test]
    async fn test_build_from_source_with_mocked_toolchain() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", SOURCE_PATH)
            .with_status(200)
            .with_body(tar_gz(&[
                TarEntry::dir("annetutil-gnetcli-0123abc/"),
                TarEntry::file("annetutil-gnetcli-0123abc/go.mod", "module gnetcli"),
                TarEntry::file(
                    "annetutil-gnetcli-0123abc/cmd/gnetcli_server/main.go",
                    "package main",
                ),
            ]))
            .expect(1)
            .create_async()
            .await;
        let fixture = Fixture::new(&server.url(), Strategy::BuildFromSource);

        let mut toolchain = MockToolchainBuilder::new();
        toolchain.expect_probe().times(1).returning(|| Ok(()));
        toolchain
            .expect_build()
            .withf(|source_root, target, output| {
                source_root.join("go.mod").is_file()
                    && source_root.join("cmd/gnetcli_server/main.go").is_file()
                    && target
                        == &CrossTarget {
                            goos: "darwin",
                            goarch: "arm64",
                        }
                    && output.ends_with("gnetcli_server")
            })
            .times(1)
            .returning(|_, _, output| {
                fs::write(output, "built-darwin-arm64")?;
                Ok(output.to_path_buf())
            });

        let provisioner = Provisioner::new(
            RealRuntime,
            http(),
            TarGzExtractor,
            toolchain,
            fixture.config.clone(),
        );
        let installed = provisioner
            .provision("macosx_11_0_arm64", &version())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(fs::read_to_string(installed).unwrap(), "built-darwin-arm64");
        assert!(fixture.scratch_is_empty());
    }

    #[tokio::test]
    async fn test_build_from_source_missing_toolchain_skips_download() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", SOURCE_PATH)
            .expect(0)
            .create_async()
            .await;
        let fixture = Fixture::new(&server.url(), Strategy::BuildFromSource);

        let mut toolchain = MockToolchainBuilder::new();
        toolchain.expect_probe().times(1).returning(|| {
            Err(ProvisionError::ToolchainMissing {
                program: "go".into(),
            }
            .into())
        });
        toolchain.expect_build().never();

        let provisioner = Provisioner::new(
            RealRuntime,
            http(),
            TarGzExtractor,
            toolchain,
            fixture.config.clone(),
        );
        let err = provisioner
            .provision("manylinux_2_17_x86_64", &version())
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert!(matches!(
            classified(&err),
            ProvisionError::ToolchainMissing { .. }
        ));
        assert!(fixture.scratch_is_empty());
    }

    #[cfg(unix)]
    mod with_fake_compiler {
        use super::*;
        use crate::test_utils::{FAKE_GO_FAILING, FAKE_GO_OK, write_script};

        fn source_tarball() -> Vec<u8> {
            tar_gz(&[
                TarEntry::dir("annetutil-gnetcli-0123abc/"),
                TarEntry::file("annetutil-gnetcli-0123abc/go.mod", "module gnetcli"),
                TarEntry::file(
                    "annetutil-gnetcli-0123abc/cmd/gnetcli_server/main.go",
                    "package main",
                ),
            ])
        }

        #[test_log::test(tokio::test)]
        async fn test_build_from_source_end_to_end() {
            let mut server = mockito::Server::new_async().await;
            let _mock = server
                .mock("GET", SOURCE_PATH)
                .with_status(200)
                .with_body(source_tarball())
                .create_async()
                .await;
            let fixture = Fixture::new(&server.url(), Strategy::BuildFromSource);
            let tools = tempdir().unwrap();
            let go = write_script(tools.path(), "go", FAKE_GO_OK);

            let provisioner = Provisioner::new(
                RealRuntime,
                http(),
                TarGzExtractor,
                GoToolchain::new(go.to_string_lossy(), "./cmd/gnetcli_server"),
                fixture.config.clone(),
            );
            let installed = provisioner
                .provision("manylinux_2_28_aarch64", &version())
                .await
                .unwrap();

            let content = fs::read_to_string(&installed).unwrap();
            assert!(
                content.starts_with("linux/arm64 ./cmd/gnetcli_server "),
                "{}",
                content
            );
            assert!(fixture.scratch_is_empty());
        }

        #[tokio::test]
        async fn test_compiler_failure_reports_status() {
            let mut server = mockito::Server::new_async().await;
            let _mock = server
                .mock("GET", SOURCE_PATH)
                .with_status(200)
                .with_body(source_tarball())
                .create_async()
                .await;
            let fixture = Fixture::new(&server.url(), Strategy::BuildFromSource);
            let tools = tempdir().unwrap();
            let go = write_script(tools.path(), "go", FAKE_GO_FAILING);

            let provisioner = Provisioner::new(
                RealRuntime,
                http(),
                TarGzExtractor,
                GoToolchain::new(go.to_string_lossy(), "./cmd/gnetcli_server"),
                fixture.config.clone(),
            );
            let err = provisioner
                .provision("manylinux_2_17_x86_64", &version())
                .await
                .unwrap_err();

            assert!(matches!(
                classified(&err),
                ProvisionError::Toolchain {
                    status: Some(1),
                    ..
                }
            ));
            assert!(!fixture.destination().exists());
            assert!(fixture.scratch_is_empty());
        }
    }
}
