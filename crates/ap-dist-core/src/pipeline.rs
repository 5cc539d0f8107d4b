//! Release pipeline.
//!
//! Resolves the version once, then runs build and assembly for each
//! platform as an independent blocking task. Platforms are batched
//! `parallel` at a time. A failed platform produces no archive and does not
//! stop the others. The archives that were produced are handed to the
//! publisher together.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ap_dist_schema::{ArchiveArtifact, PlatformEntry, ReleaseAsset, ReleaseVersion};
use futures::future::join_all;

use crate::assembler::Assembler;
use crate::builder::BuildDriver;
use crate::error::ReleaseError;
use crate::manifest::DistManifest;
use crate::publisher::{Publisher, publish_artifacts};
use crate::reporter::Reporter;

/// Outcome of one platform pipeline.
#[derive(Debug)]
pub struct PlatformReport {
    pub platform: PlatformEntry,
    pub outcome: Result<ArchiveArtifact, ReleaseError>,
    pub elapsed: Duration,
}

/// Outcome of a whole run.
#[derive(Debug)]
pub struct RunReport {
    pub version: ReleaseVersion,
    /// In the order the platforms were given.
    pub platforms: Vec<PlatformReport>,
    /// Empty unless the run published.
    pub assets: Vec<Result<ReleaseAsset, ReleaseError>>,
    pub manifest: Option<PathBuf>,
}

impl RunReport {
    pub fn artifacts(&self) -> impl Iterator<Item = &ArchiveArtifact> {
        self.platforms.iter().filter_map(|p| p.outcome.as_ref().ok())
    }

    pub fn failed_platforms(&self) -> impl Iterator<Item = (&PlatformEntry, &ReleaseError)> {
        self.platforms
            .iter()
            .filter_map(|p| p.outcome.as_ref().err().map(|e| (&p.platform, e)))
    }

    pub fn failed_assets(&self) -> impl Iterator<Item = &ReleaseError> {
        self.assets.iter().filter_map(|a| a.as_ref().err())
    }

    /// The run fails if any platform or any asset failed.
    pub fn is_success(&self) -> bool {
        self.failed_platforms().next().is_none() && self.failed_assets().next().is_none()
    }
}

pub struct Pipeline {
    driver: Arc<BuildDriver>,
    assembler: Arc<Assembler>,
    reporter: Arc<dyn Reporter>,
    parallel: usize,
}

impl Pipeline {
    pub fn new(driver: BuildDriver, assembler: Assembler, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            driver: Arc::new(driver),
            assembler: Arc::new(assembler),
            reporter,
            parallel: 1,
        }
    }

    /// Number of platform pipelines run at once.
    pub fn parallel(mut self, parallel: usize) -> Self {
        self.parallel = parallel.max(1);
        self
    }

    /// Build and assemble every platform for the tag `reference`.
    ///
    /// # Errors
    ///
    /// Only [`ReleaseError::InvalidVersionFormat`] is returned directly, and
    /// in that case no platform has started. Per-platform failures are
    /// recorded in the report.
    pub async fn package(
        &self,
        reference: &str,
        platforms: &[PlatformEntry],
    ) -> Result<RunReport, ReleaseError> {
        let version = ReleaseVersion::resolve(reference)?;
        tracing::info!("resolved {reference} to version {version}");
        self.reporter.section(&format!("packaging {version}"));

        let mut reports = Vec::with_capacity(platforms.len());
        for chunk in platforms.chunks(self.parallel) {
            let tasks = chunk.iter().map(|platform| {
                let driver = Arc::clone(&self.driver);
                let assembler = Arc::clone(&self.assembler);
                let reporter = Arc::clone(&self.reporter);
                let version = version.clone();
                let task_platform = platform.clone();

                async move {
                    let started = Instant::now();
                    let joined = tokio::task::spawn_blocking(move || {
                        run_platform(&driver, &assembler, &*reporter, &version, &task_platform)
                    })
                    .await;
                    let outcome = joined.unwrap_or_else(|e| {
                        Err(ReleaseError::Task(format!("{}: {e}", platform.id)))
                    });
                    PlatformReport {
                        platform: platform.clone(),
                        outcome,
                        elapsed: started.elapsed(),
                    }
                }
            });
            reports.extend(join_all(tasks).await);
        }

        for report in &reports {
            match &report.outcome {
                Ok(artifact) => self
                    .reporter
                    .packaged(artifact, report.elapsed.as_secs_f64()),
                Err(e) => {
                    tracing::error!("{}: {e}", report.platform.id);
                    self.reporter.platform_failed(&report.platform, &e.to_string());
                }
            }
        }

        let mut report = RunReport {
            version,
            platforms: reports,
            assets: Vec::new(),
            manifest: None,
        };

        let artifacts: Vec<ArchiveArtifact> = report.artifacts().cloned().collect();
        if !artifacts.is_empty() {
            let manifest = DistManifest::new(&report.version, &artifacts);
            match manifest.write(self.assembler.dist_dir()) {
                Ok(path) => report.manifest = Some(path),
                Err(e) => self
                    .reporter
                    .warning(&format!("failed to write manifest: {e}")),
            }
        }

        Ok(report)
    }

    /// [`package`](Self::package), then upload every archive produced.
    ///
    /// Platforms that failed contribute nothing; the rest still publish.
    ///
    /// # Errors
    ///
    /// Same as [`package`](Self::package).
    pub async fn release<P: Publisher + ?Sized>(
        &self,
        reference: &str,
        platforms: &[PlatformEntry],
        publisher: &P,
    ) -> Result<RunReport, ReleaseError> {
        let mut report = self.package(reference, platforms).await?;

        let artifacts: Vec<ArchiveArtifact> = report.artifacts().cloned().collect();
        if artifacts.is_empty() {
            self.reporter.warning("no archives were produced, nothing to publish");
            return Ok(report);
        }

        self.reporter
            .section(&format!("publishing to release {}", report.version));
        report.assets =
            publish_artifacts(publisher, &report.version, &artifacts, &*self.reporter).await;

        Ok(report)
    }
}

fn run_platform(
    driver: &BuildDriver,
    assembler: &Assembler,
    reporter: &dyn Reporter,
    version: &ReleaseVersion,
    platform: &PlatformEntry,
) -> Result<ArchiveArtifact, ReleaseError> {
    // A platform that fails from here on must not leave last run's archive.
    assembler.discard(version, platform)?;
    reporter.building(platform);
    let output = driver.build(platform, version)?;
    reporter.assembling(platform);
    assembler.assemble(version, platform, &output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ap_dist_schema::{AssetStatus, default_matrix};
    use crate::builder::Toolchain;
    use crate::reporter::NullReporter;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Writes the expected binaries unless the platform is in `fail`.
    struct FakeToolchain {
        fail: Vec<&'static str>,
    }

    impl Toolchain for FakeToolchain {
        fn install_packages(&self, _: &PlatformEntry) -> anyhow::Result<()> {
            Ok(())
        }

        fn compile(
            &self,
            platform: &PlatformEntry,
            _: &ReleaseVersion,
            output_root: &Path,
        ) -> anyhow::Result<()> {
            if self.fail.contains(&platform.id.as_str()) {
                anyhow::bail!("linker exploded");
            }
            let dir = output_root.join(&platform.target).join("release");
            std::fs::create_dir_all(&dir)?;
            for name in platform.binary_file_names() {
                std::fs::write(dir.join(&name), &name)?;
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingPublisher {
        uploads: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Publisher for RecordingPublisher {
        async fn upload(
            &self,
            version: &ReleaseVersion,
            path: &Path,
            _: &str,
        ) -> Result<ReleaseAsset, ReleaseError> {
            let name = path.file_name().unwrap().to_string_lossy().into_owned();
            self.uploads.lock().unwrap().push(name.clone());
            Ok(ReleaseAsset {
                name,
                version: version.clone(),
                url: None,
                status: AssetStatus::Uploaded,
            })
        }
    }

    fn pipeline(root: &Path, fail: Vec<&'static str>) -> Pipeline {
        let driver = BuildDriver::new(Arc::new(FakeToolchain { fail }), root.join("target"));
        let assembler = Assembler::new(root.join("dist"));
        Pipeline::new(driver, assembler, Arc::new(NullReporter)).parallel(2)
    }

    #[tokio::test]
    async fn test_package_all_platforms() {
        let tmp = tempdir().unwrap();
        let report = pipeline(tmp.path(), vec![])
            .package("refs/tags/2.0.1", &default_matrix())
            .await
            .unwrap();

        assert!(report.is_success());
        assert_eq!(report.version.as_str(), "2.0.1");
        let names: Vec<_> = report.artifacts().map(|a| a.file_name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "ap-2.0.1-x86_64-pc-windows-msvc.zip",
                "ap-2.0.1-x86_64-unknown-linux-gnu.tar.gz",
            ]
        );
        assert_eq!(report.manifest, Some(tmp.path().join("dist/manifest.json")));
    }

    #[tokio::test]
    async fn test_failed_platform_does_not_block_others() {
        let tmp = tempdir().unwrap();
        let report = pipeline(tmp.path(), vec!["windows"])
            .package("2.0.1", &default_matrix())
            .await
            .unwrap();

        assert!(!report.is_success());
        let failed: Vec<_> = report.failed_platforms().map(|(p, _)| p.id.as_str()).collect();
        assert_eq!(failed, vec!["windows"]);
        assert_eq!(report.artifacts().count(), 1);
        assert!(!tmp.path().join("dist/ap-2.0.1-x86_64-pc-windows-msvc.zip").exists());
    }

    #[tokio::test]
    async fn test_failed_rebuild_removes_previous_archive() {
        let tmp = tempdir().unwrap();
        let windows: Vec<_> = default_matrix()
            .into_iter()
            .filter(|p| p.id == "windows")
            .collect();
        let zip = tmp.path().join("dist/ap-2.0.1-x86_64-pc-windows-msvc.zip");
        let checksum = tmp.path().join("dist/ap-2.0.1-x86_64-pc-windows-msvc.zip.sha256");

        let first = pipeline(tmp.path(), vec![]).package("2.0.1", &windows).await.unwrap();
        assert!(first.is_success());
        assert!(zip.is_file());
        assert!(checksum.is_file());

        let second = pipeline(tmp.path(), vec!["windows"])
            .package("2.0.1", &windows)
            .await
            .unwrap();
        assert!(!second.is_success());
        let (_, err) = second.failed_platforms().next().unwrap();
        assert!(matches!(err, ReleaseError::BuildFailed { .. }), "{err:?}");
        assert!(!zip.exists());
        assert!(!checksum.exists());
    }

    #[tokio::test]
    async fn test_invalid_version_aborts() {
        let tmp = tempdir().unwrap();
        let err = pipeline(tmp.path(), vec![])
            .package("v2.0", &default_matrix())
            .await
            .unwrap_err();

        assert!(matches!(err, ReleaseError::InvalidVersionFormat(_)));
        assert!(!tmp.path().join("target").exists());
        assert!(!tmp.path().join("dist").exists());
    }

    #[tokio::test]
    async fn test_release_publishes_only_successful_platforms() {
        let tmp = tempdir().unwrap();
        let publisher = RecordingPublisher::default();
        let report = pipeline(tmp.path(), vec!["windows"])
            .release("2.0.1", &default_matrix(), &publisher)
            .await
            .unwrap();

        let mut uploads = publisher.uploads.lock().unwrap().clone();
        uploads.sort();
        assert_eq!(
            uploads,
            vec![
                "ap-2.0.1-x86_64-unknown-linux-gnu.tar.gz",
                "ap-2.0.1-x86_64-unknown-linux-gnu.tar.gz.sha256",
            ]
        );
        assert_eq!(report.assets.len(), 2);
        assert!(!report.is_success());
    }

    #[tokio::test]
    async fn test_release_with_nothing_packaged() {
        let tmp = tempdir().unwrap();
        let publisher = RecordingPublisher::default();
        let report = pipeline(tmp.path(), vec!["windows", "linux"])
            .release("2.0.1", &default_matrix(), &publisher)
            .await
            .unwrap();

        assert!(publisher.uploads.lock().unwrap().is_empty());
        assert!(report.assets.is_empty());
        assert!(report.manifest.is_none());
    }
}
