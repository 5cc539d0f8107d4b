//! Platform build driver.
//!
//! Compilation is delegated to a [`Toolchain`]. The driver only decides what
//! to run for a [`PlatformEntry`] (the system package step, then a release
//! build for its target) and where the result lands:
//!
//! ```text
//! {output_root}/{target}/release/{binary}{exe_suffix}
//! ```
//!
//! ## Environment contract
//!
//! [`CargoToolchain`] invokes `cargo build --release --target <target>
//! --target-dir <output_root>` in the project directory. Output goes to a log
//! file under the configured log directory unless `verbose` is set; when the
//! build fails the last 20 lines of that log are folded into the error.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use ap_dist_schema::{PlatformEntry, ReleaseVersion};

use crate::error::ReleaseError;

/// Lines of a failed build log included in the error.
const LOG_TAIL_LINES: usize = 20;

/// Location of the binaries a successful build left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutput {
    dir: PathBuf,
}

impl BuildOutput {
    /// The deterministic output directory for `target` under `output_root`.
    pub fn locate(output_root: &Path, target: &str) -> Self {
        Self {
            dir: output_root.join(target).join("release"),
        }
    }

    /// Directory holding the binaries.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of one binary file (suffix already applied).
    pub fn binary_path(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }
}

/// External compiler collaborator.
///
/// Implementations block until the step finishes.
pub trait Toolchain: Send + Sync {
    /// Install system packages required to build `platform`.
    ///
    /// Only called when `platform.system_packages` is non-empty.
    fn install_packages(&self, platform: &PlatformEntry) -> Result<()>;

    /// Produce an optimized build of every binary for `platform.target`
    /// under `output_root`.
    fn compile(
        &self,
        platform: &PlatformEntry,
        version: &ReleaseVersion,
        output_root: &Path,
    ) -> Result<()>;
}

/// Drives one platform from source to [`BuildOutput`].
#[derive(Clone)]
pub struct BuildDriver {
    toolchain: Arc<dyn Toolchain>,
    output_root: PathBuf,
    skip_build: bool,
}

impl std::fmt::Debug for BuildDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildDriver")
            .field("output_root", &self.output_root)
            .field("skip_build", &self.skip_build)
            .finish_non_exhaustive()
    }
}

impl BuildDriver {
    /// Create a driver that compiles into `output_root`.
    pub fn new(toolchain: Arc<dyn Toolchain>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            toolchain,
            output_root: output_root.into(),
            skip_build: false,
        }
    }

    /// A driver that never compiles and only locates binaries already in
    /// `output_root`. No toolchain needs to be installed.
    pub fn prebuilt(output_root: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(Prebuilt), output_root).skip_build(true)
    }

    /// Package whatever is already in the output root instead of compiling.
    pub fn skip_build(mut self, skip: bool) -> Self {
        self.skip_build = skip;
        self
    }

    /// Build root this driver writes to.
    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Run the system package step (if any) and the compile step.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::BuildFailed`] if either step fails. The
    /// platform must not be assembled in that case.
    pub fn build(
        &self,
        platform: &PlatformEntry,
        version: &ReleaseVersion,
    ) -> Result<BuildOutput, ReleaseError> {
        let output = BuildOutput::locate(&self.output_root, &platform.target);

        if self.skip_build {
            tracing::debug!(
                "skipping build for {}, using {}",
                platform.id,
                output.dir().display()
            );
            return Ok(output);
        }

        if !platform.system_packages.is_empty() {
            tracing::info!(
                "installing system packages for {}: {}",
                platform.id,
                platform.system_packages.join(" ")
            );
            self.toolchain
                .install_packages(platform)
                .context("system package installation failed")
                .map_err(|e| ReleaseError::build_failed(&platform.id, e))?;
        }

        self.toolchain
            .compile(platform, version, &self.output_root)
            .map_err(|e| ReleaseError::build_failed(&platform.id, e))?;

        Ok(output)
    }
}

/// Stands in for a toolchain when nothing is to be compiled.
#[derive(Debug)]
struct Prebuilt;

impl Toolchain for Prebuilt {
    fn install_packages(&self, platform: &PlatformEntry) -> Result<()> {
        anyhow::bail!("no toolchain configured to install packages for {}", platform.id)
    }

    fn compile(&self, platform: &PlatformEntry, _: &ReleaseVersion, _: &Path) -> Result<()> {
        anyhow::bail!("no toolchain configured to compile {}", platform.target)
    }
}

/// [`Toolchain`] backed by `cargo` and a package manager command.
#[derive(Debug, Clone)]
pub struct CargoToolchain {
    cargo: PathBuf,
    project_dir: PathBuf,
    log_dir: PathBuf,
    install_command: Vec<String>,
    verbose: bool,
}

impl CargoToolchain {
    /// Locate `cargo` on `PATH` (or `$CARGO`, as set inside cargo
    /// subcommands) and build in `project_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if no cargo executable can be found.
    pub fn new(project_dir: impl Into<PathBuf>, log_dir: impl Into<PathBuf>) -> Result<Self> {
        let cargo = match std::env::var_os("CARGO") {
            Some(path) => PathBuf::from(path),
            None => which::which("cargo").context("cargo not found on PATH")?,
        };

        Ok(Self {
            cargo,
            project_dir: project_dir.into(),
            log_dir: log_dir.into(),
            install_command: Vec::new(),
            verbose: false,
        })
    }

    /// Command prefix used for system packages, e.g. `sudo apt-get install -y`.
    pub fn with_install_command(mut self, command: Vec<String>) -> Self {
        self.install_command = command;
        self
    }

    /// Stream compiler output to the terminal instead of a log file.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// The `cargo build` invocation for a target.
    pub fn build_command(&self, target: &str, output_root: &Path) -> Command {
        let mut cmd = Command::new(&self.cargo);
        cmd.arg("build")
            .arg("--release")
            .arg("--target")
            .arg(target)
            .arg("--target-dir")
            .arg(output_root)
            .current_dir(&self.project_dir);
        cmd
    }

    /// The package manager invocation for a platform's system packages.
    ///
    /// # Errors
    ///
    /// Returns an error if no install command is configured.
    pub fn install_command(&self, platform: &PlatformEntry) -> Result<Command> {
        let (program, args) = self
            .install_command
            .split_first()
            .context("no install command configured for system packages")?;
        let mut cmd = Command::new(program);
        cmd.args(args).args(&platform.system_packages);
        Ok(cmd)
    }

    fn run_logged(&self, mut cmd: Command, log_path: &Path, what: &str) -> Result<()> {
        tracing::debug!("running {cmd:?}");

        let status = if self.verbose {
            cmd.status()
                .with_context(|| format!("Failed to execute {what}"))?
        } else {
            if let Some(parent) = log_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let log_file =
                std::fs::File::create(log_path).context("Failed to create build log file")?;
            cmd.stdout(Stdio::from(log_file.try_clone()?))
                .stderr(Stdio::from(log_file))
                .status()
                .with_context(|| format!("Failed to execute {what}"))?
        };

        if status.success() {
            return Ok(());
        }

        if self.verbose {
            anyhow::bail!("{what} failed with exit code: {:?}", status.code());
        }

        let tail = read_last_lines(log_path, LOG_TAIL_LINES).unwrap_or_default();
        anyhow::bail!(
            "{what} failed with exit code: {:?}\nlast {LOG_TAIL_LINES} lines:\n{tail}\nfull log: {}",
            status.code(),
            log_path.display()
        );
    }

    fn log_path(&self, kind: &str, platform: &PlatformEntry, version: Option<&ReleaseVersion>) -> PathBuf {
        let timestamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
        let name = match version {
            Some(v) => format!("{kind}-{}-{v}-{timestamp}.log", platform.id),
            None => format!("{kind}-{}-{timestamp}.log", platform.id),
        };
        self.log_dir.join(name)
    }
}

impl Toolchain for CargoToolchain {
    fn install_packages(&self, platform: &PlatformEntry) -> Result<()> {
        let cmd = self.install_command(platform)?;
        let log_path = self.log_path("deps", platform, None);
        self.run_logged(cmd, &log_path, "system package install")
    }

    fn compile(
        &self,
        platform: &PlatformEntry,
        version: &ReleaseVersion,
        output_root: &Path,
    ) -> Result<()> {
        let cmd = self.build_command(&platform.target, output_root);
        let log_path = self.log_path("build", platform, Some(version));
        self.run_logged(cmd, &log_path, "cargo build")
    }
}

/// Read the last N lines from a file efficiently.
///
/// Instead of loading the entire file, we seek to near the end and read a fixed-size
/// tail buffer. Release builds of GUI crates produce very long logs.
fn read_last_lines(path: &Path, n: usize) -> Result<String> {
    use std::fs::File;
    use std::io::{Read, Seek, SeekFrom};

    // Read at most 16KB from the end (enough for ~400 lines at 40 chars each)
    const TAIL_SIZE: u64 = 16 * 1024;

    let mut file = File::open(path)?;
    let file_len = file.metadata()?.len();

    let seek_pos = file_len.saturating_sub(TAIL_SIZE);
    file.seek(SeekFrom::Start(seek_pos))?;

    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    let buffer = String::from_utf8_lossy(&bytes);

    // If we seeked mid-file, skip the first (partial) line
    let content = if seek_pos > 0 {
        buffer.find('\n').map_or(&buffer[..], |idx| &buffer[idx + 1..])
    } else {
        &buffer[..]
    };

    let lines: Vec<&str> = content.lines().collect();
    let start = lines.len().saturating_sub(n);
    Ok(lines[start..].join("\n"))
}
