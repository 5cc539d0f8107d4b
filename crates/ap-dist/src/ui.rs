//! Console output.

use std::io::Write;
use std::sync::Mutex;

use ap_dist_core::Reporter;
use ap_dist_schema::{ArchiveArtifact, AssetStatus, PlatformEntry, ReleaseAsset};
use crossterm::style::Stylize;

/// Prints one indented status line per event.
///
/// Platform workers report from several threads at once; the lock keeps
/// their lines whole.
#[derive(Debug, Default)]
pub struct ConsoleReporter {
    lock: Mutex<()>,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self::default()
    }

    fn line(&self, text: &str) {
        let _guard = self.lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut out = std::io::stdout().lock();
        writeln!(out, "{text}").ok();
    }
}

impl Reporter for ConsoleReporter {
    fn section(&self, title: &str) {
        self.line(&format!("\n{}", title.bold()));
    }

    fn building(&self, platform: &PlatformEntry) {
        self.line(&format!("  {} {platform}", "building".dark_grey()));
    }

    fn assembling(&self, platform: &PlatformEntry) {
        self.line(&format!("  {} {}", "packing".dark_grey(), platform.id));
    }

    fn packaged(&self, artifact: &ArchiveArtifact, elapsed_secs: f64) {
        self.line(&format!(
            "  {} {} {} {}",
            "ok".green(),
            artifact.file_name,
            format_size(artifact.size).dark_grey(),
            format!("{elapsed_secs:.1}s").dark_grey()
        ));
    }

    fn platform_failed(&self, platform: &PlatformEntry, reason: &str) {
        self.line(&format!("  {} {}: {reason}", "failed".red(), platform.id));
    }

    fn uploading(&self, asset: &str) {
        self.line(&format!("  {} {asset}", "uploading".dark_grey()));
    }

    fn uploaded(&self, asset: &ReleaseAsset) {
        let status = match asset.status {
            AssetStatus::Uploaded => "uploaded".green(),
            AssetStatus::Replaced => "replaced".yellow(),
            AssetStatus::Skipped => "skipped".dark_grey(),
        };
        self.line(&format!("  {status} {}", asset.name));
    }

    fn upload_failed(&self, asset: &str, reason: &str) {
        self.line(&format!("  {} {asset}: {reason}", "failed".red()));
    }

    fn info(&self, msg: &str) {
        self.line(&format!("  {msg}"));
    }

    fn warning(&self, msg: &str) {
        self.line(&format!("  {} {msg}", "warning".yellow()));
    }
}

/// Human-readable byte count, e.g. `4.2 MB`.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    #[allow(clippy::cast_precision_loss)]
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}
