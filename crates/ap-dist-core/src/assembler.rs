//! Archive assembler.
//!
//! Turns a platform's [`BuildOutput`] into `ap-{version}-{target}.{zip|tar.gz}`:
//!
//! 1. Every expected binary is checked before anything on disk changes, so a
//!    missing binary never leaves a partial archive behind.
//! 2. The binaries are moved into a fresh staging directory named after the
//!    archive.
//! 3. The staging directory is compressed into a `.partial` sibling, its
//!    listing is checked, and it is renamed into place.
//!
//! Archives are reproducible: entries follow the platform's binary order,
//! timestamps are fixed (epoch 0 for tar, 1980-01-01 for zip), every binary
//! is mode `0755`, and owner ids are zero.

use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use ap_dist_schema::{
    ArchiveArtifact, ArchiveFormat, PlatformEntry, ReleaseVersion, archive_base_name,
    archive_file_name,
};
use flate2::Compression;
use flate2::write::GzEncoder;
use sha2::{Digest, Sha256};

use crate::builder::BuildOutput;
use crate::config::is_plain_name;
use crate::error::ReleaseError;
use crate::io::extract;

/// Permission bits recorded for every packaged binary.
const BINARY_MODE: u32 = 0o755;

/// Packs build outputs into release archives under a dist directory.
#[derive(Debug, Clone)]
pub struct Assembler {
    dist_dir: PathBuf,
    checksums: bool,
}

impl Assembler {
    /// Create an assembler writing to `dist_dir`. Checksums are on.
    pub fn new(dist_dir: impl Into<PathBuf>) -> Self {
        Self {
            dist_dir: dist_dir.into(),
            checksums: true,
        }
    }

    /// Write a `<archive>.sha256` file next to each archive.
    pub fn with_checksums(mut self, enabled: bool) -> Self {
        self.checksums = enabled;
        self
    }

    /// Directory holding staging directories and archives.
    pub fn dist_dir(&self) -> &Path {
        &self.dist_dir
    }

    /// Remove any archive and checksum an earlier run left for `platform`.
    ///
    /// Called before the build starts so a platform that fails at any stage
    /// has no archive in the dist directory.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::Io`] if an existing file cannot be removed.
    pub fn discard(
        &self,
        version: &ReleaseVersion,
        platform: &PlatformEntry,
    ) -> Result<(), ReleaseError> {
        let file_name = archive_file_name(version, platform);
        remove_if_exists(&self.dist_dir.join(&file_name))?;
        remove_if_exists(&self.dist_dir.join(format!("{file_name}.sha256")))?;
        Ok(())
    }

    /// Stage and compress one platform's binaries.
    ///
    /// Any archive of the same name from an earlier run is removed first,
    /// so a failed assembly leaves no archive for the platform. If
    /// compression fails the binaries are moved back into `output`.
    ///
    /// # Errors
    ///
    /// - [`ReleaseError::MissingBinary`] if an expected binary is absent.
    /// - [`ReleaseError::Archive`] if the written archive has the wrong layout.
    /// - [`ReleaseError::Io`] for filesystem failures.
    pub fn assemble(
        &self,
        version: &ReleaseVersion,
        platform: &PlatformEntry,
        output: &BuildOutput,
    ) -> Result<ArchiveArtifact, ReleaseError> {
        let base = archive_base_name(version, &platform.target);
        let file_name = archive_file_name(version, platform);
        let archive_path = self.dist_dir.join(&file_name);
        let checksum_path = self.dist_dir.join(format!("{file_name}.sha256"));

        fs::create_dir_all(&self.dist_dir)?;
        self.discard(version, platform)?;

        let binaries = platform.binary_file_names();
        check_names(&base, &binaries)?;
        let sources = binaries
            .iter()
            .map(|name| {
                let path = output.binary_path(name);
                if path.is_file() {
                    Ok((name.as_str(), path))
                } else {
                    Err(ReleaseError::MissingBinary {
                        name: name.clone(),
                        dir: output.dir().to_path_buf(),
                    })
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        let staging = self.dist_dir.join(&base);
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir_all(&staging)?;

        for (i, (name, source)) in sources.iter().enumerate() {
            if let Err(e) = move_file(source, &staging.join(name)) {
                restore(&staging, &sources[..i]);
                return Err(e.into());
            }
        }
        tracing::debug!(
            "staged {} binaries in {}",
            sources.len(),
            staging.display()
        );

        let partial = self.dist_dir.join(format!(".{file_name}.partial"));
        let written = match platform.format {
            ArchiveFormat::TarGz => write_tar_gz(&partial, &staging, &base, &binaries),
            ArchiveFormat::Zip => write_zip(&partial, &staging, &base, &binaries),
        }
        .and_then(|()| verify_layout(&partial, platform.format, &base, &binaries));

        if let Err(e) = written {
            fs::remove_file(&partial).ok();
            restore(&staging, &sources);
            return Err(e);
        }

        fs::rename(&partial, &archive_path)?;
        fs::remove_dir_all(&staging)?;

        let (sha256, size) = sha256_file(&archive_path)?;
        let checksum_path = if self.checksums {
            fs::write(&checksum_path, format!("{sha256}  {file_name}\n"))?;
            Some(checksum_path)
        } else {
            None
        };

        tracing::info!("wrote {} ({size} bytes)", archive_path.display());

        Ok(ArchiveArtifact {
            platform: platform.id.clone(),
            target: platform.target.clone(),
            format: platform.format,
            file_name,
            path: archive_path,
            size,
            sha256,
            checksum_path,
        })
    }
}

/// Entry names must be distinct single path components.
fn check_names(base: &str, binaries: &[String]) -> Result<(), ReleaseError> {
    for (i, name) in binaries.iter().enumerate() {
        if !is_plain_name(name) || binaries[..i].contains(name) {
            return Err(ReleaseError::Config(format!(
                "cannot package {name:?} into {base}: binary names must be distinct file names"
            )));
        }
    }
    if is_plain_name(base) {
        Ok(())
    } else {
        Err(ReleaseError::Config(format!(
            "archive name {base:?} is not a plain file name"
        )))
    }
}

/// Put staged binaries back where the build left them and drop staging.
fn restore(staging: &Path, sources: &[(&str, PathBuf)]) {
    for (name, source) in sources {
        if let Err(e) = move_file(&staging.join(name), source) {
            tracing::warn!("could not restore {}: {e}", source.display());
        }
    }
    if let Err(e) = fs::remove_dir_all(staging) {
        tracing::warn!("could not remove {}: {e}", staging.display());
    }
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Move a file, falling back to copy + delete across filesystems.
fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to)?;
    fs::remove_file(from)
}

fn write_tar_gz(
    dest: &Path,
    staging: &Path,
    base: &str,
    binaries: &[String],
) -> Result<(), ReleaseError> {
    let file = File::create(dest)?;
    let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    let mut builder = tar::Builder::new(encoder);

    let mut dir = tar_header(tar::EntryType::Directory, 0);
    builder.append_data(&mut dir, format!("{base}/"), io::empty())?;

    for name in binaries {
        let mut binary = File::open(staging.join(name))?;
        let len = binary.metadata()?.len();
        let mut header = tar_header(tar::EntryType::Regular, len);
        builder.append_data(&mut header, format!("{base}/{name}"), &mut binary)?;
    }

    let encoder = builder.into_inner()?;
    let writer = encoder.finish()?;
    writer.into_inner().map_err(io::IntoInnerError::into_error)?.sync_all()?;
    Ok(())
}

fn tar_header(entry_type: tar::EntryType, size: u64) -> tar::Header {
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(entry_type);
    header.set_size(size);
    header.set_mode(BINARY_MODE);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    header
}

fn write_zip(
    dest: &Path,
    staging: &Path,
    base: &str,
    binaries: &[String],
) -> Result<(), ReleaseError> {
    let file = File::create(dest)?;
    let mut zip = zip::ZipWriter::new(BufWriter::new(file));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .unix_permissions(BINARY_MODE)
        .last_modified_time(zip::DateTime::default());

    zip.add_directory(format!("{base}/"), options)?;

    for name in binaries {
        zip.start_file(format!("{base}/{name}"), options)?;
        let mut binary = File::open(staging.join(name))?;
        io::copy(&mut binary, &mut zip)?;
    }

    let writer = zip.finish()?;
    writer.into_inner().map_err(io::IntoInnerError::into_error)?.sync_all()?;
    Ok(())
}

/// The archive must hold exactly `{base}/` followed by each binary, in
/// order, all executable.
fn verify_layout(
    archive: &Path,
    format: ArchiveFormat,
    base: &str,
    binaries: &[String],
) -> Result<(), ReleaseError> {
    let integrity = |message: String| ReleaseError::Archive {
        archive: archive.to_path_buf(),
        message,
    };

    let entries =
        extract::list_entries(archive, format).map_err(|e| integrity(e.to_string()))?;

    let expected: Vec<String> = std::iter::once(base.to_string())
        .chain(binaries.iter().map(|name| format!("{base}/{name}")))
        .collect();
    let actual: Vec<String> = entries.iter().map(|e| e.path.clone()).collect();
    if actual != expected {
        return Err(integrity(format!("expected {expected:?}, found {actual:?}")));
    }

    if !entries[0].is_dir {
        return Err(integrity(format!("{base} is not a directory entry")));
    }
    if let Some(entry) = entries[1..]
        .iter()
        .find(|e| e.is_dir || e.mode.is_none_or(|m| m & 0o111 == 0))
    {
        return Err(integrity(format!("{} is not an executable file", entry.path)));
    }

    Ok(())
}

/// Hex SHA-256 and size of a file.
pub fn sha256_file(path: &Path) -> io::Result<(String, u64)> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let size = io::copy(&mut file, &mut hasher)?;
    Ok((hex::encode(hasher.finalize()), size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ap_dist_schema::default_matrix;
    use tempfile::{TempDir, tempdir};

    fn platform(id: &str) -> PlatformEntry {
        default_matrix().into_iter().find(|p| p.id == id).unwrap()
    }

    fn version() -> ReleaseVersion {
        ReleaseVersion::resolve("2.0.1").unwrap()
    }

    /// Lay out a build output with distinct contents per binary.
    fn fake_build(root: &Path, platform: &PlatformEntry, skip: Option<&str>) -> BuildOutput {
        let output = BuildOutput::locate(root, &platform.target);
        fs::create_dir_all(output.dir()).unwrap();
        for name in platform.binary_file_names() {
            if Some(name.as_str()) != skip {
                fs::write(output.binary_path(&name), format!("binary:{name}")).unwrap();
            }
        }
        output
    }

    fn setup(id: &str) -> (TempDir, PlatformEntry, BuildOutput, Assembler) {
        let tmp = tempdir().unwrap();
        let platform = platform(id);
        let output = fake_build(&tmp.path().join("target"), &platform, None);
        let assembler = Assembler::new(tmp.path().join("dist"));
        (tmp, platform, output, assembler)
    }

    #[test]
    fn test_linux_tar_gz_layout() {
        let (_tmp, platform, output, assembler) = setup("linux");
        let artifact = assembler.assemble(&version(), &platform, &output).unwrap();

        assert_eq!(artifact.file_name, "ap-2.0.1-x86_64-unknown-linux-gnu.tar.gz");
        assert_eq!(artifact.format, ArchiveFormat::TarGz);
        let entries = extract::list_entries(&artifact.path, ArchiveFormat::TarGz).unwrap();
        let paths: Vec<_> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "ap-2.0.1-x86_64-unknown-linux-gnu",
                "ap-2.0.1-x86_64-unknown-linux-gnu/ap",
                "ap-2.0.1-x86_64-unknown-linux-gnu/ap-iced",
                "ap-2.0.1-x86_64-unknown-linux-gnu/ap-tui",
            ]
        );
        assert!(entries[1..].iter().all(|e| e.mode == Some(0o755)));
    }

    #[test]
    fn test_windows_zip_layout() {
        let (_tmp, platform, output, assembler) = setup("windows");
        let artifact = assembler.assemble(&version(), &platform, &output).unwrap();

        assert_eq!(artifact.file_name, "ap-2.0.1-x86_64-pc-windows-msvc.zip");
        let entries = extract::list_entries(&artifact.path, ArchiveFormat::Zip).unwrap();
        let paths: Vec<_> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "ap-2.0.1-x86_64-pc-windows-msvc",
                "ap-2.0.1-x86_64-pc-windows-msvc/ap.exe",
                "ap-2.0.1-x86_64-pc-windows-msvc/ap-iced.exe",
                "ap-2.0.1-x86_64-pc-windows-msvc/ap-tui.exe",
            ]
        );
    }

    #[test]
    fn test_round_trip_is_byte_identical() {
        for id in ["linux", "windows"] {
            let (tmp, platform, output, assembler) = setup(id);
            let artifact = assembler.assemble(&version(), &platform, &output).unwrap();

            let out = tmp.path().join("extracted");
            let files = extract::extract(&artifact.path, platform.format, &out).unwrap();
            assert_eq!(files.len(), 3);

            let base = archive_base_name(&version(), &platform.target);
            for name in platform.binary_file_names() {
                let bytes = fs::read(out.join(&base).join(&name)).unwrap();
                assert_eq!(bytes, format!("binary:{name}").into_bytes());
            }
        }
    }

    #[test]
    fn test_binaries_are_moved_and_staging_removed() {
        let (_tmp, platform, output, assembler) = setup("linux");
        assembler.assemble(&version(), &platform, &output).unwrap();

        assert!(!output.binary_path("ap").exists());
        assert!(!assembler.dist_dir().join("ap-2.0.1-x86_64-unknown-linux-gnu").exists());
    }

    #[test]
    fn test_missing_binary_leaves_no_archive() {
        let tmp = tempdir().unwrap();
        let platform = platform("linux");
        let output = fake_build(&tmp.path().join("target"), &platform, Some("ap-iced"));
        let assembler = Assembler::new(tmp.path().join("dist"));

        let err = assembler.assemble(&version(), &platform, &output).unwrap_err();
        match err {
            ReleaseError::MissingBinary { name, dir } => {
                assert_eq!(name, "ap-iced");
                assert_eq!(dir, output.dir());
            }
            other => panic!("expected MissingBinary, got {other:?}"),
        }

        let leftovers: Vec<_> = fs::read_dir(assembler.dist_dir()).unwrap().collect();
        assert!(leftovers.is_empty(), "dist dir should be empty: {leftovers:?}");
        // Nothing was moved out of the build output.
        assert!(output.binary_path("ap").exists());
    }

    #[test]
    fn test_missing_binary_removes_stale_archive() {
        let (tmp, platform, output, assembler) = setup("linux");
        let first = assembler.assemble(&version(), &platform, &output).unwrap();
        assert!(first.path.exists());

        // Binaries were moved out; a second run finds nothing to package.
        let err = assembler.assemble(&version(), &platform, &output).unwrap_err();
        assert!(matches!(err, ReleaseError::MissingBinary { .. }));
        assert!(!first.path.exists());
        assert!(!tmp.path().join("dist/ap-2.0.1-x86_64-unknown-linux-gnu.tar.gz.sha256").exists());
    }

    #[test]
    fn test_rerun_overwrites_stale_archive() {
        let (tmp, platform, output, assembler) = setup("windows");
        let first = assembler.assemble(&version(), &platform, &output).unwrap();

        let output = fake_build(&tmp.path().join("target"), &platform, None);
        fs::write(output.binary_path("ap.exe"), "rebuilt").unwrap();
        let second = assembler.assemble(&version(), &platform, &output).unwrap();

        assert_eq!(first.path, second.path);
        assert_ne!(first.sha256, second.sha256);
    }

    #[test]
    fn test_archives_are_deterministic() {
        for id in ["linux", "windows"] {
            let (tmp, platform, output, assembler) = setup(id);
            let first = assembler.assemble(&version(), &platform, &output).unwrap();

            // Different mtimes on the inputs must not change the archive.
            std::thread::sleep(std::time::Duration::from_millis(1100));
            let output = fake_build(&tmp.path().join("target"), &platform, None);
            let second = assembler.assemble(&version(), &platform, &output).unwrap();

            assert_eq!(first.sha256, second.sha256, "{id}");
        }
    }

    #[test]
    fn test_checksum_file() {
        let (_tmp, platform, output, assembler) = setup("linux");
        let artifact = assembler.assemble(&version(), &platform, &output).unwrap();

        let checksum_path = artifact.checksum_path.clone().unwrap();
        let content = fs::read_to_string(checksum_path).unwrap();
        assert_eq!(content, format!("{}  {}\n", artifact.sha256, artifact.file_name));
        assert_eq!(sha256_file(&artifact.path).unwrap(), (artifact.sha256, artifact.size));
    }

    #[test]
    fn test_checksums_can_be_disabled() {
        let (_tmp, platform, output, assembler) = setup("linux");
        let artifact = assembler
            .with_checksums(false)
            .assemble(&version(), &platform, &output)
            .unwrap();
        assert!(artifact.checksum_path.is_none());
    }

    #[test]
    fn test_stale_staging_contents_are_discarded() {
        let (_tmp, platform, output, assembler) = setup("linux");
        let staging = assembler.dist_dir().join("ap-2.0.1-x86_64-unknown-linux-gnu");
        fs::create_dir_all(&staging).unwrap();
        fs::write(staging.join("README.txt"), "stale").unwrap();

        let artifact = assembler.assemble(&version(), &platform, &output).unwrap();
        let entries = extract::list_entries(&artifact.path, ArchiveFormat::TarGz).unwrap();
        assert_eq!(entries.len(), 4);
        assert!(entries.iter().all(|e| !e.path.ends_with("README.txt")));
    }

    #[test]
    fn test_discard_removes_previous_archive() {
        let (tmp, platform, output, assembler) = setup("linux");
        let first = assembler.assemble(&version(), &platform, &output).unwrap();
        let checksum = first.checksum_path.clone().unwrap();

        assembler.discard(&version(), &platform).unwrap();
        assert!(!first.path.exists());
        assert!(!checksum.exists());
        // Nothing to remove is fine too.
        assembler.discard(&version(), &platform).unwrap();
        assert!(tmp.path().join("dist").is_dir());
    }

    #[test]
    fn test_failed_compression_restores_binaries() {
        let (_tmp, platform, output, assembler) = setup("linux");
        // A directory in the way makes creating the partial archive fail.
        let partial = assembler
            .dist_dir()
            .join(".ap-2.0.1-x86_64-unknown-linux-gnu.tar.gz.partial");
        fs::create_dir_all(&partial).unwrap();

        let err = assembler.assemble(&version(), &platform, &output).unwrap_err();
        assert!(matches!(err, ReleaseError::Io(_)), "{err:?}");

        for name in platform.binary_file_names() {
            let bytes = fs::read(output.binary_path(&name)).unwrap();
            assert_eq!(bytes, format!("binary:{name}").into_bytes());
        }
        assert!(!assembler.dist_dir().join("ap-2.0.1-x86_64-unknown-linux-gnu").exists());
        assert!(!assembler.dist_dir().join("ap-2.0.1-x86_64-unknown-linux-gnu.tar.gz").exists());

        // With the obstruction gone the same output packages cleanly.
        fs::remove_dir(&partial).unwrap();
        assembler.assemble(&version(), &platform, &output).unwrap();
    }

    #[test]
    fn test_repeated_or_path_like_binaries_rejected() {
        for binaries in [vec!["ap", "ap"], vec!["ap", "../../escape"]] {
            let tmp = tempdir().unwrap();
            let mut platform = platform("linux");
            platform.binaries = binaries.iter().map(ToString::to_string).collect();
            let output = BuildOutput::locate(&tmp.path().join("target"), &platform.target);
            fs::create_dir_all(output.dir()).unwrap();
            fs::write(output.binary_path("ap"), "binary:ap").unwrap();
            let assembler = Assembler::new(tmp.path().join("dist"));

            let err = assembler.assemble(&version(), &platform, &output).unwrap_err();
            assert!(matches!(err, ReleaseError::Config(_)), "{binaries:?}: {err:?}");
            assert!(output.binary_path("ap").exists());
            assert!(!assembler.dist_dir().join("ap-2.0.1-x86_64-unknown-linux-gnu").exists());
        }
    }

    #[test]
    fn test_verify_layout_rejects_extra_entries() {
        let tmp = tempdir().unwrap();
        let staging = tmp.path().join("stage");
        fs::create_dir_all(&staging).unwrap();
        fs::write(staging.join("ap"), "x").unwrap();
        fs::write(staging.join("extra"), "y").unwrap();

        let archive = tmp.path().join("a.tar.gz");
        let names = vec!["ap".to_string(), "extra".to_string()];
        write_tar_gz(&archive, &staging, "ap-0.1.0-t", &names).unwrap();

        let err = verify_layout(&archive, ArchiveFormat::TarGz, "ap-0.1.0-t", &names[..1])
            .unwrap_err();
        assert!(matches!(err, ReleaseError::Archive { .. }));
    }
}
