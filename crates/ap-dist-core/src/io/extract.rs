//! Archive reading
//!
//! Lists and unpacks the `tar.gz` and `zip` archives the assembler writes.
//! Listing backs the assembler's post-write integrity check. The release
//! pipeline never extracts; [`extract`] unpacks an archive for callers that
//! want to compare its contents with the build output.

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Component, Path, PathBuf};

use ap_dist_schema::ArchiveFormat;
use thiserror::Error;
use zip::ZipArchive;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Archive error: {0}")]
    Archive(String),
}

/// One entry of an archive listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// `/`-separated path inside the archive, without a trailing slash.
    pub path: String,
    /// Directory entry.
    pub is_dir: bool,
    /// Unix permission bits, when recorded.
    pub mode: Option<u32>,
    /// Uncompressed size in bytes.
    pub size: u64,
}

/// Information about an extracted file
#[derive(Debug, Clone)]
pub struct ExtractedFile {
    /// Path relative to extraction root
    pub relative_path: PathBuf,
    /// Absolute path on disk
    pub absolute_path: PathBuf,
    /// Whether this is an executable
    pub is_executable: bool,
}

/// List the entries of an archive in stored order.
pub fn list_entries(
    archive_path: &Path,
    format: ArchiveFormat,
) -> Result<Vec<ArchiveEntry>, ExtractError> {
    match format {
        ArchiveFormat::TarGz => list_tar_gz(archive_path),
        ArchiveFormat::Zip => list_zip(archive_path),
    }
}

/// Extract an archive into `dest_dir`.
pub fn extract(
    archive_path: &Path,
    format: ArchiveFormat,
    dest_dir: &Path,
) -> Result<Vec<ExtractedFile>, ExtractError> {
    match format {
        ArchiveFormat::TarGz => extract_tar_gz(archive_path, dest_dir),
        ArchiveFormat::Zip => extract_zip(archive_path, dest_dir),
    }
}

fn open_tar_gz(archive_path: &Path) -> Result<tar::Archive<impl Read>, ExtractError> {
    let file = File::open(archive_path)?;
    let gz_decoder = flate2::read::GzDecoder::new(BufReader::new(file));
    Ok(tar::Archive::new(gz_decoder))
}

fn normalize(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn list_tar_gz(archive_path: &Path) -> Result<Vec<ArchiveEntry>, ExtractError> {
    let mut archive = open_tar_gz(archive_path)?;
    let mut entries = Vec::new();

    for entry in archive.entries()? {
        let entry = entry?;
        let header = entry.header();
        entries.push(ArchiveEntry {
            path: normalize(&entry.path()?),
            is_dir: header.entry_type().is_dir(),
            mode: header.mode().ok(),
            size: header.size()?,
        });
    }

    Ok(entries)
}

fn list_zip(archive_path: &Path) -> Result<Vec<ArchiveEntry>, ExtractError> {
    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(file).map_err(|e| ExtractError::Archive(e.to_string()))?;
    let mut entries = Vec::with_capacity(archive.len());

    for i in 0..archive.len() {
        let file = archive
            .by_index(i)
            .map_err(|e| ExtractError::Archive(e.to_string()))?;
        entries.push(ArchiveEntry {
            path: file.name().trim_end_matches('/').to_string(),
            is_dir: file.is_dir(),
            mode: file.unix_mode(),
            size: file.size(),
        });
    }

    Ok(entries)
}

/// Extract a tar.gz archive to a destination directory
pub fn extract_tar_gz(
    archive_path: &Path,
    dest_dir: &Path,
) -> Result<Vec<ExtractedFile>, ExtractError> {
    fs::create_dir_all(dest_dir)?;

    let mut archive = open_tar_gz(archive_path)?;
    let mut extracted_files = Vec::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        let relative_path: PathBuf = entry.path()?.components().collect();

        // Sanitize path to prevent Zip Slip
        if relative_path
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(ExtractError::Archive(format!(
                "Invalid path in archive: {}",
                relative_path.display()
            )));
        }

        let absolute_path = dest_dir.join(&relative_path);

        if entry.header().entry_type().is_dir() {
            fs::create_dir_all(&absolute_path)?;
            continue;
        }

        if let Some(parent) = absolute_path.parent() {
            fs::create_dir_all(parent)?;
        }

        entry.unpack(&absolute_path)?;

        // Check if executable (Unix mode has execute bit)
        let is_executable = entry
            .header()
            .mode()
            .map(|m| m & 0o111 != 0)
            .unwrap_or(false);

        extracted_files.push(ExtractedFile {
            relative_path,
            absolute_path,
            is_executable,
        });
    }

    Ok(extracted_files)
}

/// Extract a zip archive
pub fn extract_zip(
    archive_path: &Path,
    dest_dir: &Path,
) -> Result<Vec<ExtractedFile>, ExtractError> {
    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(file).map_err(|e| ExtractError::Archive(e.to_string()))?;

    fs::create_dir_all(dest_dir)?;
    let mut extracted_files = Vec::new();

    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| ExtractError::Archive(e.to_string()))?;
        let Some(relative_path) = file.enclosed_name().map(|p| p.to_path_buf()) else {
            return Err(ExtractError::Archive(format!(
                "Invalid path in archive: {}",
                file.name()
            )));
        };

        if file.is_dir() {
            fs::create_dir_all(dest_dir.join(&relative_path))?;
            continue;
        }

        let absolute_path = dest_dir.join(&relative_path);
        if let Some(p) = absolute_path.parent() {
            fs::create_dir_all(p)?;
        }

        let mut outfile = File::create(&absolute_path)?;
        io::copy(&mut file, &mut outfile)?;

        #[cfg(unix)]
        let is_executable = if let Some(mode) = file.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&absolute_path, fs::Permissions::from_mode(mode))?;
            mode & 0o111 != 0
        } else {
            false
        };
        #[cfg(not(unix))]
        let is_executable = false;

        extracted_files.push(ExtractedFile {
            relative_path,
            absolute_path,
            is_executable,
        });
    }

    Ok(extracted_files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_tar_gz(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let gz = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(gz);
        for (name, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_list_tar_gz() {
        let tmp = tempdir().unwrap();
        let archive = tmp.path().join("a.tar.gz");
        write_tar_gz(&archive, &[("top/one", b"1"), ("top/two", b"22")]);

        let entries = list_entries(&archive, ArchiveFormat::TarGz).unwrap();
        let paths: Vec<_> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["top/one", "top/two"]);
        assert_eq!(entries[1].size, 2);
        assert_eq!(entries[0].mode, Some(0o644));
    }

    #[test]
    fn test_extract_zip() {
        let tmp = tempdir().unwrap();
        let archive = tmp.path().join("a.zip");
        {
            let mut zip = zip::ZipWriter::new(File::create(&archive).unwrap());
            let options = zip::write::SimpleFileOptions::default().unix_permissions(0o755);
            zip.add_directory("top/", options).unwrap();
            zip.start_file("top/tool.exe", options).unwrap();
            zip.write_all(b"MZ").unwrap();
            zip.finish().unwrap();
        }

        let listing = list_entries(&archive, ArchiveFormat::Zip).unwrap();
        assert_eq!(listing[0].path, "top");
        assert!(listing[0].is_dir);

        let out = tmp.path().join("out");
        let files = extract(&archive, ArchiveFormat::Zip, &out).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].relative_path, PathBuf::from("top/tool.exe"));
        assert_eq!(fs::read(out.join("top/tool.exe")).unwrap(), b"MZ");
        #[cfg(unix)]
        assert!(files[0].is_executable);
    }

    #[test]
    fn test_extract_tar_rejects_traversal() {
        let tmp = tempdir().unwrap();
        let archive = tmp.path().join("evil.tar.gz");
        {
            // tar::Builder refuses `..`, so write the raw header by hand.
            let file = File::create(&archive).unwrap();
            let gz = flate2::write::GzEncoder::new(file, flate2::Compression::default());
            let mut builder = tar::Builder::new(gz);
            let mut header = tar::Header::new_old();
            header.as_old_mut().name[..9].copy_from_slice(b"../escape");
            header.set_size(1);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append(&header, &b"x"[..]).unwrap();
            builder.into_inner().unwrap().finish().unwrap();
        }

        let err = extract(&archive, ArchiveFormat::TarGz, &tmp.path().join("out")).unwrap_err();
        assert!(err.to_string().contains("Invalid path"));
        assert!(!tmp.path().join("escape").exists());
    }
}
