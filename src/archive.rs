//! Unpacking of downloaded `.rar` and `.zip` archives.

use crate::error::CrawlerError;
use crate::error::Result;
use std::fs;
use std::fs::File;
use std::io;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;
use tracing::debug;
use tracing::info;
use tracing::warn;
use unrar::Archive;
use zip::ZipArchive;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ArchiveKind {
    Rar,
    Zip,
}

impl ArchiveKind {
    /// Archive kind from the dotted file extension, ignoring ASCII case.
    pub fn from_path(path: &Path) -> Result<ArchiveKind> {
        match extension(path).as_deref() {
            Some("rar") => Ok(ArchiveKind::Rar),
            Some("zip") => Ok(ArchiveKind::Zip),
            _ => Err(CrawlerError::UnrecognizedFormat(path.display().to_string())),
        }
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|extension| extension.to_str())
        .map(|extension| extension.to_ascii_lowercase())
}

/// True for `.xls` and `.xlsx` files.
pub fn is_spreadsheet(path: &Path) -> bool {
    matches!(extension(path).as_deref(), Some("xls") | Some("xlsx"))
}

/// Extracts the spreadsheets found in `archive_path` under `dest_dir` and returns
/// their paths in archive order. Other entries are skipped. The archive is
/// removed afterwards, whether extraction succeeded or not.
#[tracing::instrument(skip(dest_dir))]
pub fn extract(archive_path: &Path, kind: ArchiveKind, dest_dir: &Path) -> Result<Vec<PathBuf>> {
    info!("Checking contents of {}", archive_path.display());
    let extracted = match kind {
        ArchiveKind::Rar => extract_rar(archive_path, dest_dir),
        ArchiveKind::Zip => extract_zip(archive_path, dest_dir),
    };

    info!("Removing {}", archive_path.display());
    if let Err(error) = fs::remove_file(archive_path) {
        warn!("Could not delete {}: {error}", archive_path.display());
    }
    extracted
}

/// Relative entry path that stays inside the destination directory.
fn safe_relative(name: &Path) -> Option<PathBuf> {
    let mut relative = PathBuf::new();
    for component in name.components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => (),
            _ => return None,
        }
    }
    (!relative.as_os_str().is_empty()).then_some(relative)
}

fn prepare_target(dest_dir: &Path, relative: &Path) -> Result<PathBuf> {
    let target = dest_dir.join(relative);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(target)
}

fn extract_zip(archive_path: &Path, dest_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut archive = ZipArchive::new(File::open(archive_path)?)?;
    let mut extracted = Vec::new();
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if entry.is_dir() {
            continue;
        }
        let Some(relative) = entry.enclosed_name().and_then(|name| safe_relative(&name)) else {
            warn!("Refusing unsafe entry '{}'", entry.name());
            continue;
        };
        if !is_spreadsheet(&relative) {
            debug!("Skipping {}", relative.display());
            continue;
        }

        let target = prepare_target(dest_dir, &relative)?;
        io::copy(&mut entry, &mut File::create(&target)?)?;
        debug!("Extracted {}", target.display());
        extracted.push(target);
    }
    Ok(extracted)
}

fn extract_rar(archive_path: &Path, dest_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut archive = Archive::new(archive_path).open_for_processing()?;
    let mut extracted = Vec::new();
    while let Some(header) = archive.read_header()? {
        let entry = header.entry();
        let relative = safe_relative(&entry.filename);
        archive = match relative {
            Some(relative) if entry.is_file() && is_spreadsheet(&relative) => {
                let target = prepare_target(dest_dir, &relative)?;
                let next = header.extract_to(&target)?;
                debug!("Extracted {}", target.display());
                extracted.push(target);
                next
            }
            Some(relative) => {
                debug!("Skipping {}", relative.display());
                header.skip()?
            }
            None => {
                warn!("Refusing unsafe entry '{}'", entry.filename.display());
                header.skip()?
            }
        };
    }
    Ok(extracted)
}
