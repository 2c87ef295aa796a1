//! Job files: one INI section or JSON object per table.
//!
//! In INI files `index_col` and `store` are raw strings and every other field is
//! a list literal (see [`literal`](super::literal)). JSON files use plain arrays,
//! `null` standing for "all sheets" or "no rows to skip".

use crate::error::CrawlerError;
use crate::error::Result;
use crate::job::literal;
use crate::job::JobModel;
use crate::job::TableSpec;
use clap::ValueEnum;
use glob::glob;
use glob::Pattern;
use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use tracing::debug;
use tracing::info;
use tracing::trace;

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobFormat {
    Ini,
    Json,
}

impl JobFormat {
    /// The explicit choice wins, otherwise `.ini`/`.conf` and `.json` extensions decide.
    pub fn detect(path: &Path, explicit: Option<JobFormat>) -> Result<JobFormat> {
        if let Some(format) = explicit {
            return Ok(format);
        }
        let extension = path
            .extension()
            .and_then(|extension| extension.to_str())
            .map(|extension| extension.to_ascii_lowercase());
        match extension.as_deref() {
            Some("ini") | Some("conf") => Ok(JobFormat::Ini),
            Some("json") => Ok(JobFormat::Json),
            _ => Err(CrawlerError::UnrecognizedFormat(path.display().to_string())),
        }
    }
}

fn job_error(path: &Path, message: impl Into<String>) -> CrawlerError {
    CrawlerError::JobFormat {
        file: path.display().to_string(),
        message: message.into(),
    }
}

/// Reads a job file; `explicit` overrides the format implied by the extension.
pub fn read_job_model(path: &Path, explicit: Option<JobFormat>) -> Result<JobModel> {
    let format = JobFormat::detect(path, explicit)?;
    let content = fs::read_to_string(path)?;
    trace!("read {} bytes of {:?} job from {}", content.len(), format, path.display());
    match format {
        JobFormat::Json => serde_json::from_str(&content).map_err(|error| job_error(path, error.to_string())),
        JobFormat::Ini => parse_ini(&content)
            .map_err(|message| job_error(path, message))?
            .into_iter()
            .map(|(section, entries)| {
                table_from_entries(&section, entries)
                    .map(|spec| (section, spec))
                    .map_err(|message| job_error(path, message))
            })
            .collect(),
    }
}

/// Writes a job file readable by [`read_job_model`].
pub fn save_job_model(model: &JobModel, path: &Path, format: JobFormat) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let content = match format {
        JobFormat::Json => serde_json::to_string_pretty(model)?,
        JobFormat::Ini => write_ini(model),
    };
    fs::write(path, content)?;
    debug!("saved {} tables to {}", model.len(), path.display());
    Ok(())
}

/// Job files directly inside `dir`, sorted by path.
fn job_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(job_error(dir, "not a directory"));
    }
    let base = Pattern::escape(&dir.to_string_lossy());
    let mut files = Vec::new();
    for extension in ["ini", "json"] {
        for path in glob(&format!("{base}/*.{extension}"))? {
            let path = path?;
            if path.is_file() {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Merges every `*.ini` and `*.json` job of `dir`, in file name order.
/// A table defined twice keeps the definition read last; `explicit` forces the
/// format of every file.
#[tracing::instrument]
pub fn queue_jobs(dir: &Path, explicit: Option<JobFormat>) -> Result<JobModel> {
    let mut model = JobModel::new();
    for path in job_files(dir)? {
        let job = read_job_model(&path, explicit)?;
        debug!("queued {} tables from {}", job.len(), path.display());
        model.merge(job);
    }
    info!("{} tables queued", model.len());
    Ok(model)
}

/// Deletes every job file of `dir` and returns how many were removed.
#[tracing::instrument]
pub fn clear_jobs(dir: &Path) -> Result<usize> {
    let files = job_files(dir)?;
    for path in &files {
        fs::remove_file(path)?;
        debug!("removed {}", path.display());
    }
    Ok(files.len())
}

type Sections = Vec<(String, BTreeMap<String, String>)>;

/// INI sections in file order. Keys are lowercased, `[DEFAULT]` entries are
/// inherited by every section, indented lines continue the previous value.
fn parse_ini(content: &str) -> std::result::Result<Sections, String> {
    let mut defaults: BTreeMap<String, String> = BTreeMap::new();
    let mut sections: Sections = Vec::new();
    let mut in_defaults = false;
    let mut last_key: Option<String> = None;

    for (number, line) in content.lines().enumerate() {
        let number = number + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
            continue;
        }
        let current = if in_defaults {
            Some(&mut defaults)
        } else {
            sections.last_mut().map(|(_, entries)| entries)
        };

        if line.starts_with(char::is_whitespace) {
            if let (Some(entries), Some(key)) = (current, &last_key) {
                if let Some(value) = entries.get_mut(key) {
                    value.push('\n');
                    value.push_str(trimmed);
                    continue;
                }
            }
            return Err(format!("line {number}: unexpected continuation line"));
        }

        if let Some(name) = trimmed.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
            let name = name.trim();
            last_key = None;
            in_defaults = name == "DEFAULT";
            if in_defaults {
                continue;
            }
            if sections.iter().any(|(section, _)| section == name) {
                return Err(format!("line {number}: duplicate section [{name}]"));
            }
            sections.push((name.to_owned(), BTreeMap::new()));
            continue;
        }

        let Some(entries) = current else {
            return Err(format!("line {number}: entry outside of a section"));
        };
        let Some(split) = trimmed.find(['=', ':']) else {
            return Err(format!("line {number}: expected 'key = value'"));
        };
        let key = trimmed[..split].trim().to_lowercase();
        let value = trimmed[split + 1..].trim().to_owned();
        if entries.insert(key.clone(), value).is_some() {
            return Err(format!("line {number}: duplicate key '{key}'"));
        }
        last_key = Some(key);
    }

    for (_, entries) in sections.iter_mut() {
        for (key, value) in &defaults {
            entries.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }
    Ok(sections)
}

fn field<T>(section: &str, key: &str, parsed: std::result::Result<T, String>) -> std::result::Result<T, String> {
    parsed.map_err(|error| format!("[{section}] {key}: {error}"))
}

fn table_from_entries(section: &str, mut entries: BTreeMap<String, String>) -> std::result::Result<TableSpec, String> {
    let mut required = |key: &str| {
        entries
            .remove(key)
            .ok_or_else(|| format!("[{section}] missing '{key}'"))
    };
    let structure = required("structure")?;
    let index_col = required("index_col")?;
    let urls = required("urls")?;
    let sheet = required("sheet")?;
    let skip_row = required("skip_row")?;
    let store = required("store")?;
    let last_row = entries.remove("last_row");
    let path = entries.remove("path");
    if let Some(key) = entries.keys().next() {
        return Err(format!("[{section}] unknown key '{key}'"));
    }

    Ok(TableSpec {
        structure: field(section, "structure", literal::parse_strings(&structure))?,
        index_col,
        urls: field(section, "urls", literal::parse_strings(&urls))?,
        sheet: field(section, "sheet", literal::parse_sheet_selectors(&sheet))?,
        skip_row: field(section, "skip_row", literal::parse_optional_integers(&skip_row))?,
        last_row: match last_row {
            Some(value) => field(section, "last_row", literal::parse_optional_integers(&value))?,
            None => Vec::new(),
        },
        path: match path {
            Some(value) => field(section, "path", literal::parse_strings(&value))?
                .into_iter()
                .map(PathBuf::from)
                .collect(),
            None => Vec::new(),
        },
        store: PathBuf::from(store),
    })
}

fn write_ini(model: &JobModel) -> String {
    let mut content = String::new();
    for (name, spec) in model {
        let paths: Vec<String> = spec.path.iter().map(|path| path.display().to_string()).collect();
        let entries = [
            ("structure", literal::format_strings(&spec.structure)),
            ("index_col", spec.index_col.clone()),
            ("urls", literal::format_strings(&spec.urls)),
            ("sheet", literal::format_sheet_selectors(&spec.sheet)),
            ("skip_row", literal::format_optional_integers(&spec.skip_row)),
            ("last_row", literal::format_optional_integers(&spec.last_row)),
            ("path", literal::format_strings(&paths)),
            ("store", spec.store.display().to_string()),
        ];
        content.push_str(&format!("[{name}]\n"));
        for (key, value) in entries {
            content.push_str(&format!("{key} = {value}\n"));
        }
        content.push('\n');
    }
    content
}
