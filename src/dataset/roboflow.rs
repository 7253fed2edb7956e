//! Fetching the training dataset export from Roboflow.

use std::ffi::OsString;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::config::DatasetSettings;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetStatus {
    /// The dataset directory already exists; nothing was downloaded.
    Present(PathBuf),
    /// The export archive was downloaded to this path.
    Downloaded(PathBuf),
}

#[derive(Debug, Deserialize)]
struct ExportResponse {
    export: Option<ExportInfo>,
}

#[derive(Debug, Deserialize)]
struct ExportInfo {
    link: Option<String>,
}

/// Make sure the dataset is available locally.
///
/// The dataset YAML must exist. When the dataset directory is missing the
/// export archive is downloaded next to it as `<dir>.zip`; this needs
/// `ROBOFLOW_API_KEY`.
pub fn ensure_dataset(settings: &DatasetSettings) -> Result<DatasetStatus> {
    if !settings.config_yaml.is_file() {
        return Err(Error::Configuration(format!(
            "dataset configuration file '{}' not found",
            settings.config_yaml.display()
        )));
    }
    if settings.dir.is_dir() {
        log::info!(
            "dataset directory '{}' found locally, skipping download",
            settings.dir.display()
        );
        return Ok(DatasetStatus::Present(settings.dir.clone()));
    }

    let api_key = settings.api_key()?;
    log::info!(
        "dataset directory '{}' not found, requesting export {}/{} v{} ({})",
        settings.dir.display(),
        settings.workspace,
        settings.project,
        settings.version,
        settings.format
    );

    let body = ureq::get(&export_url(settings, &api_key))
        .call()
        .map_err(|e| Error::Http(format!("export request failed: {}", e)))?
        .into_string()
        .map_err(|e| Error::Http(format!("failed to read export response: {}", e)))?;
    let link = export_link(&body)?;

    let archive = archive_path(settings);
    download(&link, &archive)?;
    log::info!("dataset export saved to {}", archive.display());
    Ok(DatasetStatus::Downloaded(archive))
}

/// `GET {api_url}/{workspace}/{project}/{version}/{format}?api_key=...`
pub fn export_url(settings: &DatasetSettings, api_key: &str) -> String {
    format!(
        "{}/{}/{}/{}/{}?api_key={}",
        settings.api_url.trim_end_matches('/'),
        settings.workspace,
        settings.project,
        settings.version,
        settings.format,
        api_key
    )
}

/// Pull `export.link` out of the export response body.
pub fn export_link(body: &str) -> Result<String> {
    let response: ExportResponse = serde_json::from_str(body)
        .map_err(|e| Error::Http(format!("unexpected export response: {}", e)))?;
    response
        .export
        .and_then(|e| e.link)
        .filter(|link| !link.is_empty())
        .ok_or_else(|| Error::Http("export response has no download link".to_string()))
}

pub fn archive_path(settings: &DatasetSettings) -> PathBuf {
    let mut name: OsString = settings.dir.as_os_str().to_owned();
    name.push(".zip");
    PathBuf::from(name)
}

fn download(url: &str, dest: &Path) -> Result<()> {
    let response = ureq::get(url)
        .call()
        .map_err(|e| Error::Http(format!("download failed: {}", e)))?;
    let file = File::create(dest).map_err(|e| Error::io(dest, e))?;
    let mut writer = BufWriter::new(file);
    let mut reader = response.into_reader();
    let bytes = std::io::copy(&mut reader, &mut writer).map_err(|e| Error::io(dest, e))?;
    writer.flush().map_err(|e| Error::io(dest, e))?;
    log::debug!("downloaded {} bytes", bytes);
    Ok(())
}
