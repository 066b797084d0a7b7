//! `blobgate export` / `blobgate import`

use anyhow::{Context, Result, bail};
use std::path::Path;

use blobgate::archive;
use blobgate::config::Config;
use blobgate::storage::build_backend;
use blobgate::vfs::StorageService;

fn open_service(config_path: &Path, name: &str) -> Result<StorageService> {
    let config = Config::load_from(config_path)?;
    config.validate()?;
    let Some(service) = config.service(name) else {
        bail!(
            "service '{name}' is not defined in {}",
            config_path.display()
        );
    };
    Ok(StorageService::new(build_backend(service)?))
}

/// Packs a folder into a local zip file.
pub async fn export(
    config_path: &Path,
    service: &str,
    container: &str,
    path: &str,
    out: &Path,
    overwrite: bool,
) -> Result<()> {
    let storage = open_service(config_path, service)?;
    let written = archive::export_folder_as_zip(&storage, container, path, out, overwrite)
        .await
        .with_context(|| format!("Failed to export {container}/{path}"))?;
    println!("Exported {container}/{path} to {}", written.display());
    Ok(())
}

/// Arguments of `blobgate import`.
#[derive(Debug)]
pub struct ImportRequest<'a> {
    pub service: &'a str,
    pub container: &'a str,
    pub path: &'a str,
    pub archive: &'a Path,
    pub clean: bool,
    pub drop_path: Option<&'a str>,
}

/// Unpacks a local zip file into a folder.
pub async fn import(config_path: &Path, request: ImportRequest<'_>) -> Result<()> {
    let storage = open_service(config_path, request.service)?;
    let summary = archive::import_zip(
        &storage,
        request.container,
        request.path,
        request.archive,
        request.clean,
        request.drop_path,
    )
    .await
    .with_context(|| format!("Failed to import {}", request.archive.display()))?;
    println!(
        "Imported {} files and {} folders into {}/{}",
        summary.files, summary.folders, request.container, request.path
    );
    Ok(())
}
