use reqwest::blocking::Client;
use std::fs::File;
use std::io;
use std::path::Path;
use tracing::info;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::error::Result;

/// Download a zip archive and extract the entry ending in `file_name` to
/// `file_name`. The file only appears once fully written.
pub(crate) fn download_zip_file(url: &str, file_name: &str) -> Result<()> {
    info!(url, file_name, "downloading dataset");
    let client = Client::new();
    let response = client.get(url).send()?.error_for_status()?;
    let body = response.bytes()?;

    let mut zip_archive = ZipArchive::new(io::Cursor::new(body))?;

    let csv_index = zip_archive
        .file_names()
        .position(|name| name.ends_with(file_name))
        .ok_or(ZipError::FileNotFound)?;

    let tmp_file_name = format!("tmp_{}", file_name);

    let mut csv_file = zip_archive.by_index(csv_index)?;
    let mut tmp_file = File::create(&tmp_file_name)?;
    io::copy(&mut csv_file, &mut tmp_file)?;

    std::fs::rename(Path::new(&tmp_file_name), Path::new(file_name))?;

    Ok(())
}
