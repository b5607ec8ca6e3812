use crate::types::{FixtureError, FixtureResult};
use async_trait::async_trait;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::{NamedTempFile, TempDir};
use zip::ZipArchive;

/// Source of remote archive payloads
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    /// Download the resource behind `url` into a local temporary file
    async fn fetch(&self, url: &str) -> FixtureResult<NamedTempFile>;
}

/// Plain HTTP(S) fetcher streaming response bodies to disk
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> FixtureResult<Self> {
        // No overall deadline: bodies stream for as long as the transfer runs
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .user_agent(concat!("terrain-fixtures/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RemoteFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> FixtureResult<NamedTempFile> {
        log::info!("Downloading {}", url);

        let mut response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(FixtureError::Remote(format!(
                "HTTP {} {}: {}",
                response.status().as_u16(),
                response.status().canonical_reason().unwrap_or(""),
                url
            )));
        }

        let mut staged = staging_file(url)?;
        let mut written: u64 = 0;
        while let Some(chunk) = response.chunk().await? {
            staged.write_all(&chunk)?;
            written += chunk.len() as u64;
        }
        staged.flush()?;

        log::debug!(
            "Downloaded {} bytes from {} to {}",
            written,
            url,
            staged.path().display()
        );
        Ok(staged)
    }
}

/// Empty temporary file carrying the extension of the URL path
pub fn staging_file(url: &str) -> FixtureResult<NamedTempFile> {
    let path = url.split(|c| c == '?' || c == '#').next().unwrap_or(url);
    let suffix = Path::new(path)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();

    Ok(tempfile::Builder::new()
        .prefix("terrain-fixtures-")
        .suffix(&suffix)
        .tempfile()?)
}

/// Check if content is ZIP format by examining magic bytes
pub fn is_zip_content(content: &[u8]) -> bool {
    content.len() >= 4 && content[0..4] == [0x50, 0x4B, 0x03, 0x04]
}

/// Same check on the first bytes of a file
pub fn is_zip_file(path: &Path) -> FixtureResult<bool> {
    let mut magic = Vec::with_capacity(4);
    File::open(path)?.take(4).read_to_end(&mut magic)?;
    Ok(is_zip_content(&magic))
}

/// Copy one archive member into a temporary file that keeps the member's
/// extension, so format drivers can recognise it.
pub fn extract_member(zip_path: &Path, member: &str) -> FixtureResult<NamedTempFile> {
    let mut archive = ZipArchive::new(File::open(zip_path)?)?;
    let mut file = archive.by_name(member).map_err(|e| {
        FixtureError::InvalidFormat(format!("Archive has no member {}: {}", member, e))
    })?;

    let suffix = Path::new(member)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();
    let mut temp_file = tempfile::Builder::new()
        .prefix("terrain-fixtures-")
        .suffix(&suffix)
        .tempfile()?;

    log::debug!("Extracting {} to {}", member, temp_file.path().display());
    std::io::copy(&mut file, &mut temp_file)?;
    Ok(temp_file)
}

/// Unpack a whole archive into a temporary directory
pub fn extract_archive(zip_path: &Path) -> FixtureResult<TempDir> {
    let mut archive = ZipArchive::new(File::open(zip_path)?)?;
    let dir = tempfile::Builder::new().prefix("terrain-fixtures-").tempdir()?;
    archive.extract(dir.path())?;
    log::debug!(
        "Extracted {} archive entries to {}",
        archive.len(),
        dir.path().display()
    );
    Ok(dir)
}

/// First file below `dir` with the given extension, in sorted path order
pub fn find_with_extension(dir: &Path, extension: &str) -> FixtureResult<Option<PathBuf>> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    entries.sort();

    for path in &entries {
        if path.is_file()
            && path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
        {
            return Ok(Some(path.clone()));
        }
    }

    for path in entries.iter().filter(|p| p.is_dir()) {
        if let Some(found) = find_with_extension(path, extension)? {
            return Ok(Some(found));
        }
    }

    Ok(None)
}
