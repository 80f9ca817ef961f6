//! Load a flow artifact from a tarball on disk or behind an HTTP(S) URL.

use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use oscar_core::error::{OscarError, Result};

use super::layers::{extract_stream, ExtractSummary};

/// Load a tarball from `source` and extract it into `output_dir`.
///
/// `source` is a local path or an `http://` / `https://` URL. Sources ending
/// in `.gz` or `.tgz` are gunzipped while reading. URL bodies are spooled to
/// an anonymous temporary file, never held in memory as a whole.
pub async fn load_tarball(source: &str, output_dir: &Path) -> Result<ExtractSummary> {
    let gzip = is_gzip_source(source);

    tracing::info!(
        source,
        target = %output_dir.display(),
        gzip,
        "Loading tarball"
    );

    let file = if is_url(source) {
        download(source).await?
    } else {
        File::open(source).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => OscarError::NotFoundError {
                target: source.to_string(),
                message: "tarball does not exist".to_string(),
            },
            _ => OscarError::IoError(e),
        })?
    };

    let summary = extract_stream(file, gzip, source, output_dir)?;

    tracing::info!(
        source,
        files = summary.files,
        skipped = summary.skipped,
        "Tarball loaded"
    );
    Ok(summary)
}

fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Whether the source name carries a gzip suffix (query and fragment ignored).
fn is_gzip_source(source: &str) -> bool {
    let path = if is_url(source) {
        source.split(['?', '#']).next().unwrap_or(source)
    } else {
        source
    };
    path.ends_with(".gz") || path.ends_with(".tgz")
}

async fn download(url: &str) -> Result<File> {
    let fetch_error = |message: String| OscarError::FetchError {
        source_url: url.to_string(),
        message,
    };

    let mut response = reqwest::get(url)
        .await
        .map_err(|e| fetch_error(e.to_string()))?;
    if response.status() != reqwest::StatusCode::OK {
        return Err(fetch_error(format!("unexpected status {}", response.status())));
    }

    let mut spool = tempfile::tempfile().map_err(|e| OscarError::local_write(&std::env::temp_dir(), e))?;
    let mut received = 0u64;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| fetch_error(e.to_string()))?
    {
        received += chunk.len() as u64;
        spool
            .write_all(&chunk)
            .map_err(|e| OscarError::local_write(&std::env::temp_dir(), e))?;
    }
    spool.seek(SeekFrom::Start(0))?;

    tracing::debug!(url, bytes = received, "Downloaded tarball");
    Ok(spool)
}
