//! Stream catalog lookup through the yt-dlp extractor.

use std::fs::File;
use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use rust_embed::RustEmbed;
use serde::Deserialize;
use tokio::process::Command;

use crate::error::FetchError;
use crate::model::{Catalog, MediaKind, StreamDescriptor};

/// Optional bundled extractor. Drop `yt-dlp` (or `yt-dlp.exe`) into
/// `assets/` before building to ship it inside the binary.
#[derive(RustEmbed)]
#[folder = "assets/"]
struct Asset;

/// Picks the extractor to run: the bundled copy, unpacked to the temp dir on
/// first use, or `fallback` looked up on `PATH`. Blocking.
pub fn resolve_binary(fallback: &Path) -> Result<PathBuf, FetchError> {
    let bin = if cfg!(target_os = "windows") { "yt-dlp.exe" } else { "yt-dlp" };
    let Some(data) = Asset::get(bin) else {
        return Ok(fallback.to_path_buf());
    };

    let tmp = std::env::temp_dir().join(bin);
    ensure_unpacked(&data.data, &tmp).map_err(|source| FetchError::BundledBinary {
        path: tmp.clone(),
        source,
    })?;
    Ok(tmp)
}

/// Makes `dest` hold exactly `data`. An existing file of the right size is
/// reused; anything else is replaced.
fn ensure_unpacked(data: &[u8], dest: &Path) -> std::io::Result<()> {
    let reusable = std::fs::metadata(dest)
        .map(|meta| meta.is_file() && meta.len() == data.len() as u64)
        .unwrap_or(false);
    if reusable {
        return Ok(());
    }

    // Write under a staging name and rename, so `dest` is never partial
    let mut staging = dest.as_os_str().to_owned();
    staging.push(".part");
    let staging = PathBuf::from(staging);

    let unpack = || -> std::io::Result<()> {
        let mut f = File::create(&staging)?;
        f.write_all(data)?;
        f.sync_all()?;
        #[cfg(unix)]
        std::fs::set_permissions(&staging, std::fs::Permissions::from_mode(0o755))?;
        std::fs::rename(&staging, dest)
    };
    if let Err(err) = unpack() {
        let _ = std::fs::remove_file(&staging);
        return Err(err);
    }
    tracing::info!("unpacked bundled yt-dlp to {}", dest.display());
    Ok(())
}

/// Runs a single lookup. Failures are logged and collapsed to `None`.
pub async fn lookup(fallback: PathBuf, url: String) -> Option<Catalog> {
    // Unpacking the bundled extractor touches the disk; keep it off the runtime threads
    let binary = match tokio::task::spawn_blocking(move || resolve_binary(&fallback)).await {
        Ok(Ok(binary)) => binary,
        Ok(Err(err)) => {
            tracing::warn!("{err}");
            return None;
        }
        Err(err) => {
            tracing::error!("extractor setup task failed: {err}");
            return None;
        }
    };

    match fetch_catalog(&binary, &url).await {
        Ok(catalog) => {
            tracing::info!(
                title = %catalog.title,
                streams = catalog.streams.len(),
                "fetched video details"
            );
            Some(catalog)
        }
        Err(err) => {
            tracing::warn!(%url, "failed to fetch video details: {err}");
            None
        }
    }
}

pub async fn fetch_catalog(binary: &Path, url: &str) -> Result<Catalog, FetchError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(FetchError::EmptyUrl);
    }

    tracing::debug!("running {} -J {url}", binary.display());
    let output = Command::new(binary)
        .args(["-J", "--no-playlist", "--no-warnings", url])
        .stdin(Stdio::null())
        .output()
        .await?;

    if !output.status.success() {
        return Err(FetchError::CommandFailed {
            code: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    parse_catalog(&output.stdout)
}

#[derive(Debug, Deserialize)]
struct RawInfo {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    thumbnail: Option<String>,
    #[serde(default)]
    thumbnails: Vec<RawThumbnail>,
    #[serde(default)]
    formats: Vec<RawFormat>,
}

#[derive(Debug, Deserialize)]
struct RawThumbnail {
    url: String,
    #[serde(default)]
    width: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RawFormat {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    protocol: Option<String>,
    #[serde(default)]
    ext: Option<String>,
    #[serde(default)]
    vcodec: Option<String>,
    #[serde(default)]
    acodec: Option<String>,
    #[serde(default)]
    abr: Option<f64>,
    #[serde(default)]
    tbr: Option<f64>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    fps: Option<f64>,
    #[serde(default)]
    filesize: Option<u64>,
    #[serde(default)]
    filesize_approx: Option<u64>,
}

fn codec(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|c| *c != "none")
}

impl RawFormat {
    fn into_descriptor(self) -> Option<StreamDescriptor> {
        if !matches!(self.protocol.as_deref(), None | Some("http" | "https")) {
            return None;
        }
        let url = self.url?;
        let container = self.ext.unwrap_or_default();
        let size_hint = self.filesize.or(self.filesize_approx);

        match (codec(&self.vcodec), codec(&self.acodec)) {
            (None, Some(acodec)) => {
                let kbps = self.abr.or(self.tbr)?.round() as u32;
                Some(StreamDescriptor {
                    url,
                    kind: MediaKind::Audio,
                    codec: acodec.to_string(),
                    container,
                    label: format!("{kbps} kbps"),
                    bitrate_kbps: Some(kbps),
                    height: None,
                    fps: None,
                    size_hint,
                })
            }
            (Some(vcodec), Some(_)) => {
                let height = self.height?;
                Some(StreamDescriptor {
                    url,
                    kind: MediaKind::Video,
                    codec: vcodec.to_string(),
                    container,
                    label: format!("{height}p"),
                    bitrate_kbps: None,
                    height: Some(height),
                    fps: self.fps.map(|f| f.round() as u32),
                    size_hint,
                })
            }
            // video-only or unknown
            _ => None,
        }
    }
}

/// Builds a catalog from yt-dlp's `-J` output.
pub fn parse_catalog(json: &[u8]) -> Result<Catalog, FetchError> {
    let raw: RawInfo = serde_json::from_slice(json)?;

    let thumbnail_url = raw.thumbnail.or_else(|| {
        raw.thumbnails
            .into_iter()
            .max_by_key(|t| t.width.unwrap_or(0))
            .map(|t| t.url)
    });

    let streams: Vec<StreamDescriptor> = raw
        .formats
        .into_iter()
        .filter_map(RawFormat::into_descriptor)
        .collect();
    if streams.is_empty() {
        return Err(FetchError::NoStreams);
    }

    Ok(Catalog {
        title: raw.title.unwrap_or_default(),
        thumbnail_url,
        streams,
    })
}
