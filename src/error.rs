use std::fmt;
use std::path::PathBuf;

/// Why a metadata lookup failed. The UI only learns *that* it failed; the
/// detail goes to the log.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("URL is empty")]
    EmptyUrl,

    #[error("failed to prepare bundled yt-dlp at {path}: {source}")]
    BundledBinary {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to execute yt-dlp: {0}")]
    ExecutionFailed(#[from] std::io::Error),

    #[error("yt-dlp exited with code {code}: {stderr}")]
    CommandFailed { code: i32, stderr: String },

    #[error("failed to parse yt-dlp output: {0}")]
    JsonParseFailed(#[from] serde_json::Error),

    #[error("no downloadable streams found")]
    NoStreams,
}

/// Coarse failure class carried by a failed download event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCategory {
    Network,
    HttpStatus,
    Storage,
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureCategory::Network => "network error",
            FailureCategory::HttpStatus => "server refused the request",
            FailureCategory::Storage => "could not write file",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("server responded with HTTP {0}")]
    HttpStatus(u16),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl DownloadError {
    pub fn category(&self) -> FailureCategory {
        match self {
            DownloadError::Network(_) => FailureCategory::Network,
            DownloadError::HttpStatus(_) => FailureCategory::HttpStatus,
            DownloadError::Io(_) => FailureCategory::Storage,
        }
    }
}

/// Problems detected when the user confirms a selection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("No video details loaded yet. Fetch a URL first.")]
    NoCatalog,

    #[error("A download is already in progress.")]
    JobActive,

    #[error("Please choose an output folder first.")]
    NoOutputFolder,

    #[error("Output folder does not exist: {0}")]
    MissingOutputFolder(PathBuf),

    #[error("Selected audio stream not available.")]
    AudioUnavailable,

    #[error("Selected video stream not available.")]
    VideoUnavailable,
}
