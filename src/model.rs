use std::path::PathBuf;

use crate::error::FailureCategory;

/// Whether a stream (and the file written from it) is audio or video
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// Audio-only stream
    Audio,
    /// Muxed audio + video stream
    Video,
}

impl MediaKind {
    /// Extension of the file written for this kind. Bytes are stored as
    /// served; nothing is transcoded.
    pub fn extension(self) -> &'static str {
        match self {
            MediaKind::Audio => "mp3",
            MediaKind::Video => "mp4",
        }
    }
}

/// One downloadable representation of a media item, resolved by the extractor
#[derive(Debug, Clone, PartialEq)]
pub struct StreamDescriptor {
    /// Direct byte-source URL
    pub url: String,
    pub kind: MediaKind,
    /// Container hint reported by the extractor (e.g. "mp4", "webm")
    pub container: String,
    /// Codec hint (audio codec for audio streams, video codec otherwise)
    pub codec: String,
    /// "128 kbps" for audio, "720p" for video
    pub label: String,
    pub bitrate_kbps: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<u32>,
    /// Size announced by the extractor, if any
    pub size_hint: Option<u64>,
}

impl StreamDescriptor {
    pub fn resolution(&self) -> Option<String> {
        self.height.map(|h| format!("{h}p"))
    }
}

/// An entry of the quality selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityOption {
    /// Resolution used to look the stream up again, e.g. "720p"
    pub resolution: String,
    /// Text shown to the user, e.g. "720p - 30fps"
    pub label: String,
}

/// Streams plus display metadata for one resolved URL
#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    pub title: String,
    pub thumbnail_url: Option<String>,
    /// Every usable stream, in extractor order
    pub streams: Vec<StreamDescriptor>,
}

impl Catalog {
    pub fn audio_streams(&self) -> impl Iterator<Item = &StreamDescriptor> {
        self.streams.iter().filter(|s| s.kind == MediaKind::Audio)
    }

    /// Muxed mp4 streams ordered by ascending height. Equal heights keep
    /// extractor order.
    pub fn video_streams(&self) -> Vec<&StreamDescriptor> {
        let mut video: Vec<&StreamDescriptor> = self
            .streams
            .iter()
            .filter(|s| s.kind == MediaKind::Video && s.container == "mp4")
            .collect();
        video.sort_by_key(|s| s.height.unwrap_or(0));
        video
    }

    /// One label per distinct bitrate, in catalog order.
    pub fn bitrate_options(&self) -> Vec<String> {
        let mut options: Vec<String> = Vec::new();
        for stream in self.audio_streams() {
            if !options.contains(&stream.label) {
                options.push(stream.label.clone());
            }
        }
        options
    }

    /// One option per distinct resolution; the first stream seen for a
    /// resolution decides the frame rate shown.
    pub fn quality_options(&self) -> Vec<QualityOption> {
        let mut options: Vec<QualityOption> = Vec::new();
        for stream in self.video_streams() {
            let Some(resolution) = stream.resolution() else {
                continue;
            };
            if options.iter().any(|o| o.resolution == resolution) {
                continue;
            }
            let label = match stream.fps {
                Some(fps) => format!("{resolution} - {fps}fps"),
                None => resolution.clone(),
            };
            options.push(QualityOption { resolution, label });
        }
        options
    }

    pub fn find_audio(&self, bitrate_label: &str) -> Option<&StreamDescriptor> {
        self.audio_streams().find(|s| s.label == bitrate_label)
    }

    pub fn find_video(&self, resolution: &str) -> Option<&StreamDescriptor> {
        self.video_streams()
            .into_iter()
            .find(|s| s.resolution().as_deref() == Some(resolution))
    }
}

/// A confirmed download: what to fetch and where to put it
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadJob {
    pub stream: StreamDescriptor,
    pub directory: PathBuf,
    pub filename: String,
}

impl DownloadJob {
    pub fn destination(&self) -> PathBuf {
        self.directory.join(&self.filename)
    }
}

/// Progress of a running download
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Integer percentage, 0 to 100
    Percent(u8),
    /// The server did not announce a size; only the byte count is known
    Indeterminate { bytes: u64 },
}

/// Events emitted by a download task, in order: any number of
/// `Progress`/`Throughput`, then exactly one of `Completed` or `Failed`
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadEvent {
    Progress(Progress),
    /// Formatted megabytes per second, e.g. "3.42 MB/s"
    Throughput(String),
    Completed { path: PathBuf },
    Failed { category: FailureCategory, message: String },
}

impl DownloadEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DownloadEvent::Completed { .. } | DownloadEvent::Failed { .. })
    }
}
