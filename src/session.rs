//! UI-visible state and the action handlers that mutate it.
//!
//! The shell owns one `Session`. Background tasks never touch it directly;
//! their results are fed in through `on_details_fetched` and
//! `on_download_event` on the UI thread.

use std::collections::VecDeque;
use std::path::PathBuf;

use chrono::NaiveDateTime;

use crate::error::SelectionError;
use crate::filename::build_filename;
use crate::model::{Catalog, DownloadEvent, DownloadJob, MediaKind, Progress, QualityOption};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// A modal message the user has to acknowledge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub message: String,
}

impl Notice {
    fn new(level: NoticeLevel, title: &str, message: impl Into<String>) -> Self {
        Self {
            level,
            title: title.to_string(),
            message: message.into(),
        }
    }
}

/// State of the (single) download job
#[derive(Debug, Clone, PartialEq)]
pub enum JobState {
    Idle,
    Running {
        filename: String,
        progress: Progress,
        throughput: String,
    },
}

#[derive(Debug)]
pub struct Session {
    pub url_input: String,
    pub format: MediaKind,
    pub bitrate_options: Vec<String>,
    pub quality_options: Vec<QualityOption>,
    /// Index into `bitrate_options`
    pub selected_bitrate: usize,
    /// Index into `quality_options`
    pub selected_quality: usize,
    pub output_folder: Option<PathBuf>,
    /// Last successfully downloaded file
    pub last_download: Option<PathBuf>,
    catalog: Option<Catalog>,
    fetch_in_flight: bool,
    job: JobState,
    notices: VecDeque<Notice>,
}

impl Session {
    pub fn new(output_folder: Option<PathBuf>) -> Self {
        Self {
            url_input: String::new(),
            format: MediaKind::Audio,
            bitrate_options: Vec::new(),
            quality_options: Vec::new(),
            selected_bitrate: 0,
            selected_quality: 0,
            output_folder,
            last_download: None,
            catalog: None,
            fetch_in_flight: false,
            job: JobState::Idle,
            notices: VecDeque::new(),
        }
    }

    pub fn catalog(&self) -> Option<&Catalog> {
        self.catalog.as_ref()
    }

    pub fn is_fetching(&self) -> bool {
        self.fetch_in_flight
    }

    pub fn job(&self) -> &JobState {
        &self.job
    }

    pub fn is_downloading(&self) -> bool {
        matches!(self.job, JobState::Running { .. })
    }

    pub fn current_notice(&self) -> Option<&Notice> {
        self.notices.front()
    }

    pub fn dismiss_notice(&mut self) {
        self.notices.pop_front();
    }

    fn notify(&mut self, notice: Notice) {
        tracing::debug!(level = ?notice.level, "{}", notice.message);
        self.notices.push_back(notice);
    }

    /// Validates the URL input. Returns the URL to look up, or `None` after
    /// queueing a warning.
    pub fn submit_url(&mut self) -> Option<String> {
        let url = self.url_input.trim().to_string();
        if url.is_empty() {
            self.notify(Notice::new(
                NoticeLevel::Warning,
                "Input Error",
                "Please enter a video URL.",
            ));
            return None;
        }
        if self.fetch_in_flight {
            self.notify(Notice::new(
                NoticeLevel::Warning,
                "Busy",
                "Video details are still being fetched.",
            ));
            return None;
        }
        self.fetch_in_flight = true;
        Some(url)
    }

    pub fn on_details_fetched(&mut self, catalog: Option<Catalog>) {
        self.fetch_in_flight = false;
        let Some(catalog) = catalog else {
            self.notify(Notice::new(
                NoticeLevel::Error,
                "Error",
                "Failed to fetch video details.",
            ));
            return;
        };

        self.bitrate_options = catalog.bitrate_options();
        self.quality_options = catalog.quality_options();
        self.selected_bitrate = 0;
        self.selected_quality = 0;
        self.format = MediaKind::Audio;
        self.catalog = Some(catalog);
        self.notify(Notice::new(
            NoticeLevel::Info,
            "Success",
            "Video details fetched successfully.",
        ));
    }

    pub fn set_output_folder(&mut self, folder: PathBuf) {
        self.output_folder = Some(folder);
    }

    /// Turns the current selection into a job and marks it running. Problems
    /// are queued as error notices.
    pub fn confirm_selection(&mut self, now: NaiveDateTime) -> Option<DownloadJob> {
        match self.build_job(now) {
            Ok(job) => {
                self.job = JobState::Running {
                    filename: job.filename.clone(),
                    progress: Progress::Percent(0),
                    throughput: "0.00 MB/s".to_string(),
                };
                Some(job)
            }
            Err(err) => {
                self.notify(Notice::new(NoticeLevel::Error, "Error", err.to_string()));
                None
            }
        }
    }

    fn build_job(&self, now: NaiveDateTime) -> Result<DownloadJob, SelectionError> {
        if self.is_downloading() {
            return Err(SelectionError::JobActive);
        }
        let catalog = self.catalog.as_ref().ok_or(SelectionError::NoCatalog)?;
        let directory = self
            .output_folder
            .clone()
            .ok_or(SelectionError::NoOutputFolder)?;
        if !directory.is_dir() {
            return Err(SelectionError::MissingOutputFolder(directory));
        }

        let stream = match self.format {
            MediaKind::Audio => self
                .bitrate_options
                .get(self.selected_bitrate)
                .and_then(|label| catalog.find_audio(label))
                .ok_or(SelectionError::AudioUnavailable)?,
            MediaKind::Video => self
                .quality_options
                .get(self.selected_quality)
                .and_then(|q| catalog.find_video(&q.resolution))
                .ok_or(SelectionError::VideoUnavailable)?,
        };

        Ok(DownloadJob {
            stream: stream.clone(),
            directory,
            filename: build_filename(&catalog.title, self.format, now),
        })
    }

    pub fn on_download_event(&mut self, event: DownloadEvent) {
        match event {
            DownloadEvent::Progress(p) => {
                if let JobState::Running { progress, .. } = &mut self.job {
                    *progress = p;
                }
            }
            DownloadEvent::Throughput(rate) => {
                if let JobState::Running { throughput, .. } = &mut self.job {
                    *throughput = rate;
                }
            }
            DownloadEvent::Completed { path } => {
                self.job = JobState::Idle;
                self.last_download = Some(path);
                self.notify(Notice::new(
                    NoticeLevel::Info,
                    "Success",
                    "Download completed successfully.",
                ));
            }
            DownloadEvent::Failed { category, message } => {
                self.job = JobState::Idle;
                self.notify(Notice::new(
                    NoticeLevel::Error,
                    "Download Failed",
                    format!("Download failed ({category}): {message}"),
                ));
            }
        }
    }
}
