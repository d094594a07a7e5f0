//! Main application for the YouTube Downloader GUI

// Application settings
mod config;
// Streaming media download worker
mod downloader;
// Error types shared by the workers and the session
mod error;
// Output filename generation
mod filename;
// Stream catalog lookup via yt-dlp
mod metadata;
// Data models for streams, catalogs and download jobs
mod model;
// Percentage and throughput computation
mod progress;
// UI-visible state and action handlers
mod session;
// Thumbnail fetching module
mod thumbnail;

use std::path::Path;
use std::time::Duration;

use config::Config;
use error::FailureCategory;
use model::{Catalog, DownloadEvent, MediaKind, Progress};
use session::{JobState, NoticeLevel, Session};

// eframe/egui for GUI application framework
use eframe::{egui, App, Frame};
use egui::{ColorImage, TextureOptions, Visuals};
// OnceCell for single-time runtime initialization
use once_cell::sync::OnceCell;
// FileDialog for folder selection dialogs
use rfd::FileDialog;
use tokio::{
    runtime::{Handle, Runtime},
    sync::{
        mpsc::{self, unbounded_channel, UnboundedReceiver},
        oneshot::{self, error::TryRecvError},
    },
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Global Tokio runtime stored in a OnceCell for lazy init
static RUNTIME: OnceCell<Runtime> = OnceCell::new();

/// Program entry point: initializes logging and the runtime, then launches the GUI
fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stream_grabber=info".into()),
        )
        .init();

    let runtime = RUNTIME.get_or_try_init(Runtime::new)?;
    let handle = runtime.handle().clone();
    let config = Config::default();
    tracing::info!(?config, "starting");

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([500.0, 700.0]),
        ..Default::default()
    };
    eframe::run_native(
        "YouTube Downloader",
        options,
        Box::new(move |cc| {
            // Use dark theme visuals
            cc.egui_ctx.set_visuals(Visuals::dark());
            Box::new(DownloaderApp::new(config, handle))
        }),
    )?;
    Ok(())
}

/// GUI shell: renders the session and runs background tasks
struct DownloaderApp {
    config: Config,
    runtime: Handle,
    /// HTTP client shared by download tasks
    client: reqwest::Client,
    session: Session,
    /// Texture of the current catalog's thumbnail
    thumbnail: Option<egui::TextureHandle>,
    fetch_rx: Option<oneshot::Receiver<Option<Catalog>>>,
    thumbnail_rx: Option<oneshot::Receiver<Option<ColorImage>>>,
    download_rx: Option<UnboundedReceiver<DownloadEvent>>,
}

impl DownloaderApp {
    fn new(config: Config, runtime: Handle) -> Self {
        let session = Session::new(config.initial_output_folder.clone());
        Self {
            config,
            runtime,
            client: reqwest::Client::new(),
            session,
            thumbnail: None,
            fetch_rx: None,
            thumbnail_rx: None,
            download_rx: None,
        }
    }

    fn busy(&self) -> bool {
        self.fetch_rx.is_some() || self.thumbnail_rx.is_some() || self.download_rx.is_some()
    }

    fn submit_url(&mut self, ctx: &egui::Context) {
        let Some(url) = self.session.submit_url() else {
            return;
        };
        let binary = self.config.yt_dlp_binary.clone();
        let (tx, rx) = oneshot::channel();
        let ctx = ctx.clone();
        self.runtime.spawn(async move {
            let _ = tx.send(metadata::lookup(binary, url).await);
            ctx.request_repaint();
        });
        self.fetch_rx = Some(rx);
    }

    fn load_thumbnail(&mut self, ctx: &egui::Context, url: String) {
        let (tx, rx) = oneshot::channel();
        let ctx = ctx.clone();
        // Blocking fetch off the UI thread
        self.runtime.spawn_blocking(move || {
            let _ = tx.send(thumbnail::fetch_thumbnail(&url));
            ctx.request_repaint();
        });
        self.thumbnail_rx = Some(rx);
    }

    fn start_download(&mut self, ctx: &egui::Context) {
        let now = chrono::Local::now().naive_local();
        let Some(job) = self.session.confirm_selection(now) else {
            return;
        };
        let (tx, mut rx) = unbounded_channel();
        let (ui_tx, ui_rx) = unbounded_channel();
        let ctx = ctx.clone();
        // Forward events and wake the UI for each one
        self.runtime.spawn(async move {
            while let Some(event) = rx.recv().await {
                if ui_tx.send(event).is_err() {
                    break;
                }
                ctx.request_repaint();
            }
        });
        self.runtime.spawn(downloader::run(
            self.client.clone(),
            job,
            self.config.chunk_size,
            tx,
        ));
        self.download_rx = Some(ui_rx);
    }

    /// Feeds finished task results into the session
    fn poll_tasks(&mut self, ctx: &egui::Context) {
        if let Some(rx) = self.fetch_rx.as_mut() {
            let outcome = match rx.try_recv() {
                Ok(catalog) => Some(catalog),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Closed) => Some(None),
            };
            if let Some(catalog) = outcome {
                self.fetch_rx = None;
                let thumbnail_url = catalog.as_ref().and_then(|c| c.thumbnail_url.clone());
                let fetched = catalog.is_some();
                self.session.on_details_fetched(catalog);
                if fetched {
                    self.thumbnail = None;
                    if let Some(url) = thumbnail_url {
                        self.load_thumbnail(ctx, url);
                    }
                }
            }
        }

        if let Some(rx) = self.thumbnail_rx.as_mut() {
            match rx.try_recv() {
                Ok(image) => {
                    self.thumbnail_rx = None;
                    // Load image into egui texture
                    self.thumbnail = image
                        .map(|img| ctx.load_texture("thumbnail", img, TextureOptions::default()));
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Closed) => self.thumbnail_rx = None,
            }
        }

        if let Some(rx) = self.download_rx.as_mut() {
            let mut finished = false;
            loop {
                match rx.try_recv() {
                    Ok(event) => {
                        finished |= event.is_terminal();
                        self.session.on_download_event(event);
                    }
                    Err(mpsc::error::TryRecvError::Empty) => break,
                    Err(mpsc::error::TryRecvError::Disconnected) => {
                        if !finished {
                            tracing::error!("download task ended without a result");
                            self.session.on_download_event(DownloadEvent::Failed {
                                category: FailureCategory::Network,
                                message: "download task stopped unexpectedly".into(),
                            });
                            finished = true;
                        }
                        break;
                    }
                }
            }
            if finished {
                self.download_rx = None;
            }
        }
    }

    fn notice_window(&mut self, ctx: &egui::Context) {
        let Some(notice) = self.session.current_notice() else {
            return;
        };
        let icon = match notice.level {
            NoticeLevel::Info => "ℹ",
            NoticeLevel::Warning => "⚠",
            NoticeLevel::Error => "❌",
        };
        let title = format!("{icon} {}", notice.title);
        let message = notice.message.clone();
        let mut dismissed = false;
        egui::Window::new(title)
            .id(egui::Id::new("notice"))
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.label(message);
                ui.add_space(8.0);
                if ui.button("OK").clicked() {
                    dismissed = true;
                }
            });
        if dismissed {
            self.session.dismiss_notice();
        }
    }

    fn main_panel(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        ui.heading("YouTube Downloader");

        // URL input field, Enter submits
        ui.label("Enter YouTube video URL:");
        ui.horizontal(|ui| {
            let response = ui.text_edit_singleline(&mut self.session.url_input);
            let entered =
                response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
            let fetch = ui.add_enabled(!self.session.is_fetching(), egui::Button::new("Fetch"));
            if entered || fetch.clicked() {
                self.submit_url(ctx);
            }
            if self.session.is_fetching() {
                ui.spinner();
            }
        });

        // Video thumbnail
        if let Some(tex) = &self.thumbnail {
            let size = thumbnail::fit_within(tex.size(), self.config.thumbnail_size);
            ui.vertical_centered(|ui| {
                ui.add(egui::Image::new(egui::load::SizedTexture::new(tex.id(), size)));
            });
        }

        let Some(catalog) = self.session.catalog() else {
            return;
        };
        ui.label(egui::RichText::new(catalog.title.clone()).strong());
        ui.separator();

        // Format selection
        ui.horizontal(|ui| {
            ui.radio_value(&mut self.session.format, MediaKind::Audio, "Audio");
            ui.radio_value(&mut self.session.format, MediaKind::Video, "Video");
        });

        match self.session.format {
            MediaKind::Audio if self.session.bitrate_options.is_empty() => {
                ui.label("No audio streams available.");
            }
            MediaKind::Video if self.session.quality_options.is_empty() => {
                ui.label("No video streams available.");
            }
            MediaKind::Audio => {
                let options = &self.session.bitrate_options;
                egui::ComboBox::from_label("Select Bitrate")
                    .show_index(ui, &mut self.session.selected_bitrate, options.len(), |i| {
                        options[i].clone()
                    });
            }
            MediaKind::Video => {
                let options = &self.session.quality_options;
                egui::ComboBox::from_label("Select Quality")
                    .show_index(ui, &mut self.session.selected_quality, options.len(), |i| {
                        options[i].label.clone()
                    });
            }
        }

        // Output folder selection
        ui.horizontal(|ui| {
            let folder = self
                .session
                .output_folder
                .as_ref()
                .map_or_else(|| "not chosen".to_string(), |f| f.display().to_string());
            ui.label(format!("Output Folder: {folder}"));
            if ui.button("Choose Folder").clicked() {
                let mut dialog = FileDialog::new();
                if let Some(current) = &self.session.output_folder {
                    dialog = dialog.set_directory(current);
                }
                if let Some(folder) = dialog.pick_folder() {
                    self.session.set_output_folder(folder);
                }
            }
        });

        let download = ui.add_enabled(
            !self.session.is_downloading(),
            egui::Button::new("Download"),
        );
        if download.clicked() {
            self.start_download(ctx);
        }

        // Progress bar and bandwidth label, only while a job runs
        if let JobState::Running {
            filename,
            progress,
            throughput,
        } = self.session.job()
        {
            ui.label(filename.as_str());
            let bar = match *progress {
                Progress::Percent(p) => {
                    egui::ProgressBar::new(f32::from(p) / 100.0).show_percentage()
                }
                Progress::Indeterminate { bytes } => egui::ProgressBar::new(0.0)
                    .animate(true)
                    .text(format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))),
            };
            ui.add(bar);
            ui.label(format!("Bandwidth: {throughput}"));
        }

        // When done, offer to open the output folder
        if let Some(last) = &self.session.last_download {
            if !self.session.is_downloading() {
                ui.horizontal(|ui| {
                    ui.label(format!("Saved {}", last.display()));
                    if ui.button("Open Folder").clicked() {
                        if let Some(folder) = last.parent() {
                            reveal_folder(folder);
                        }
                    }
                });
            }
        }
    }
}

/// GUI update loop: called each frame to redraw and handle interactions
impl App for DownloaderApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut Frame) {
        self.poll_tasks(ctx);
        self.notice_window(ctx);

        let modal = self.session.current_notice().is_some();
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.add_enabled_ui(!modal, |ui| self.main_panel(ui, ctx));
        });

        // Request periodic repaint while work is in flight
        if self.busy() {
            ctx.request_repaint_after(Duration::from_millis(100));
        }
    }
}

/// Opens `folder` in the platform file manager.
fn reveal_folder(folder: &Path) {
    let folder = folder.to_path_buf();
    std::thread::spawn(move || {
        let opener = if cfg!(target_os = "windows") {
            "explorer"
        } else if cfg!(target_os = "macos") {
            "open"
        } else {
            "xdg-open"
        };
        if let Err(err) = std::process::Command::new(opener).arg(&folder).spawn() {
            tracing::warn!(folder = %folder.display(), "could not open folder: {err}");
        }
    });
}
