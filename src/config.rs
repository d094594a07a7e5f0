use std::path::PathBuf;

/// Size of each chunk written to disk and reported as progress (1 MiB).
pub const CHUNK_SIZE: usize = 1024 * 1024;

/// Application settings. Everything has an in-code default; nothing is read
/// from disk or the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Name or path of the yt-dlp binary used when none is bundled
    pub yt_dlp_binary: PathBuf,
    /// Bytes per written chunk
    pub chunk_size: usize,
    /// Box the thumbnail is scaled into, keeping aspect ratio
    pub thumbnail_size: [f32; 2],
    /// Output folder preselected on startup, if the platform has one
    pub initial_output_folder: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            yt_dlp_binary: PathBuf::from(if cfg!(target_os = "windows") {
                "yt-dlp.exe"
            } else {
                "yt-dlp"
            }),
            chunk_size: CHUNK_SIZE,
            thumbnail_size: [320.0, 180.0],
            initial_output_folder: dirs::download_dir().filter(|dir| dir.is_dir()),
        }
    }
}
