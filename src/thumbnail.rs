use eframe::egui::ColorImage;

/// Downloads and decodes a thumbnail. Blocking; run it off the UI thread.
pub fn fetch_thumbnail(url: &str) -> Option<ColorImage> {
    // Perform a blocking HTTP GET request, returning None on any error
    let resp = match reqwest::blocking::get(url).and_then(|r| r.error_for_status()) {
        Ok(resp) => resp.bytes().ok()?,
        Err(err) => {
            tracing::warn!(%url, "thumbnail request failed: {err}");
            return None;
        }
    };
    decode(&resp)
}

/// Decodes image bytes into an RGBA `ColorImage` for egui.
pub fn decode(bytes: &[u8]) -> Option<ColorImage> {
    let img = match image::load_from_memory(bytes) {
        Ok(img) => img.to_rgba8(),
        Err(err) => {
            tracing::warn!("could not decode thumbnail: {err}");
            return None;
        }
    };
    let size = [img.width() as usize, img.height() as usize];
    // Create a ColorImage from the raw RGBA bytes without premultiplying alpha
    Some(ColorImage::from_rgba_unmultiplied(size, &img))
}

/// Largest size with the image's aspect ratio that fits inside `bounds`.
pub fn fit_within(size: [usize; 2], bounds: [f32; 2]) -> [f32; 2] {
    let [w, h] = [size[0] as f32, size[1] as f32];
    if w <= 0.0 || h <= 0.0 {
        return [0.0, 0.0];
    }
    let scale = (bounds[0] / w).min(bounds[1] / h);
    [w * scale, h * scale]
}
