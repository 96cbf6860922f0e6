//! PDF rasterisation: render pages to PNG files in the request temp dir.
//!
//! ## Why spawn_blocking?
//!
//! pdfium is a C++ library with thread-local state; it must not run on the
//! async worker threads. Every render path here moves onto the blocking
//! thread pool, and every worker opens its **own** pdfium binding and
//! document handle — handles are never shared across workers.
//!
//! ## Why cap pixels, not just DPI?
//!
//! Page sizes vary wildly. Rendering at a fixed DPI turns an A0 drawing into
//! a memory bomb, so the target width derived from DPI is clamped by
//! `max_rendered_pixels` on either axis.

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use image::DynamicImage;
use pdfium_render::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::ClassifierConfig;
use crate::error::HeraldError;
use crate::pipeline::worker_bound;
use crate::state::Enhancements;

/// Rendered location of a page: `{temp_dir}/page-{N}.png` (1-indexed).
pub fn page_image_path(temp_dir: &Path, page_number: usize) -> PathBuf {
    temp_dir.join(format!("page-{page_number}.png"))
}

/// Re-rendered location of an enhanced page:
/// `{temp_dir}/page-{N}-enhanced.png`.
pub fn enhanced_image_path(temp_dir: &Path, page_number: usize) -> PathBuf {
    temp_dir.join(format!("page-{page_number}-enhanced.png"))
}

/// Count the pages of a PDF without rendering anything.
pub async fn page_count(pdf_path: &Path) -> Result<usize, HeraldError> {
    let path = pdf_path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let pdfium = Pdfium::default();
        let document = pdfium
            .load_pdf_from_file(&path, None)
            .map_err(|e| HeraldError::RenderFailed {
                detail: format!("failed to open PDF: {e:?}"),
            })?;
        Ok(document.pages().len() as usize)
    })
    .await
    .map_err(|e| HeraldError::Internal(format!("page-count task panicked: {e}")))?
}

/// Render every page of `pdf_path` to `page-{N}.png` under `temp_dir`.
///
/// Pages are rendered concurrently by `max(1, min(CPU_count, page_count))`
/// blocking workers striped across the page range. On the first worker
/// error the shared [`CancellationToken`] is tripped, the remaining workers
/// stop picking up pages, and the error propagates as
/// [`HeraldError::RenderFailed`].
///
/// Returns the rendered paths ordered by page number.
pub async fn render_all_pages(
    pdf_path: &Path,
    temp_dir: &Path,
    config: &ClassifierConfig,
) -> Result<Vec<PathBuf>, HeraldError> {
    let total = page_count(pdf_path).await?;
    if total == 0 {
        warn!("PDF has no pages; nothing to render");
        return Ok(Vec::new());
    }

    let workers = worker_bound(total);
    debug!(pages = total, workers, "rendering pages");

    let cancel = CancellationToken::new();
    let mut handles = Vec::with_capacity(workers);
    for worker in 0..workers {
        let path = pdf_path.to_path_buf();
        let dir = temp_dir.to_path_buf();
        let dpi = config.dpi;
        let max_pixels = config.max_rendered_pixels;
        let token = cancel.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            render_worker(&path, &dir, dpi, max_pixels, total, worker, workers, &token)
        }));
    }

    let mut first_error = None;
    for handle in handles {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                first_error.get_or_insert(e);
            }
            Err(e) => {
                first_error.get_or_insert(HeraldError::Internal(format!(
                    "render worker panicked: {e}"
                )));
            }
        }
    }
    if let Some(e) = first_error {
        return Err(e);
    }

    Ok((1..=total).map(|n| page_image_path(temp_dir, n)).collect())
}

/// Re-render a single page with the given enhancement hints, writing
/// `page-{N}-enhanced.png`. Opens its own document handle.
pub async fn render_enhanced_page(
    pdf_path: &Path,
    temp_dir: &Path,
    page_number: usize,
    hints: Enhancements,
    config: &ClassifierConfig,
) -> Result<PathBuf, HeraldError> {
    let path = pdf_path.to_path_buf();
    let dir = temp_dir.to_path_buf();
    let dpi = config.dpi;
    let max_pixels = config.max_rendered_pixels;

    tokio::task::spawn_blocking(move || {
        let pdfium = Pdfium::default();
        let document =
            pdfium
                .load_pdf_from_file(&path, None)
                .map_err(|e| HeraldError::RenderFailed {
                    detail: format!("failed to reopen PDF: {e:?}"),
                })?;
        let image = render_page(&document.pages(), page_number, dpi, max_pixels)?;
        let adjusted = adjust_image(image, &hints);
        let out = enhanced_image_path(&dir, page_number);
        write_png(&out, &adjusted)?;
        debug!(page = page_number, path = %out.display(), "re-rendered enhanced page");
        Ok(out)
    })
    .await
    .map_err(|e| HeraldError::Internal(format!("enhance render task panicked: {e}")))?
}

// ── Blocking internals ───────────────────────────────────────────────────

/// One striped worker: renders pages `worker, worker+stride, …`.
#[allow(clippy::too_many_arguments)]
fn render_worker(
    pdf_path: &Path,
    temp_dir: &Path,
    dpi: u32,
    max_pixels: u32,
    total: usize,
    worker: usize,
    stride: usize,
    cancel: &CancellationToken,
) -> Result<(), HeraldError> {
    let pdfium = Pdfium::default();
    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| HeraldError::RenderFailed {
            detail: format!("failed to open PDF: {e:?}"),
        })?;
    let pages = document.pages();

    let mut index = worker;
    while index < total {
        if cancel.is_cancelled() {
            // Another worker failed; abandon the remaining pages quietly.
            return Ok(());
        }
        let page_number = index + 1;
        let result = render_page(&pages, page_number, dpi, max_pixels)
            .and_then(|image| write_png(&page_image_path(temp_dir, page_number), &image));
        if let Err(e) = result {
            cancel.cancel();
            return Err(e);
        }
        index += stride;
    }
    Ok(())
}

/// Rasterise one page (1-indexed) at the configured DPI on pdfium's default
/// white background, clamped to `max_pixels` on either axis.
fn render_page(
    pages: &PdfPages<'_>,
    page_number: usize,
    dpi: u32,
    max_pixels: u32,
) -> Result<DynamicImage, HeraldError> {
    let page = pages
        .get((page_number - 1) as u16)
        .map_err(|e| HeraldError::RenderFailed {
            detail: format!("page {page_number}: {e:?}"),
        })?;

    let width_points = page.width().value;
    let target_width = ((width_points * dpi as f32 / 72.0) as i32).clamp(1, max_pixels as i32);
    let render_config = PdfRenderConfig::new()
        .set_target_width(target_width)
        .set_maximum_height(max_pixels as i32);

    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|e| HeraldError::RenderFailed {
            detail: format!("rasterisation failed for page {page_number}: {e:?}"),
        })?;

    let image = bitmap.as_image();
    debug!(
        page = page_number,
        width = image.width(),
        height = image.height(),
        "rendered page"
    );
    Ok(image)
}

/// PNG-encode and write with owner-only permissions.
fn write_png(path: &Path, image: &DynamicImage) -> Result<(), HeraldError> {
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| HeraldError::RenderFailed {
            detail: format!("PNG encode failed for '{}': {e}", path.display()),
        })?;

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path).map_err(|e| HeraldError::RenderFailed {
        detail: format!("failed to create '{}': {e}", path.display()),
    })?;
    file.write_all(&buf).map_err(|e| HeraldError::RenderFailed {
        detail: format!("failed to write '{}': {e}", path.display()),
    })
}

// ── Image adjustments ────────────────────────────────────────────────────

/// Apply enhancement hints to a rendered page.
///
/// Brightness and saturation are percentages (100 neutral); contrast is a
/// signed level (0 neutral). Out-of-range hints are clamped to the valid
/// ranges rather than rejected — the model controls these values and a
/// wild guess should degrade gracefully.
pub fn adjust_image(image: DynamicImage, hints: &Enhancements) -> DynamicImage {
    let brightness = hints.brightness_pct();
    let contrast = hints.contrast_level();
    let saturation = hints.saturation_pct();

    let mut image = image;
    if contrast != 0 {
        image = image.adjust_contrast(contrast as f32);
    }
    if brightness == 100 && saturation == 100 {
        return image;
    }

    let scale = brightness as f32 / 100.0;
    let sat = saturation as f32 / 100.0;
    let mut rgba = image.to_rgba8();
    for pixel in rgba.pixels_mut() {
        let [r, g, b, a] = pixel.0;
        let mut rf = r as f32 * scale;
        let mut gf = g as f32 * scale;
        let mut bf = b as f32 * scale;
        if saturation != 100 {
            // Scale chroma around the ITU-R BT.601 luma.
            let luma = 0.299 * rf + 0.587 * gf + 0.114 * bf;
            rf = luma + (rf - luma) * sat;
            gf = luma + (gf - luma) * sat;
            bf = luma + (bf - luma) * sat;
        }
        pixel.0 = [
            rf.clamp(0.0, 255.0) as u8,
            gf.clamp(0.0, 255.0) as u8,
            bf.clamp(0.0, 255.0) as u8,
            a,
        ];
    }
    DynamicImage::ImageRgba8(rgba)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn single_pixel(r: u8, g: u8, b: u8) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(1, 1, Rgba([r, g, b, 255])))
    }

    fn pixel_of(image: &DynamicImage) -> [u8; 4] {
        image.to_rgba8().get_pixel(0, 0).0
    }

    #[test]
    fn neutral_hints_leave_pixels_unchanged() {
        let adjusted = adjust_image(single_pixel(37, 120, 211), &Enhancements::default());
        assert_eq!(pixel_of(&adjusted), [37, 120, 211, 255]);
    }

    #[test]
    fn brightness_scales_and_clamps() {
        let hints = Enhancements {
            brightness: Some(200),
            ..Default::default()
        };
        let adjusted = adjust_image(single_pixel(100, 100, 200), &hints);
        assert_eq!(pixel_of(&adjusted), [200, 200, 255, 255]);
    }

    #[test]
    fn saturation_leaves_gray_alone() {
        let hints = Enhancements {
            saturation: Some(200),
            ..Default::default()
        };
        let adjusted = adjust_image(single_pixel(128, 128, 128), &hints);
        assert_eq!(pixel_of(&adjusted), [128, 128, 128, 255]);
    }

    #[test]
    fn desaturation_pulls_channels_toward_luma() {
        let hints = Enhancements {
            saturation: Some(80),
            ..Default::default()
        };
        let before = single_pixel(250, 30, 30);
        let adjusted = adjust_image(before, &hints);
        let [r, g, b, _] = pixel_of(&adjusted);
        // Red moves down toward the luma, green/blue move up.
        assert!(r < 250);
        assert!(g > 30);
        assert!(b > 30);
    }

    #[test]
    fn contrast_spreads_dark_and_light_apart() {
        let mut img = RgbaImage::new(2, 1);
        img.put_pixel(0, 0, Rgba([60, 60, 60, 255]));
        img.put_pixel(1, 0, Rgba([200, 200, 200, 255]));
        let hints = Enhancements {
            contrast: Some(50),
            ..Default::default()
        };
        let adjusted = adjust_image(DynamicImage::ImageRgba8(img), &hints).to_rgba8();
        assert!(adjusted.get_pixel(0, 0).0[0] < 60);
        assert!(adjusted.get_pixel(1, 0).0[0] > 200);
    }

    #[test]
    fn alpha_is_preserved() {
        let hints = Enhancements {
            brightness: Some(150),
            ..Default::default()
        };
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(1, 1, Rgba([10, 10, 10, 77])));
        assert_eq!(pixel_of(&adjust_image(image, &hints))[3], 77);
    }

    #[test]
    fn image_paths_follow_the_request_layout() {
        let dir = Path::new("/tmp/herald-classify-x");
        assert_eq!(
            page_image_path(dir, 3),
            PathBuf::from("/tmp/herald-classify-x/page-3.png")
        );
        assert_eq!(
            enhanced_image_path(dir, 3),
            PathBuf::from("/tmp/herald-classify-x/page-3-enhanced.png")
        );
    }
}
