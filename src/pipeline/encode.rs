//! Image encoding: rendered PNG file → base64 [`ImageData`].
//!
//! Pages are referenced by path, not by shared buffer — a node reads a page
//! off disk only at the moment it builds the vision request, which bounds
//! peak memory to one encoded page per worker. PNG is kept as-is (it is
//! lossless and pdfium already wrote it); `detail: "high"` asks GPT-4-class
//! models for the full tile budget so faint stamps and footer markings
//! survive the tiling.

use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use tracing::debug;

use crate::error::HeraldError;

/// Read a rendered page from disk and wrap it for the vision request body.
pub async fn encode_page_file(path: &Path) -> Result<ImageData, HeraldError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        HeraldError::Internal(format!("failed to read rendered page '{}': {e}", path.display()))
    })?;

    let b64 = STANDARD.encode(&bytes);
    debug!(path = %path.display(), bytes = b64.len(), "encoded page image");

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgba, RgbaImage};

    #[tokio::test]
    async fn encodes_a_png_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page-1.png");
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 255])));
        img.save(&path).unwrap();

        let data = encode_page_file(&path).await.unwrap();
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).unwrap();
        assert_eq!(&decoded[1..4], b"PNG");
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let err = encode_page_file(Path::new("/definitely/missing.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, HeraldError::Internal(_)));
    }
}
