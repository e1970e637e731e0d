//! PDF rasterizer adapter: one page image per PDF page, staged in the
//! artifact store for re-conversion.
//!
//! pdfium wraps a C++ library with thread-local state, so all rendering
//! happens inside `tokio::task::spawn_blocking` — the async workers never
//! stall on CPU-bound bitmap work. Pages are encoded as PNG: lossless
//! compression keeps rendered text crisp, which is what the vision model
//! needs downstream.
//!
//! Every produced page image is a [`TempAsset`] owned by the initiating
//! request; nothing is deleted here. The caller passes the collected assets
//! to [`ArtifactStore::cleanup`] once it is done with them.

use image::DynamicImage;
use pdfium_render::prelude::*;
use std::io::Cursor;
use tracing::{debug, info};

use crate::config::JobConfig;
use crate::error::Snap2TexError;
use crate::outcome::ImageInput;
use crate::store::{ArtifactStore, TempAsset};

/// Rasterize every page of `pdf_bytes` into PNG artifacts.
///
/// The page count is read before iteration and exactly one image is
/// produced per page, at the fixed density from
/// [`JobConfig::raster_max_pixels`]. Returned assets are in page order.
pub async fn rasterize_pdf(
    pdf_bytes: Vec<u8>,
    config: &JobConfig,
    store: &ArtifactStore,
) -> Result<Vec<TempAsset>, Snap2TexError> {
    if pdf_bytes.len() < 4 || &pdf_bytes[..4] != b"%PDF" {
        let mut magic = [0u8; 4];
        let n = pdf_bytes.len().min(4);
        magic[..n].copy_from_slice(&pdf_bytes[..n]);
        return Err(Snap2TexError::NotAPdf { magic });
    }

    let max_pixels = config.raster_max_pixels;
    let pages = tokio::task::spawn_blocking(move || render_pages_blocking(&pdf_bytes, max_pixels))
        .await
        .map_err(|e| Snap2TexError::Internal(format!("render task panicked: {e}")))??;

    let mut assets = Vec::with_capacity(pages.len());
    for (page_num, png) in pages {
        let reference = store.unique_name(&format!("page-{page_num}"), "png");
        store.save(&reference, &png).await?;
        assets.push(TempAsset::new(reference));
    }

    info!("Rasterized {} pages into the store", assets.len());
    Ok(assets)
}

/// Load staged page images back as conversion inputs, in asset order.
pub async fn assets_to_inputs(
    store: &ArtifactStore,
    assets: &[TempAsset],
) -> Result<Vec<ImageInput>, Snap2TexError> {
    let mut inputs = Vec::with_capacity(assets.len());
    for asset in assets {
        let bytes = store.read(asset.reference()).await?;
        inputs.push(ImageInput::new(bytes, "image/png"));
    }
    Ok(inputs)
}

/// Blocking implementation: load the document, render each page, PNG-encode.
fn render_pages_blocking(
    pdf_bytes: &[u8],
    max_pixels: u32,
) -> Result<Vec<(usize, Vec<u8>)>, Snap2TexError> {
    let pdfium = Pdfium::default();

    let document = pdfium
        .load_pdf_from_byte_slice(pdf_bytes, None)
        .map_err(|e| Snap2TexError::CorruptPdf {
            detail: format!("{e:?}"),
        })?;

    let pages = document.pages();
    let total = pages.len() as usize;
    debug!("PDF loaded: {} pages", total);

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut results = Vec::with_capacity(total);
    for idx in 0..total {
        let page = pages
            .get(idx as u16)
            .map_err(|e| Snap2TexError::RasterizeFailed {
                page: idx + 1,
                detail: format!("{e:?}"),
            })?;

        let bitmap =
            page.render_with_config(&render_config)
                .map_err(|e| Snap2TexError::RasterizeFailed {
                    page: idx + 1,
                    detail: format!("{e:?}"),
                })?;

        let image = bitmap.as_image();
        let png = encode_png(&image).map_err(|e| Snap2TexError::RasterizeFailed {
            page: idx + 1,
            detail: format!("PNG encoding failed: {e}"),
        })?;
        debug!("Rendered page {} → {} PNG bytes", idx + 1, png.len());
        results.push((idx + 1, png));
    }

    Ok(results)
}

fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn non_pdf_bytes_are_rejected_up_front() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        let config = JobConfig::default();
        let err = rasterize_pdf(b"GIF89a....".to_vec(), &config, &store)
            .await
            .unwrap_err();
        match err {
            Snap2TexError::NotAPdf { magic } => assert_eq!(&magic, b"GIF8"),
            other => panic!("expected NotAPdf, got: {other}"),
        }
    }

    #[test]
    fn png_encoding_is_lossless_roundtrippable() {
        use image::{Rgba, RgbaImage};
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 255])));
        let png = encode_png(&img).unwrap();
        assert_eq!(&png[1..4], b"PNG");
    }
}
