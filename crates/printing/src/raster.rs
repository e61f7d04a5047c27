use image::codecs::png::PngEncoder;
use image::imageops::{self, FilterType};
use image::{ColorType, DynamicImage, ImageBuffer, ImageEncoder, Rgba, RgbaImage};

use crate::job::{PageSize, PrintOptions};
use crate::layout::{place, DocumentMode, PageGeometry, Placement};

/// A composed page ready for spooling.
/// 已合成、可送往列印佇列的頁面。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    pub width_px: u32,
    pub height_px: u32,
    pub dpi: u32,
    pub grayscale: bool,
    pub png: Vec<u8>,
}

/// Composes `image` onto a blank page and encodes it as PNG.
pub fn render_page(
    image: &DynamicImage,
    mode: DocumentMode,
    options: &PrintOptions,
) -> Result<RenderedPage, String> {
    let geometry = PageGeometry::new(options.page_size, options.device_scale_factor);
    let canvas = compose(image, mode, geometry, options.print_background);
    let grayscale = !options.color;
    let png = if grayscale {
        let luma = DynamicImage::ImageRgba8(canvas).to_luma_alpha8();
        encode_png(luma.as_raw(), geometry, ColorType::La8)?
    } else {
        encode_png(canvas.as_raw(), geometry, ColorType::Rgba8)?
    };

    Ok(RenderedPage {
        width_px: geometry.width_px,
        height_px: geometry.height_px,
        dpi: PageSize::dpi(options.device_scale_factor),
        grayscale,
        png,
    })
}

fn compose(
    image: &DynamicImage,
    mode: DocumentMode,
    geometry: PageGeometry,
    background: bool,
) -> RgbaImage {
    let fill = if background {
        Rgba([255, 255, 255, 255])
    } else {
        Rgba([255, 255, 255, 0])
    };
    let mut canvas: RgbaImage =
        ImageBuffer::from_pixel(geometry.width_px, geometry.height_px, fill);

    let (width, height) = (image.width(), image.height());
    let placement = place(width, height, geometry, mode);
    let (crop_width, crop_height) = visible_source(width, height, placement, geometry);
    let source = if (crop_width, crop_height) == (width, height) {
        image.to_rgba8()
    } else {
        image.crop_imm(0, 0, crop_width, crop_height).to_rgba8()
    };

    let target_width = scaled_span(crop_width, width, placement.width);
    let target_height = scaled_span(crop_height, height, placement.height);
    let scaled = if (target_width, target_height) == source.dimensions() {
        source
    } else {
        imageops::resize(&source, target_width, target_height, FilterType::Triangle)
    };
    imageops::overlay(&mut canvas, &scaled, placement.x, placement.y);
    canvas
}

/// Part of the source image, from its top-left corner, that lands on the page.
/// 影像中實際落在頁面內的範圍。
fn visible_source(
    image_width: u32,
    image_height: u32,
    placement: Placement,
    geometry: PageGeometry,
) -> (u32, u32) {
    let span = |image: u32, placed: u32, offset: i64, page: u32| -> u32 {
        let room = (i64::from(page) - offset.max(0)).clamp(0, i64::from(placed)) as u64;
        let needed = (room * u64::from(image)).div_ceil(u64::from(placed.max(1)));
        needed.clamp(1, u64::from(image.max(1))) as u32
    };
    (
        span(image_width, placement.width, placement.x, geometry.width_px),
        span(image_height, placement.height, placement.y, geometry.height_px),
    )
}

fn scaled_span(cropped: u32, image: u32, placed: u32) -> u32 {
    if cropped >= image {
        return placed;
    }
    let scaled = (u64::from(cropped) * u64::from(placed)).div_ceil(u64::from(image.max(1)));
    scaled.max(1) as u32
}

fn encode_png(raw: &[u8], geometry: PageGeometry, color: ColorType) -> Result<Vec<u8>, String> {
    let mut data = Vec::new();
    PngEncoder::new(&mut data)
        .write_image(raw, geometry.width_px, geometry.height_px, color)
        .map_err(|err| err.to_string())?;
    Ok(data)
}
