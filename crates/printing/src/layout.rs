use serde::{Deserialize, Serialize};

use crate::job::PageSize;
use crate::reference::ImageReference;

/// How an image is laid out on the page.
/// 影像在頁面上的排版方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentMode {
    /// One page, zero margins, centred, scaled down to fit, exact colours.
    #[default]
    ImagePage,
    /// The image at its natural size from the top-left corner, clipped to the page.
    Direct,
}

/// Content loaded into a render surface.
/// 載入繪製表面的內容。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageDocument {
    pub reference: ImageReference,
    pub mode: DocumentMode,
}

impl PageDocument {
    pub fn new(reference: ImageReference, mode: DocumentMode) -> Self {
        Self { reference, mode }
    }
}

/// Page raster dimensions in device pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub width_px: u32,
    pub height_px: u32,
    pub device_scale_factor: f32,
}

impl PageGeometry {
    pub fn new(page: PageSize, device_scale_factor: f32) -> Self {
        let (width_px, height_px) = page.to_pixels(device_scale_factor);
        Self {
            width_px,
            height_px,
            device_scale_factor,
        }
    }
}

/// Target rectangle of the image on the page, in device pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
}

/// Computes where an image of `image_width` x `image_height` CSS pixels lands.
/// 計算影像在頁面上的落點。
pub fn place(
    image_width: u32,
    image_height: u32,
    geometry: PageGeometry,
    mode: DocumentMode,
) -> Placement {
    let natural = f64::from(geometry.device_scale_factor.max(f32::EPSILON));
    let iw = f64::from(image_width.max(1));
    let ih = f64::from(image_height.max(1));
    let pw = f64::from(geometry.width_px);
    let ph = f64::from(geometry.height_px);

    match mode {
        DocumentMode::ImagePage => {
            // max-width/max-height only ever shrink the image.
            let scale = natural.min(pw / iw).min(ph / ih);
            let width = (iw * scale).round().max(1.0);
            let height = (ih * scale).round().max(1.0);
            Placement {
                x: ((pw - width) / 2.0).round() as i64,
                y: ((ph - height) / 2.0).round() as i64,
                width: width as u32,
                height: height as u32,
            }
        }
        DocumentMode::Direct => Placement {
            x: 0,
            y: 0,
            width: (iw * natural).round().max(1.0) as u32,
            height: (ih * natural).round().max(1.0) as u32,
        },
    }
}
