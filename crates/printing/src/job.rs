use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

const MICRONS_PER_INCH: f64 = 25_400.0;
const CSS_PIXELS_PER_INCH: f64 = 96.0;

/// Opaque identifier for a print job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PrintJobId(u64);

impl PrintJobId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for PrintJobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PrintJobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "print-job-{}", self.0)
    }
}

/// Margin preset requested from the print subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarginType {
    Default,
    None,
    Printable,
}

/// Physical page size in microns (thousandths of a millimetre).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSize {
    pub width_microns: u32,
    pub height_microns: u32,
}

impl PageSize {
    /// US Letter, 8.5" x 11".
    pub const LETTER: PageSize = PageSize::new(215_900, 279_400);
    /// ISO A4, 210 x 297 mm.
    pub const A4: PageSize = PageSize::new(210_000, 297_000);

    pub const fn new(width_microns: u32, height_microns: u32) -> Self {
        Self {
            width_microns,
            height_microns,
        }
    }

    /// Raster size in device pixels: 96 CSS px per inch times the scale factor.
    /// 以裝置像素表示的頁面尺寸。
    pub fn to_pixels(&self, device_scale_factor: f32) -> (u32, u32) {
        let scale = CSS_PIXELS_PER_INCH * f64::from(device_scale_factor);
        let convert = |microns: u32| {
            ((f64::from(microns) / MICRONS_PER_INCH) * scale)
                .round()
                .max(1.0) as u32
        };
        (convert(self.width_microns), convert(self.height_microns))
    }

    /// Effective raster density in dots per inch.
    pub fn dpi(device_scale_factor: f32) -> u32 {
        (CSS_PIXELS_PER_INCH * f64::from(device_scale_factor)).round() as u32
    }

    pub fn width_mm(&self) -> f64 {
        f64::from(self.width_microns) / 1000.0
    }

    pub fn height_mm(&self) -> f64 {
        f64::from(self.height_microns) / 1000.0
    }
}

impl Default for PageSize {
    fn default() -> Self {
        Self::LETTER
    }
}

/// What happens to the render surface once a job completes.
/// 列印作業結束後繪製表面的處理策略。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfacePolicy {
    /// Close after every job; the next image gets a fresh surface.
    #[default]
    RecreatePerJob,
    /// Keep the surface open between jobs.
    Reuse,
}

/// Options handed to the print subsystem, built fresh for every print call.
#[derive(Debug, Clone, PartialEq)]
pub struct PrintOptions {
    pub silent: bool,
    pub print_background: bool,
    pub margins: MarginType,
    pub device_scale_factor: f32,
    pub color: bool,
    pub page_size: PageSize,
    pub device_name: Option<String>,
}

impl Default for PrintOptions {
    fn default() -> Self {
        Self {
            silent: true,
            print_background: true,
            margins: MarginType::None,
            device_scale_factor: 2.0,
            color: true,
            page_size: PageSize::LETTER,
            device_name: None,
        }
    }
}

impl PrintOptions {
    /// Returns a copy targeting `device`, keeping the configured device when `None`.
    pub fn for_device(&self, device: Option<&str>) -> Self {
        let mut options = self.clone();
        if let Some(device) = device {
            options.device_name = Some(device.to_string());
        }
        options
    }
}
