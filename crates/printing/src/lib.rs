//! Hidden render surface and silent image printing.
//! 隱藏式繪製表面與靜默影像列印。

pub mod error;
pub mod job;
pub mod layout;
pub mod platform;
pub mod printer;
pub mod raster;
pub mod reference;
pub mod surface;

pub use error::PrintError;
pub use job::{MarginType, PageSize, PrintJobId, PrintOptions, SurfacePolicy};
pub use layout::{DocumentMode, PageDocument, PageGeometry, Placement};
pub use platform::{
    Delivery, PlatformAdapter, PlatformJobHandle, SpoolError, SpoolPage, SystemAdapter,
};
pub use printer::{ImagePrinter, SilentPrinter, SurfaceSlot};
pub use raster::RenderedPage;
pub use reference::ImageReference;
pub use surface::{
    LoadCallback, LoadEvent, PrintCallback, RasterSurface, RasterSurfaceFactory, RenderSurface,
    SurfaceFactory,
};
