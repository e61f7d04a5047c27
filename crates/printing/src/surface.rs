//! Render surface abstraction.
//!
//! A surface is an off-screen rendering target with a callback API: `load` reports
//! exactly one [`LoadEvent`], `print` reports exactly one `(success, reason)` pair.
//! [`RasterSurface`] is the production implementation; it decodes the image, composes
//! the page and hands it to a [`PlatformAdapter`].

use std::fmt::Display;
use std::sync::Arc;

use image::DynamicImage;
use log::debug;

use crate::error::PrintError;
use crate::job::PrintOptions;
use crate::layout::{DocumentMode, PageDocument};
use crate::platform::{PlatformAdapter, PlatformJobHandle, SpoolPage};
use crate::raster::render_page;

/// Outcome of loading a document.
/// 載入文件的結果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadEvent {
    Finished,
    Failed { description: String },
}

pub type LoadCallback = Box<dyn FnOnce(LoadEvent) + Send>;
pub type PrintCallback = Box<dyn FnOnce(bool, String) + Send>;

/// Off-screen rendering target.
/// 離屏繪製目標。
pub trait RenderSurface {
    fn load(&mut self, document: PageDocument, on_event: LoadCallback);
    fn print(&mut self, options: &PrintOptions, on_complete: PrintCallback);
    fn close(&mut self);
}

/// Creates render surfaces on demand.
pub trait SurfaceFactory {
    type Surface: RenderSurface;

    fn create(&self) -> Result<Self::Surface, PrintError>;
}

struct LoadedDocument {
    image: DynamicImage,
    mode: DocumentMode,
    source: String,
}

/// Raster render surface backed by a platform spooler.
/// 以平台列印佇列為後端的點陣繪製表面。
pub struct RasterSurface<A> {
    adapter: Arc<A>,
    loaded: Option<LoadedDocument>,
    closed: bool,
}

impl<A> RasterSurface<A>
where
    A: PlatformAdapter,
    A::Error: Display,
{
    pub fn new(adapter: Arc<A>) -> Self {
        Self {
            adapter,
            loaded: None,
            closed: false,
        }
    }

    fn load_document(&mut self, document: &PageDocument) -> Result<LoadedDocument, String> {
        if self.closed {
            return Err("render surface is closed".to_string());
        }
        let bytes = document.reference.fetch()?;
        let image = image::load_from_memory(&bytes)
            .map_err(|_| "net::ERR_CONTENT_DECODING_FAILED".to_string())?;
        Ok(LoadedDocument {
            image,
            mode: document.mode,
            source: document.reference.to_string(),
        })
    }

    fn spool(&self, document: &LoadedDocument, options: &PrintOptions) -> Result<(), String> {
        let page = render_page(&document.image, document.mode, options)?;
        let mut handle = self
            .adapter
            .begin_job(options)
            .map_err(|err| err.to_string())?;
        let job_id = crate::job::PrintJobId::new();
        if let Err(err) = handle.submit_page(SpoolPage {
            job_id,
            page_number: 1,
            page,
        }) {
            let reason = err.to_string();
            handle.abort(&reason);
            return Err(reason);
        }
        handle.finish().map_err(|err| err.to_string())
    }
}

impl<A> RenderSurface for RasterSurface<A>
where
    A: PlatformAdapter,
    A::Error: Display,
{
    fn load(&mut self, document: PageDocument, on_event: LoadCallback) {
        // A new load always discards what was there before.
        self.loaded = None;
        match self.load_document(&document) {
            Ok(loaded) => {
                debug!(
                    "loaded {} ({}x{})",
                    loaded.source,
                    loaded.image.width(),
                    loaded.image.height()
                );
                self.loaded = Some(loaded);
                on_event(LoadEvent::Finished);
            }
            Err(description) => on_event(LoadEvent::Failed { description }),
        }
    }

    fn print(&mut self, options: &PrintOptions, on_complete: PrintCallback) {
        let Some(document) = self.loaded.as_ref() else {
            on_complete(false, "no document loaded".to_string());
            return;
        };
        match self.spool(document, options) {
            Ok(()) => on_complete(true, String::new()),
            Err(reason) => on_complete(false, reason),
        }
    }

    fn close(&mut self) {
        self.loaded = None;
        self.closed = true;
    }
}

/// Builds [`RasterSurface`]s sharing one adapter.
pub struct RasterSurfaceFactory<A> {
    adapter: Arc<A>,
}

impl<A> RasterSurfaceFactory<A> {
    pub fn new(adapter: A) -> Self {
        Self {
            adapter: Arc::new(adapter),
        }
    }
}

impl<A> SurfaceFactory for RasterSurfaceFactory<A>
where
    A: PlatformAdapter,
    A::Error: Display,
{
    type Surface = RasterSurface<A>;

    fn create(&self) -> Result<Self::Surface, PrintError> {
        Ok(RasterSurface::new(Arc::clone(&self.adapter)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::MockPlatformAdapter;
    use crate::reference::ImageReference;
    use std::sync::mpsc;

    fn png_data_uri() -> String {
        use base64::engine::general_purpose::STANDARD;
        use base64::Engine;
        use image::{ImageBuffer, ImageOutputFormat, Rgba};
        use std::io::Cursor;

        let img = DynamicImage::ImageRgba8(ImageBuffer::from_pixel(3, 2, Rgba([0, 128, 0, 255])));
        let mut bytes = Cursor::new(Vec::new());
        img.write_to(&mut bytes, ImageOutputFormat::Png).unwrap();
        format!("data:image/png;base64,{}", STANDARD.encode(bytes.into_inner()))
    }

    fn load(surface: &mut RasterSurface<MockPlatformAdapter>, raw: &str) -> LoadEvent {
        let (tx, rx) = mpsc::channel();
        surface.load(
            PageDocument::new(ImageReference::classify(raw), DocumentMode::ImagePage),
            Box::new(move |event| tx.send(event).unwrap()),
        );
        rx.recv().unwrap()
    }

    fn print(surface: &mut RasterSurface<MockPlatformAdapter>) -> (bool, String) {
        let (tx, rx) = mpsc::channel();
        surface.print(
            &PrintOptions::default(),
            Box::new(move |ok, reason| tx.send((ok, reason)).unwrap()),
        );
        rx.recv().unwrap()
    }

    #[test]
    fn loads_and_spools_one_page() {
        let adapter = MockPlatformAdapter::new();
        let mut surface = RasterSurface::new(Arc::new(adapter.clone()));
        assert_eq!(load(&mut surface, &png_data_uri()), LoadEvent::Finished);
        assert_eq!(print(&mut surface), (true, String::new()));

        let jobs = adapter.drain_jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].pages.len(), 1);
        assert_eq!(jobs[0].pages[0].page.width_px, 1632);
    }

    #[test]
    fn undecodable_content_fails_to_load() {
        let mut surface = RasterSurface::new(Arc::new(MockPlatformAdapter::new()));
        let event = load(&mut surface, "data:text/plain,not-an-image");
        assert_eq!(
            event,
            LoadEvent::Failed {
                description: "net::ERR_CONTENT_DECODING_FAILED".into()
            }
        );
        assert_eq!(print(&mut surface), (false, "no document loaded".to_string()));
    }

    #[test]
    fn spooler_rejection_is_reported_verbatim() {
        let adapter = MockPlatformAdapter::rejecting("no printers available");
        let mut surface = RasterSurface::new(Arc::new(adapter));
        load(&mut surface, &png_data_uri());
        assert_eq!(print(&mut surface), (false, "no printers available".to_string()));
    }

    #[test]
    fn closed_surface_refuses_work() {
        let mut surface = RasterSurface::new(Arc::new(MockPlatformAdapter::new()));
        surface.close();
        assert!(matches!(
            load(&mut surface, &png_data_uri()),
            LoadEvent::Failed { .. }
        ));
    }
}
