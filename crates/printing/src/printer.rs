use std::sync::mpsc;

use log::{debug, info, warn};

use crate::error::PrintError;
use crate::job::{PrintOptions, SurfacePolicy};
use crate::layout::{DocumentMode, PageDocument};
use crate::reference::ImageReference;
use crate::surface::{LoadEvent, RenderSurface, SurfaceFactory};

/// Prints one image reference at a time.
/// 一次列印一個影像參照。
pub trait ImagePrinter {
    fn print_image(&mut self, reference: &str, device_name: Option<&str>)
        -> Result<(), PrintError>;

    /// Makes sure a surface exists, creating it when none is open.
    fn ensure_surface(&mut self) -> Result<(), PrintError>;

    fn has_surface(&self) -> bool;

    /// Drops the current surface, if any.
    fn discard_surface(&mut self);
}

/// Owner of the single render surface.
/// 唯一繪製表面的擁有者。
pub struct SurfaceSlot<F: SurfaceFactory> {
    factory: F,
    surface: Option<F::Surface>,
    created: u64,
}

impl<F: SurfaceFactory> SurfaceSlot<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            surface: None,
            created: 0,
        }
    }

    /// Returns the open surface, creating one first if needed.
    pub fn acquire(&mut self) -> Result<&mut F::Surface, PrintError> {
        if self.surface.is_none() {
            let surface = self.factory.create()?;
            self.created += 1;
            debug!("render surface #{} created", self.created);
            self.surface = Some(surface);
        }
        self.surface
            .as_mut()
            .ok_or_else(|| PrintError::Surface("render surface unavailable".to_string()))
    }

    pub fn close(&mut self) {
        if let Some(mut surface) = self.surface.take() {
            surface.close();
            debug!("render surface #{} closed", self.created);
        }
    }

    /// Applies `policy` once a job is done with the surface.
    pub fn release(&mut self, policy: SurfacePolicy) {
        match policy {
            SurfacePolicy::RecreatePerJob => self.close(),
            SurfacePolicy::Reuse => {}
        }
    }

    pub fn is_open(&self) -> bool {
        self.surface.is_some()
    }

    /// Number of surfaces created so far.
    pub fn created(&self) -> u64 {
        self.created
    }
}

/// Silent printer driving a render surface through its callback API.
/// 透過回呼介面驅動繪製表面的靜默列印器。
pub struct SilentPrinter<F: SurfaceFactory> {
    slot: SurfaceSlot<F>,
    policy: SurfacePolicy,
    mode: DocumentMode,
    options: PrintOptions,
}

impl<F: SurfaceFactory> SilentPrinter<F> {
    pub fn new(
        factory: F,
        policy: SurfacePolicy,
        mode: DocumentMode,
        options: PrintOptions,
    ) -> Self {
        Self {
            slot: SurfaceSlot::new(factory),
            policy,
            mode,
            options,
        }
    }

    pub fn slot(&self) -> &SurfaceSlot<F> {
        &self.slot
    }
}

impl<F: SurfaceFactory> ImagePrinter for SilentPrinter<F> {
    fn print_image(
        &mut self,
        reference: &str,
        device_name: Option<&str>,
    ) -> Result<(), PrintError> {
        let document = PageDocument::new(ImageReference::classify(reference), self.mode);

        let surface = self.slot.acquire()?;
        if let LoadEvent::Failed { description } = load_blocking(surface, document) {
            warn!("load failed for {reference}: {description}");
            self.slot.close();
            return Err(PrintError::LoadFailure(description));
        }

        let options = self.options.for_device(device_name);
        let surface = self.slot.acquire()?;
        let (success, reason) = print_blocking(surface, &options);
        self.slot.release(self.policy);

        if success {
            info!(
                "printed {reference} on {}",
                options.device_name.as_deref().unwrap_or("default printer")
            );
            Ok(())
        } else {
            Err(PrintError::PrintFailure(reason))
        }
    }

    fn ensure_surface(&mut self) -> Result<(), PrintError> {
        self.slot.acquire().map(|_| ())
    }

    fn has_surface(&self) -> bool {
        self.slot.is_open()
    }

    fn discard_surface(&mut self) {
        self.slot.close();
    }
}

fn load_blocking<S: RenderSurface>(surface: &mut S, document: PageDocument) -> LoadEvent {
    let (tx, rx) = mpsc::sync_channel(1);
    surface.load(
        document,
        Box::new(move |event| {
            let _ = tx.send(event);
        }),
    );
    rx.recv().unwrap_or_else(|_| LoadEvent::Failed {
        description: "render surface dropped the load callback".to_string(),
    })
}

fn print_blocking<S: RenderSurface>(surface: &mut S, options: &PrintOptions) -> (bool, String) {
    let (tx, rx) = mpsc::sync_channel(1);
    surface.print(
        options,
        Box::new(move |success, reason| {
            let _ = tx.send((success, reason));
        }),
    );
    rx.recv()
        .unwrap_or_else(|_| (false, "print subsystem dropped the completion callback".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::{LoadCallback, PrintCallback};
    use std::sync::{Arc, Mutex};
    use std::thread;

    #[derive(Default)]
    struct Script {
        load_failure: Option<String>,
        print_failure: Option<String>,
        drop_print_callback: bool,
        log: Vec<String>,
        closed: usize,
    }

    /// Surface answering from a background thread, the way an engine would.
    struct ThreadedSurface {
        id: usize,
        script: Arc<Mutex<Script>>,
    }

    impl RenderSurface for ThreadedSurface {
        fn load(&mut self, document: PageDocument, on_event: LoadCallback) {
            let mut script = self.script.lock().unwrap();
            script
                .log
                .push(format!("load#{} {}", self.id, document.reference));
            let event = match &script.load_failure {
                Some(description) => LoadEvent::Failed {
                    description: description.clone(),
                },
                None => LoadEvent::Finished,
            };
            thread::spawn(move || on_event(event));
        }

        fn print(&mut self, options: &PrintOptions, on_complete: PrintCallback) {
            let mut script = self.script.lock().unwrap();
            script.log.push(format!(
                "print#{} {}",
                self.id,
                options.device_name.as_deref().unwrap_or("-")
            ));
            if script.drop_print_callback {
                return;
            }
            let outcome = match &script.print_failure {
                Some(reason) => (false, reason.clone()),
                None => (true, String::new()),
            };
            thread::spawn(move || on_complete(outcome.0, outcome.1));
        }

        fn close(&mut self) {
            self.script.lock().unwrap().closed += 1;
        }
    }

    struct ScriptedFactory {
        script: Arc<Mutex<Script>>,
        next_id: Mutex<usize>,
    }

    impl SurfaceFactory for ScriptedFactory {
        type Surface = ThreadedSurface;

        fn create(&self) -> Result<Self::Surface, PrintError> {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            Ok(ThreadedSurface {
                id: *next,
                script: Arc::clone(&self.script),
            })
        }
    }

    fn printer(
        policy: SurfacePolicy,
        script: Script,
    ) -> (SilentPrinter<ScriptedFactory>, Arc<Mutex<Script>>) {
        let script = Arc::new(Mutex::new(script));
        let factory = ScriptedFactory {
            script: Arc::clone(&script),
            next_id: Mutex::new(0),
        };
        let options = PrintOptions {
            device_name: Some("Default".into()),
            ..PrintOptions::default()
        };
        (
            SilentPrinter::new(factory, policy, DocumentMode::ImagePage, options),
            script,
        )
    }

    #[test]
    fn recreate_policy_uses_fresh_surface_per_image() {
        let (mut printer, script) = printer(SurfacePolicy::RecreatePerJob, Script::default());
        printer.print_image("/tmp/a.png", None).unwrap();
        printer.print_image("/tmp/b.png", Some("Office")).unwrap();

        assert!(!printer.has_surface());
        assert_eq!(printer.slot().created(), 2);
        let script = script.lock().unwrap();
        assert_eq!(
            script.log,
            vec![
                "load#1 /tmp/a.png",
                "print#1 Default",
                "load#2 /tmp/b.png",
                "print#2 Office",
            ]
        );
        assert_eq!(script.closed, 2);
    }

    #[test]
    fn reuse_policy_keeps_one_surface() {
        let (mut printer, _) = printer(SurfacePolicy::Reuse, Script::default());
        printer.ensure_surface().unwrap();
        printer.print_image("/tmp/a.png", None).unwrap();
        printer.print_image("/tmp/b.png", None).unwrap();
        assert!(printer.has_surface());
        assert_eq!(printer.slot().created(), 1);
    }

    #[test]
    fn load_failure_closes_surface() {
        let (mut printer, script) = printer(
            SurfacePolicy::Reuse,
            Script {
                load_failure: Some("net::ERR_FILE_NOT_FOUND".into()),
                ..Script::default()
            },
        );
        let err = printer.print_image("/tmp/missing.png", None).unwrap_err();
        assert_eq!(err, PrintError::LoadFailure("net::ERR_FILE_NOT_FOUND".into()));
        assert!(!printer.has_surface());
        assert_eq!(script.lock().unwrap().closed, 1);
    }

    #[test]
    fn print_failure_keeps_reason() {
        let (mut printer, _) = printer(
            SurfacePolicy::Reuse,
            Script {
                print_failure: Some("no printers available".into()),
                ..Script::default()
            },
        );
        let err = printer.print_image("/tmp/a.png", None).unwrap_err();
        assert_eq!(err, PrintError::PrintFailure("no printers available".into()));
        assert_eq!(err.to_string(), "Print failed: no printers available");
        assert!(printer.has_surface());
    }

    #[test]
    fn dropped_callback_becomes_print_failure() {
        let (mut printer, _) = printer(
            SurfacePolicy::RecreatePerJob,
            Script {
                drop_print_callback: true,
                ..Script::default()
            },
        );
        let err = printer.print_image("/tmp/a.png", None).unwrap_err();
        assert!(matches!(err, PrintError::PrintFailure(_)));
    }
}
