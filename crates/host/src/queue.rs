//! Single-worker print queue.
//! 單一工作執行緒的列印佇列。
//!
//! The worker thread owns the [`ImagePrinter`] and therefore the only render surface.
//! Requests are served in arrival order and images inside a request one after another,
//! so no two print attempts ever share the surface.

use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use lasoprinter_printing::{ImagePrinter, PrintError};
use log::{debug, error, info, warn};
use thiserror::Error;

use crate::dispatcher::{JobSink, PrintRequest};
use crate::lifecycle::LifecycleEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("print queue is closed")]
pub struct QueueClosed;

#[derive(Debug)]
pub enum QueueMessage {
    Print(PrintRequest),
    EnsureSurface,
    Shutdown,
}

/// 單一請求的列印結果。 / Per-image results of one request, in print order.
#[derive(Debug, Default)]
pub struct RequestReport {
    pub outcomes: Vec<(String, Result<(), PrintError>)>,
}

impl RequestReport {
    pub fn printed(&self) -> impl Iterator<Item = &str> {
        self.outcomes
            .iter()
            .filter(|(_, result)| result.is_ok())
            .map(|(reference, _)| reference.as_str())
    }

    pub fn failed(&self) -> impl Iterator<Item = (&str, &PrintError)> {
        self.outcomes.iter().filter_map(|(reference, result)| {
            result.as_ref().err().map(|err| (reference.as_str(), err))
        })
    }

    pub fn failure_count(&self) -> usize {
        self.failed().count()
    }

    pub fn all_printed(&self) -> bool {
        self.failure_count() == 0
    }
}

/// Prints every image of `request` in order. A failing image never stops the rest.
/// 依序列印每張影像，單張失敗不影響其餘影像。
pub fn print_request<P: ImagePrinter>(printer: &mut P, request: &PrintRequest) -> RequestReport {
    let mut report = RequestReport::default();
    for (index, reference) in request.images.iter().enumerate() {
        debug!(
            "printing image {}/{}: {reference}",
            index + 1,
            request.images.len()
        );
        let attempt = panic::catch_unwind(AssertUnwindSafe(|| {
            printer.print_image(reference, request.printer.as_deref())
        }));
        let result = match attempt {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!("print attempt for {reference} panicked: {message}");
                printer.discard_surface();
                Err(PrintError::PrintFailure(format!("print attempt panicked: {message}")))
            }
        };
        if let Err(err) = &result {
            warn!("{reference}: {err}");
        }
        report.outcomes.push((reference.clone(), result));
    }
    report
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Cloneable submission handle for the queue.
#[derive(Debug, Clone)]
pub struct QueueHandle {
    tx: Sender<QueueMessage>,
}

impl QueueHandle {
    pub fn ensure_surface(&self) -> Result<(), QueueClosed> {
        self.tx
            .send(QueueMessage::EnsureSurface)
            .map_err(|_| QueueClosed)
    }
}

impl JobSink for QueueHandle {
    fn submit(&self, request: PrintRequest) -> Result<(), QueueClosed> {
        self.tx
            .send(QueueMessage::Print(request))
            .map_err(|_| QueueClosed)
    }
}

pub struct PrintQueue {
    handle: QueueHandle,
    worker: Option<JoinHandle<()>>,
}

impl PrintQueue {
    /// Starts the worker. Completion of every request is reported on `events`.
    pub fn spawn<P>(printer: P, events: Sender<LifecycleEvent>) -> io::Result<Self>
    where
        P: ImagePrinter + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let worker = thread::Builder::new()
            .name("lasoprinter-print".into())
            .spawn(move || run_worker(printer, rx, events))?;
        Ok(Self {
            handle: QueueHandle { tx },
            worker: Some(worker),
        })
    }

    pub fn handle(&self) -> QueueHandle {
        self.handle.clone()
    }

    /// Lets queued requests finish, then stops the worker.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.handle.tx.send(QueueMessage::Shutdown);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("print worker panicked");
            }
        }
    }
}

impl Drop for PrintQueue {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_worker<P: ImagePrinter>(
    mut printer: P,
    rx: Receiver<QueueMessage>,
    events: Sender<LifecycleEvent>,
) {
    while let Ok(message) = rx.recv() {
        match message {
            QueueMessage::Print(request) => {
                let report = print_request(&mut printer, &request);
                info!(
                    "request finished: {} printed, {} failed",
                    report.printed().count(),
                    report.failure_count()
                );
                let finished = LifecycleEvent::JobFinished {
                    surface_open: printer.has_surface(),
                };
                if events.send(finished).is_err() {
                    debug!("event loop gone; dropping completion");
                }
            }
            QueueMessage::EnsureSurface => {
                if let Err(err) = printer.ensure_surface() {
                    error!("could not create render surface: {err}");
                    let _ = events.send(LifecycleEvent::AllWindowsClosed);
                }
            }
            QueueMessage::Shutdown => break,
        }
    }
    printer.discard_surface();
    debug!("print worker stopped");
}
