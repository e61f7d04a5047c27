use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver};

use lasoprinter_printing::{RasterSurfaceFactory, SilentPrinter, SystemAdapter};
use lasoprinter_settings::{AppConfig, RunMode};
use log::{error, info, warn};
use thiserror::Error;

use crate::dispatcher::{DeepLinkDispatcher, DispatchOutcome};
use crate::instance::{forward, ForwardedLaunch, InstanceLock};
use crate::lifecycle::{Directive, Lifecycle, LifecycleEvent, LifecycleState};
use crate::protocol::{HandlerCommand, ProtocolRegistrar};
use crate::queue::{PrintQueue, QueueHandle};

#[derive(Debug, Error)]
pub enum HostError {
    #[error("failed to start print worker: {0}")]
    Worker(#[source] io::Error),
    #[error("failed to start instance listener: {0}")]
    Listener(#[source] io::Error),
}

/// 啟動主程序所需的設定。 / Everything needed to start the host.
#[derive(Debug, Clone)]
pub struct HostOptions {
    pub config: AppConfig,
    pub mode: RunMode,
    pub config_path: Option<PathBuf>,
    /// Link passed on the command line of this launch.
    pub initial_link: Option<String>,
    pub register_protocol: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostExit {
    /// Another instance received this launch.
    Forwarded,
    Terminated,
}

/// Runs the host until the lifecycle terminates it.
/// 執行主程序直到生命週期結束。
pub fn run(options: HostOptions) -> Result<HostExit, HostError> {
    let HostOptions {
        config,
        mode,
        config_path,
        initial_link,
        register_protocol,
    } = options;
    info!("starting lasoprinter host ({mode} mode)");

    if register_protocol {
        match HandlerCommand::current(mode, config_path.as_deref()) {
            Ok(command) => {
                ProtocolRegistrar::new(config.scheme.clone(), command).register_or_warn()
            }
            Err(err) => warn!("skipping protocol registration: {err}"),
        }
    }

    let (events_tx, events_rx) = mpsc::channel();

    if config.single_instance.applies(mode) {
        match claim_instance(config.instance_port) {
            InstanceClaim::Primary(lock) => {
                lock.listen(events_tx.clone()).map_err(HostError::Listener)?;
            }
            InstanceClaim::Forwarded => return Ok(HostExit::Forwarded),
            InstanceClaim::Unlocked => {}
        }
    }

    let queue =
        PrintQueue::spawn(build_printer(&config), events_tx.clone()).map_err(HostError::Worker)?;

    let mut event_loop = EventLoop::new(&config, queue.handle());
    if let Some(link) = initial_link {
        let _ = events_tx.send(LifecycleEvent::OpenUrl(link));
    }
    let _ = events_tx.send(LifecycleEvent::Ready);
    drop(events_tx);

    event_loop.run(events_rx);
    queue.shutdown();
    info!("lasoprinter host stopped");
    Ok(HostExit::Terminated)
}

enum InstanceClaim {
    Primary(InstanceLock),
    Forwarded,
    Unlocked,
}

fn claim_instance(port: u16) -> InstanceClaim {
    let acquire = || match InstanceLock::acquire(port) {
        Ok(lock) => lock,
        Err(err) => {
            warn!("{err}; running without instance lock");
            None
        }
    };

    if let Some(lock) = acquire() {
        return InstanceClaim::Primary(lock);
    }
    match forward(port, &ForwardedLaunch::current()) {
        Ok(()) => {
            info!("launch handed to the running instance");
            return InstanceClaim::Forwarded;
        }
        Err(err) => warn!("could not forward launch: {err}"),
    }
    // The holder may have exited between our bind and connect.
    match acquire() {
        Some(lock) => InstanceClaim::Primary(lock),
        None => {
            warn!("instance lock unavailable; running unlocked");
            InstanceClaim::Unlocked
        }
    }
}

/// Applies lifecycle directives to the dispatcher and print queue.
/// 將生命週期指令套用到分派器與列印佇列。
pub struct EventLoop {
    lifecycle: Lifecycle,
    dispatcher: DeepLinkDispatcher<QueueHandle>,
    queue: QueueHandle,
}

impl EventLoop {
    pub fn new(config: &AppConfig, queue: QueueHandle) -> Self {
        Self {
            lifecycle: Lifecycle::new(config.scheme.clone(), config.stays_resident()),
            dispatcher: DeepLinkDispatcher::new(config.scheme.clone(), queue.clone()),
            queue,
        }
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn run(&mut self, events: Receiver<LifecycleEvent>) {
        while let Ok(event) = events.recv() {
            if !self.step(event) {
                // Unconfirmed receipts send their launches back to the other process.
                let late = events.try_iter().count();
                if late > 0 {
                    info!("dropping {late} event(s) queued behind termination");
                }
                return;
            }
        }
        info!("event sources closed");
    }

    /// Handles one event; returns `false` once the host has terminated.
    ///
    /// A forwarded launch is acknowledged only when the host is still live after it.
    pub fn step(&mut self, mut event: LifecycleEvent) -> bool {
        let receipt = event.take_receipt();
        let directives = self.lifecycle.handle(event);
        for directive in directives {
            let applied = panic::catch_unwind(AssertUnwindSafe(|| self.apply(directive)));
            if applied.is_err() {
                error!("lifecycle callback panicked; continuing");
            }
        }
        let live = self.lifecycle.state() != LifecycleState::Terminated;
        if let Some(receipt) = receipt.filter(|_| live) {
            receipt.confirm();
        }
        live
    }

    fn apply(&mut self, directive: Directive) {
        match directive {
            Directive::CreateSurface => {
                if self.queue.ensure_surface().is_err() {
                    error!("print queue closed; cannot create render surface");
                }
            }
            Directive::Dispatch(link) => {
                if let DispatchOutcome::Queued { .. } = self.dispatcher.handle_deep_link(&link) {
                    self.lifecycle.mark_queued();
                }
            }
            Directive::Terminate => info!("host terminating"),
        }
    }
}

/// Silent printer backed by the system spooler.
pub type SystemPrinter = SilentPrinter<RasterSurfaceFactory<SystemAdapter>>;

/// Printer configured from `config`, spooling natively or into `spool_dir`.
pub fn build_printer(config: &AppConfig) -> SystemPrinter {
    SilentPrinter::new(
        RasterSurfaceFactory::new(SystemAdapter::from_spool_dir(config.spool_dir.clone())),
        config.surface_policy,
        config.document_mode,
        config.print_options(),
    )
}
