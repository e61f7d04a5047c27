//! Host process state machine.
//! 主程序的狀態機。
//!
//! [`Lifecycle::handle`] never performs side effects itself; it returns the
//! [`Directive`]s the event loop has to carry out.

use std::path::PathBuf;

use lasoprinter_deeplink::link_from_argv;
use log::{debug, info};

use crate::instance::LaunchReceipt;

/// 來自作業系統或背景工作的事件。 / Events delivered to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Startup finished.
    Ready,
    /// The OS handed over a link directly.
    OpenUrl(String),
    /// Another launch forwarded its command line.
    SecondInstance {
        argv: Vec<String>,
        cwd: Option<PathBuf>,
        receipt: LaunchReceipt,
    },
    /// Reactivation request (for example a launch without a link).
    Activate,
    /// The render surface is gone.
    AllWindowsClosed,
    /// The print worker completed one request.
    JobFinished { surface_open: bool },
    Quit,
}

impl LifecycleEvent {
    /// Detaches the acknowledgement a forwarded launch is waiting for.
    pub fn take_receipt(&mut self) -> Option<LaunchReceipt> {
        match self {
            LifecycleEvent::SecondInstance { receipt, .. } => Some(std::mem::take(receipt)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    NotReady,
    Ready,
    Active,
    Idle,
    Terminated,
}

/// 事件迴圈需執行的動作。 / Work the event loop must perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    CreateSurface,
    Dispatch(String),
    Terminate,
}

#[derive(Debug)]
pub struct Lifecycle {
    state: LifecycleState,
    scheme: String,
    stay_resident: bool,
    pending: Vec<String>,
    in_flight: usize,
    surface_open: bool,
}

impl Lifecycle {
    pub fn new(scheme: impl Into<String>, stay_resident: bool) -> Self {
        Self {
            state: LifecycleState::NotReady,
            scheme: scheme.into(),
            stay_resident,
            pending: Vec::new(),
            in_flight: 0,
            surface_open: false,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn surface_open(&self) -> bool {
        self.surface_open
    }

    /// Records that a dispatched link produced a queued print request.
    pub fn mark_queued(&mut self) {
        if self.state == LifecycleState::Terminated {
            return;
        }
        self.in_flight += 1;
        self.state = LifecycleState::Active;
    }

    pub fn handle(&mut self, event: LifecycleEvent) -> Vec<Directive> {
        if self.state == LifecycleState::Terminated {
            debug!("ignoring {event:?} after termination");
            return Vec::new();
        }

        match event {
            LifecycleEvent::Ready => self.on_ready(),
            LifecycleEvent::OpenUrl(link) => self.on_link(link),
            LifecycleEvent::SecondInstance { argv, cwd, .. } => {
                debug!("second instance from {cwd:?}: {argv:?}");
                match link_from_argv(&argv, &self.scheme) {
                    Some(link) => {
                        let mut directives = self.ensure_surface();
                        directives.extend(self.on_link(link));
                        directives
                    }
                    None => self.on_activate(),
                }
            }
            LifecycleEvent::Activate => self.on_activate(),
            LifecycleEvent::AllWindowsClosed => {
                self.surface_open = false;
                self.settle()
            }
            LifecycleEvent::JobFinished { surface_open } => {
                self.in_flight = self.in_flight.saturating_sub(1);
                self.surface_open = surface_open;
                self.settle()
            }
            LifecycleEvent::Quit => self.terminate(),
        }
    }

    fn on_ready(&mut self) -> Vec<Directive> {
        if self.state != LifecycleState::NotReady {
            return Vec::new();
        }
        self.state = LifecycleState::Ready;
        let mut directives = self.ensure_surface();
        if !self.pending.is_empty() {
            info!("flushing {} buffered link(s)", self.pending.len());
        }
        directives.extend(self.pending.drain(..).map(Directive::Dispatch));
        directives
    }

    fn on_link(&mut self, link: String) -> Vec<Directive> {
        if self.state == LifecycleState::NotReady {
            debug!("buffering link until ready");
            self.pending.push(link);
            return Vec::new();
        }
        vec![Directive::Dispatch(link)]
    }

    fn on_activate(&mut self) -> Vec<Directive> {
        if self.state == LifecycleState::NotReady {
            return Vec::new();
        }
        self.ensure_surface()
    }

    fn ensure_surface(&mut self) -> Vec<Directive> {
        if self.state == LifecycleState::NotReady || self.surface_open {
            return Vec::new();
        }
        self.surface_open = true;
        if self.in_flight == 0 {
            self.state = LifecycleState::Idle;
        }
        vec![Directive::CreateSurface]
    }

    // Without a surface and with nothing in flight the process either stays
    // resident or exits.
    fn settle(&mut self) -> Vec<Directive> {
        if self.in_flight > 0 {
            return Vec::new();
        }
        if self.surface_open || self.stay_resident {
            self.state = LifecycleState::Idle;
            return Vec::new();
        }
        self.terminate()
    }

    fn terminate(&mut self) -> Vec<Directive> {
        info!("terminating host");
        self.state = LifecycleState::Terminated;
        self.pending.clear();
        vec![Directive::Terminate]
    }
}
