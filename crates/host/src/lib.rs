//! Host process for lasoprinter: protocol registration, single-instance handling,
//! lifecycle and the print queue behind the deep-link dispatcher.
//! lasoprinter 主程序：協定註冊、單一執行個體、生命週期與列印佇列。

pub mod app;
pub mod dispatcher;
pub mod instance;
pub mod lifecycle;
pub mod protocol;
pub mod queue;

pub use app::{build_printer, run, EventLoop, HostError, HostExit, HostOptions, SystemPrinter};
pub use dispatcher::{DeepLinkDispatcher, DispatchOutcome, JobSink, PrintRequest};
pub use instance::{forward, ForwardedLaunch, InstanceError, InstanceLock, LaunchReceipt};
pub use lifecycle::{Directive, Lifecycle, LifecycleEvent, LifecycleState};
pub use protocol::{HandlerCommand, ProtocolRegistrar, RegistrationError};
pub use queue::{print_request, PrintQueue, QueueClosed, QueueHandle, RequestReport};
