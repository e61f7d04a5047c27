use std::env;
use std::io::{self, BufRead, BufReader, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::lifecycle::LifecycleEvent;

const IO_TIMEOUT: Duration = Duration::from_secs(5);
// Shorter than IO_TIMEOUT so the other process still reads the reply.
const ACCEPT_TIMEOUT: Duration = Duration::from_secs(3);
const ACK: &str = "ok";

/// 單一執行個體鎖的錯誤。 / Errors raised by the single-instance lock.
#[derive(Debug, Error)]
pub enum InstanceError {
    #[error("failed to bind instance lock on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },
    #[error("failed to reach the running instance on port {port}: {source}")]
    Connect {
        port: u16,
        #[source]
        source: io::Error,
    },
    #[error("running instance did not acknowledge the launch")]
    NotAcknowledged,
    #[error("failed to encode launch message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Command line of a launch handed over to the primary instance.
/// 轉交給主執行個體的啟動參數。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardedLaunch {
    pub argv: Vec<String>,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
}

impl ForwardedLaunch {
    pub fn current() -> Self {
        Self {
            argv: env::args().collect(),
            cwd: env::current_dir().ok(),
        }
    }
}

impl ForwardedLaunch {
    pub fn into_event(self, receipt: LaunchReceipt) -> LifecycleEvent {
        LifecycleEvent::SecondInstance {
            argv: self.argv,
            cwd: self.cwd,
            receipt,
        }
    }
}

impl From<ForwardedLaunch> for LifecycleEvent {
    fn from(launch: ForwardedLaunch) -> Self {
        launch.into_event(LaunchReceipt::default())
    }
}

/// Acknowledgement owed to the process that forwarded a launch.
/// 轉交啟動的確認憑據。
///
/// The listener answers only once the receipt is confirmed. Dropping it unconfirmed
/// leaves the other process to print its link itself. Receipts carry no data and always
/// compare equal.
#[derive(Debug, Clone, Default)]
pub struct LaunchReceipt(Option<SyncSender<()>>);

impl LaunchReceipt {
    pub fn pair() -> (Self, Receiver<()>) {
        let (tx, rx) = mpsc::sync_channel(1);
        (Self(Some(tx)), rx)
    }

    pub fn confirm(self) {
        if let Some(tx) = self.0 {
            let _ = tx.try_send(());
        }
    }
}

impl PartialEq for LaunchReceipt {
    fn eq(&self, _: &Self) -> bool {
        true
    }
}

impl Eq for LaunchReceipt {}

/// Loopback listener proving this process is the primary instance.
/// 以回送位址監聽埠作為主執行個體的憑證。
#[derive(Debug)]
pub struct InstanceLock {
    listener: TcpListener,
}

impl InstanceLock {
    /// Takes the lock, or returns `None` when another process already holds it.
    pub fn acquire(port: u16) -> Result<Option<Self>, InstanceError> {
        match TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, port))) {
            Ok(listener) => {
                debug!("instance lock held on port {port}");
                Ok(Some(Self { listener }))
            }
            Err(err) if err.kind() == io::ErrorKind::AddrInUse => Ok(None),
            Err(source) => Err(InstanceError::Bind { port, source }),
        }
    }

    pub fn port(&self) -> Option<u16> {
        self.listener.local_addr().ok().map(|addr| addr.port())
    }

    /// Forwards every incoming launch to `events` on a background thread and
    /// acknowledges it once the event loop confirms the attached receipt.
    pub fn listen(self, events: Sender<LifecycleEvent>) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("lasoprinter-instance".into())
            .spawn(move || {
                for stream in self.listener.incoming() {
                    let stream = match stream {
                        Ok(stream) => stream,
                        Err(err) => {
                            warn!("instance lock accept failed: {err}");
                            continue;
                        }
                    };
                    match read_launch(stream) {
                        Ok((launch, mut stream)) => {
                            info!("received launch from another instance");
                            let (receipt, confirmed) = LaunchReceipt::pair();
                            if events.send(launch.into_event(receipt)).is_err() {
                                break;
                            }
                            match confirmed.recv_timeout(ACCEPT_TIMEOUT) {
                                Ok(()) => {
                                    let _ = writeln!(stream, "{ACK}");
                                }
                                Err(_) => {
                                    warn!("launch not taken by the host; left unacknowledged")
                                }
                            }
                        }
                        Err(err) => warn!("discarding malformed launch message: {err}"),
                    }
                }
                debug!("instance listener stopped");
            })
    }
}

fn read_launch(stream: TcpStream) -> io::Result<(ForwardedLaunch, TcpStream)> {
    stream.set_read_timeout(Some(IO_TIMEOUT))?;
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    reader.read_line(&mut line)?;
    let launch = serde_json::from_str(line.trim())
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
    Ok((launch, reader.into_inner()))
}

/// Hands `launch` to the instance listening on `port` and waits for its acknowledgement.
/// 將啟動參數交給既有執行個體。
pub fn forward(port: u16, launch: &ForwardedLaunch) -> Result<(), InstanceError> {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    let connect_err = |source| InstanceError::Connect { port, source };

    let mut stream = TcpStream::connect_timeout(&addr, IO_TIMEOUT).map_err(connect_err)?;
    stream.set_read_timeout(Some(IO_TIMEOUT)).map_err(connect_err)?;
    stream
        .set_write_timeout(Some(IO_TIMEOUT))
        .map_err(connect_err)?;

    let mut payload = serde_json::to_string(launch)?;
    payload.push('\n');
    stream.write_all(payload.as_bytes()).map_err(connect_err)?;
    stream.flush().map_err(connect_err)?;

    let mut reply = String::new();
    BufReader::new(stream)
        .read_line(&mut reply)
        .map_err(connect_err)?;
    if reply.trim() == ACK {
        Ok(())
    } else {
        Err(InstanceError::NotAcknowledged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn primary() -> (InstanceLock, u16) {
        let lock = InstanceLock::acquire(0).unwrap().expect("ephemeral port is free");
        let port = lock.port().unwrap();
        (lock, port)
    }

    fn forward_in_background(
        port: u16,
        launch: &ForwardedLaunch,
    ) -> JoinHandle<Result<(), InstanceError>> {
        let launch = launch.clone();
        thread::spawn(move || forward(port, &launch))
    }

    #[test]
    fn second_acquire_on_held_port_is_refused() {
        let (_lock, port) = primary();
        assert!(InstanceLock::acquire(port).unwrap().is_none());
    }

    #[test]
    fn forwarded_launch_becomes_second_instance_event() {
        let (lock, port) = primary();
        let (tx, rx) = mpsc::channel();
        lock.listen(tx).unwrap();

        let launch = ForwardedLaunch {
            argv: vec![
                "lasoprinter".into(),
                "lasoprinter://print?url=%2Ftmp%2Fa.png".into(),
            ],
            cwd: Some(PathBuf::from("/tmp")),
        };
        let forwarder = forward_in_background(port, &launch);

        let mut event = rx.recv_timeout(IO_TIMEOUT).unwrap();
        event.take_receipt().unwrap().confirm();
        assert_eq!(event, LifecycleEvent::from(launch));
        forwarder.join().unwrap().unwrap();
    }

    #[test]
    fn dropped_receipt_leaves_launch_unacknowledged() {
        let (lock, port) = primary();
        let (tx, rx) = mpsc::channel();
        lock.listen(tx).unwrap();

        let launch = ForwardedLaunch {
            argv: vec![
                "lasoprinter".into(),
                "lasoprinter://print?url=%2Ftmp%2Fa.png".into(),
            ],
            cwd: None,
        };
        let forwarder = forward_in_background(port, &launch);

        let mut event = rx.recv_timeout(IO_TIMEOUT).unwrap();
        drop(event.take_receipt().unwrap());
        assert!(matches!(
            forwarder.join().unwrap(),
            Err(InstanceError::NotAcknowledged | InstanceError::Connect { .. })
        ));
    }

    #[test]
    fn malformed_message_is_skipped() {
        let (lock, port) = primary();
        let (tx, rx) = mpsc::channel();
        lock.listen(tx).unwrap();

        let mut stream = TcpStream::connect((Ipv4Addr::LOCALHOST, port)).unwrap();
        stream.write_all(b"not json\n").unwrap();
        drop(stream);

        let launch = ForwardedLaunch {
            argv: vec!["lasoprinter".into()],
            cwd: None,
        };
        let forwarder = forward_in_background(port, &launch);
        let mut event = rx.recv_timeout(IO_TIMEOUT).unwrap();
        event.take_receipt().unwrap().confirm();
        assert_eq!(event, LifecycleEvent::from(launch));
        forwarder.join().unwrap().unwrap();
    }

    #[test]
    fn forward_without_primary_fails() {
        let (lock, port) = primary();
        drop(lock);
        assert!(matches!(
            forward(port, &ForwardedLaunch { argv: Vec::new(), cwd: None }),
            Err(InstanceError::Connect { .. })
        ));
    }
}
