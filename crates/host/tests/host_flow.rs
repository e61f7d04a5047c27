use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use image::{ImageBuffer, Rgba};
use lasoprinter_deeplink::build_link;
use lasoprinter_host::{
    forward, run, EventLoop, ForwardedLaunch, HostExit, HostOptions, InstanceLock,
    LaunchReceipt, LifecycleEvent, LifecycleState, PrintQueue,
};
use lasoprinter_settings::{AppConfig, RunMode, SingleInstanceScope};
use tempfile::tempdir;

fn write_png(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    ImageBuffer::from_pixel(40, 20, Rgba([0u8, 0, 0, 255]))
        .save(&path)
        .unwrap();
    path
}

fn spool_config(spool: &Path) -> AppConfig {
    AppConfig {
        single_instance: SingleInstanceScope::Never,
        stay_resident: Some(false),
        spool_dir: Some(spool.to_path_buf()),
        ..AppConfig::default()
    }
}

fn spooled_pages(spool: &Path) -> Vec<PathBuf> {
    let mut pages: Vec<PathBuf> = fs::read_dir(spool)
        .map(|entries| entries.map(|entry| entry.unwrap().path()).collect())
        .unwrap_or_default();
    pages.sort();
    pages
}

#[test]
fn initial_link_prints_then_host_exits() {
    let images = tempdir().unwrap();
    let spool = tempdir().unwrap();
    let a = write_png(images.path(), "a.png");
    let b = write_png(images.path(), "b.png");
    let link = build_link(
        "lasoprinter",
        "print",
        &[a.to_str().unwrap(), b.to_str().unwrap()],
        None,
    )
    .unwrap();

    let exit = run(HostOptions {
        config: spool_config(spool.path()),
        mode: RunMode::Production,
        config_path: None,
        initial_link: Some(link),
        register_protocol: false,
    })
    .unwrap();

    assert_eq!(exit, HostExit::Terminated);
    assert_eq!(spooled_pages(spool.path()).len(), 2);
}

#[test]
fn failing_image_does_not_block_the_next_one() {
    let images = tempdir().unwrap();
    let spool = tempdir().unwrap();
    let good = write_png(images.path(), "good.png");
    let missing = images.path().join("missing.png");
    let link = build_link(
        "lasoprinter",
        "print",
        &[missing.to_str().unwrap(), good.to_str().unwrap()],
        None,
    )
    .unwrap();

    let exit = run(HostOptions {
        config: spool_config(spool.path()),
        mode: RunMode::Production,
        config_path: None,
        initial_link: Some(link),
        register_protocol: false,
    })
    .unwrap();

    assert_eq!(exit, HostExit::Terminated);
    assert_eq!(spooled_pages(spool.path()).len(), 1);
}

#[test]
fn event_loop_tracks_second_instance_links() {
    let images = tempdir().unwrap();
    let spool = tempdir().unwrap();
    let image = write_png(images.path(), "label.png");
    let config = AppConfig {
        stay_resident: Some(true),
        ..spool_config(spool.path())
    };

    let (events_tx, events_rx) = mpsc::channel();
    let queue = PrintQueue::spawn(lasoprinter_host::build_printer(&config), events_tx).unwrap();
    let mut event_loop = EventLoop::new(&config, queue.handle());

    assert!(event_loop.step(LifecycleEvent::Ready));
    let link = build_link("lasoprinter", "print", &[image.to_str().unwrap()], None).unwrap();
    assert!(event_loop.step(LifecycleEvent::SecondInstance {
        argv: vec!["lasoprinter".into(), link],
        cwd: None,
        receipt: LaunchReceipt::default(),
    }));
    assert_eq!(event_loop.lifecycle().state(), LifecycleState::Active);
    assert_eq!(event_loop.lifecycle().in_flight(), 1);

    let finished = events_rx.recv().unwrap();
    assert_eq!(finished, LifecycleEvent::JobFinished { surface_open: false });
    assert!(event_loop.step(finished));
    assert_eq!(event_loop.lifecycle().state(), LifecycleState::Idle);

    assert!(!event_loop.step(LifecycleEvent::Quit));
    queue.shutdown();
    assert_eq!(spooled_pages(spool.path()).len(), 1);
}

fn launch_with(link: String) -> ForwardedLaunch {
    ForwardedLaunch {
        argv: vec!["lasoprinter".into(), link],
        cwd: None,
    }
}

#[test]
fn forwarded_launch_is_acknowledged_after_dispatch() {
    let images = tempdir().unwrap();
    let spool = tempdir().unwrap();
    let image = write_png(images.path(), "label.png");
    let config = AppConfig {
        stay_resident: Some(true),
        ..spool_config(spool.path())
    };

    let (events_tx, events_rx) = mpsc::channel();
    let queue =
        PrintQueue::spawn(lasoprinter_host::build_printer(&config), events_tx.clone()).unwrap();
    let lock = InstanceLock::acquire(0).unwrap().unwrap();
    let port = lock.port().unwrap();
    lock.listen(events_tx.clone()).unwrap();
    events_tx.send(LifecycleEvent::Ready).unwrap();

    let mut event_loop = EventLoop::new(&config, queue.handle());
    let host = thread::spawn(move || {
        event_loop.run(events_rx);
        event_loop.lifecycle().state()
    });

    let link = build_link("lasoprinter", "print", &[image.to_str().unwrap()], None).unwrap();
    forward(port, &launch_with(link)).unwrap();

    events_tx.send(LifecycleEvent::Quit).unwrap();
    assert_eq!(host.join().unwrap(), LifecycleState::Terminated);
    queue.shutdown();
    assert_eq!(spooled_pages(spool.path()).len(), 1);
}

#[test]
fn launch_queued_behind_termination_is_not_acknowledged() {
    let images = tempdir().unwrap();
    let spool = tempdir().unwrap();
    let first = write_png(images.path(), "first.png");
    let second = write_png(images.path(), "second.png");
    let config = spool_config(spool.path());

    let (events_tx, events_rx) = mpsc::channel();
    let queue =
        PrintQueue::spawn(lasoprinter_host::build_printer(&config), events_tx.clone()).unwrap();
    let mut event_loop = EventLoop::new(&config, queue.handle());

    assert!(event_loop.step(LifecycleEvent::Ready));
    let link = build_link("lasoprinter", "print", &[first.to_str().unwrap()], None).unwrap();
    assert!(event_loop.step(LifecycleEvent::OpenUrl(link)));

    // Put the terminating completion back in front of the forwarded launch.
    let finished = events_rx.recv_timeout(Duration::from_secs(30)).unwrap();
    assert_eq!(finished, LifecycleEvent::JobFinished { surface_open: false });
    events_tx.send(finished).unwrap();

    let lock = InstanceLock::acquire(0).unwrap().unwrap();
    let port = lock.port().unwrap();
    lock.listen(events_tx.clone()).unwrap();
    drop(events_tx);

    let late = build_link("lasoprinter", "print", &[second.to_str().unwrap()], None).unwrap();
    let forwarder = thread::spawn(move || forward(port, &launch_with(late)));
    thread::sleep(Duration::from_millis(200));

    event_loop.run(events_rx);
    assert_eq!(event_loop.lifecycle().state(), LifecycleState::Terminated);
    assert!(forwarder.join().unwrap().is_err());

    queue.shutdown();
    assert_eq!(spooled_pages(spool.path()).len(), 1);
}
