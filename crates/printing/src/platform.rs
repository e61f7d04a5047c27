use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, info, warn};
use thiserror::Error;

use crate::job::{PageSize, PrintJobId, PrintOptions};
use crate::raster::RenderedPage;
#[cfg(test)]
use std::sync::{Arc, Mutex};

/// Represents a composed page queued for spooling.
/// 表示待送往列印佇列的頁面。
#[derive(Debug, Clone)]
pub struct SpoolPage {
    pub job_id: PrintJobId,
    pub page_number: u32,
    pub page: RenderedPage,
}

/// Handle returned when a platform adapter begins a job.
/// 平台列印介面開始作業時回傳的控制物件。
pub trait PlatformJobHandle {
    type Error;

    fn submit_page(&mut self, page: SpoolPage) -> Result<(), Self::Error>;
    fn finish(self) -> Result<(), Self::Error>;
    fn abort(self, reason: &str);
}

/// Abstraction over platform-specific print APIs.
/// 平台列印 API 的抽象介面。
pub trait PlatformAdapter: Send + Sync {
    type Error;
    type JobHandle: PlatformJobHandle<Error = Self::Error>;

    fn begin_job(&self, options: &PrintOptions) -> Result<Self::JobHandle, Self::Error>;
}

/// Failures reported by the system spooler.
/// 系統列印佇列回報的錯誤。
#[derive(Debug, Error)]
pub enum SpoolError {
    #[error("failed to write spool file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },
    /// The spooler ran but refused the job; the text is its own explanation.
    #[error("{0}")]
    Rejected(String),
}

/// How finished pages leave the process.
/// 完成的頁面如何離開本程序。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// CUPS `lp` (Linux, macOS and other Unix systems).
    Cups { program: String },
    /// The Windows shell image printer (`mspaint /p`, `/pt` for a named device).
    WindowsShell,
    /// PNG files kept in the spool directory; nothing reaches a printer.
    Directory,
}

impl Delivery {
    pub fn native() -> Self {
        if cfg!(target_os = "windows") {
            Delivery::WindowsShell
        } else {
            Delivery::Cups {
                program: "lp".to_string(),
            }
        }
    }
}

/// Spooler used by the daemon.
#[derive(Debug, Clone)]
pub struct SystemAdapter {
    delivery: Delivery,
    spool_dir: PathBuf,
}

impl SystemAdapter {
    pub fn new(delivery: Delivery, spool_dir: impl Into<PathBuf>) -> Self {
        Self {
            delivery,
            spool_dir: spool_dir.into(),
        }
    }

    /// Native printer delivery through the temp directory, or a folder of PNG pages
    /// when `spool_dir` is configured.
    pub fn from_spool_dir(spool_dir: Option<PathBuf>) -> Self {
        match spool_dir {
            Some(dir) => Self::new(Delivery::Directory, dir),
            None => Self::new(Delivery::native(), std::env::temp_dir()),
        }
    }
}

impl PlatformAdapter for SystemAdapter {
    type Error = SpoolError;
    type JobHandle = SpoolJob;

    fn begin_job(&self, options: &PrintOptions) -> Result<Self::JobHandle, Self::Error> {
        fs::create_dir_all(&self.spool_dir).map_err(|source| SpoolError::Write {
            path: self.spool_dir.clone(),
            source,
        })?;
        Ok(SpoolJob {
            id: PrintJobId::new(),
            options: options.clone(),
            delivery: self.delivery.clone(),
            dir: self.spool_dir.clone(),
            files: Vec::new(),
        })
    }
}

/// Job in progress: pages are written to disk, then handed to the spooler on finish.
pub struct SpoolJob {
    id: PrintJobId,
    options: PrintOptions,
    delivery: Delivery,
    dir: PathBuf,
    files: Vec<PathBuf>,
}

impl PlatformJobHandle for SpoolJob {
    type Error = SpoolError;

    fn submit_page(&mut self, page: SpoolPage) -> Result<(), Self::Error> {
        let path = self
            .dir
            .join(format!("lasoprinter-{}-page-{}.png", self.id, page.page_number));
        fs::write(&path, &page.page.png).map_err(|source| SpoolError::Write {
            path: path.clone(),
            source,
        })?;
        self.files.push(path);
        Ok(())
    }

    fn finish(self) -> Result<(), Self::Error> {
        let result = match &self.delivery {
            Delivery::Cups { program } => {
                let args = cups_arguments(&self.options, &self.files);
                run_spooler(program, &args)
            }
            Delivery::WindowsShell => self
                .files
                .iter()
                .try_for_each(|file| {
                    run_spooler("mspaint", &shell_arguments(&self.options, file))
                }),
            Delivery::Directory => {
                info!("{} spooled {} page(s) to {}", self.id, self.files.len(), self.dir.display());
                return Ok(());
            }
        };
        remove_files(&self.files);
        result
    }

    fn abort(self, reason: &str) {
        warn!("{} aborted: {reason}", self.id);
        remove_files(&self.files);
    }
}

/// Builds the `lp` argument list for the given pages.
/// 建立 `lp` 指令參數。
pub fn cups_arguments(options: &PrintOptions, files: &[PathBuf]) -> Vec<String> {
    let mut args = Vec::new();
    if options.silent {
        args.push("-s".to_string());
    }
    if let Some(device) = &options.device_name {
        args.push("-d".to_string());
        args.push(device.clone());
    }
    let mut push_option = |value: String| {
        args.push("-o".to_string());
        args.push(value);
    };
    push_option(format!("media={}", media_name(options.page_size)));
    push_option(format!(
        "print-color-mode={}",
        if options.color { "color" } else { "monochrome" }
    ));
    push_option(format!("ppi={}", PageSize::dpi(options.device_scale_factor)));
    for side in ["page-left", "page-right", "page-top", "page-bottom"] {
        push_option(format!("{side}=0"));
    }
    args.extend(files.iter().map(|file| file.display().to_string()));
    args
}

fn media_name(page: PageSize) -> String {
    if page == PageSize::LETTER {
        "Letter".to_string()
    } else if page == PageSize::A4 {
        "A4".to_string()
    } else {
        format!("Custom.{:.1}x{:.1}mm", page.width_mm(), page.height_mm())
    }
}

fn shell_arguments(options: &PrintOptions, file: &Path) -> Vec<String> {
    match &options.device_name {
        Some(device) => vec!["/pt".to_string(), file.display().to_string(), device.clone()],
        None => vec!["/p".to_string(), file.display().to_string()],
    }
}

fn run_spooler(program: &str, args: &[String]) -> Result<(), SpoolError> {
    debug!("running {program} {}", args.join(" "));
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|source| SpoolError::Launch {
            program: program.to_string(),
            source,
        })?;
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if stderr.is_empty() {
        Err(SpoolError::Rejected(format!("{program} exited with {}", output.status)))
    } else {
        Err(SpoolError::Rejected(stderr))
    }
}

fn remove_files(files: &[PathBuf]) {
    for file in files {
        if let Err(err) = fs::remove_file(file) {
            debug!("could not remove spool file {}: {err}", file.display());
        }
    }
}

/// Recorded job metadata produced by the mock adapter.
/// 模擬介面所記錄的列印作業中繼資料。
#[cfg(test)]
#[derive(Debug, Clone)]
pub struct RecordedJob {
    pub options: PrintOptions,
    pub pages: Vec<SpoolPage>,
    pub aborted: bool,
    pub abort_reason: Option<String>,
}

/// In-memory implementation of [`PlatformAdapter`] used for tests.
/// 測試使用的記憶體內部平台介面實作。
#[cfg(test)]
#[derive(Clone, Default)]
pub struct MockPlatformAdapter {
    jobs: Arc<Mutex<Vec<RecordedJob>>>,
    reject_with: Option<String>,
}

#[cfg(test)]
impl MockPlatformAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting(reason: &str) -> Self {
        Self {
            reject_with: Some(reason.to_string()),
            ..Self::default()
        }
    }

    pub fn drain_jobs(&self) -> Vec<RecordedJob> {
        self.jobs.lock().expect("lock poisoned").drain(..).collect()
    }
}

#[cfg(test)]
pub struct MockJobHandle {
    options: PrintOptions,
    pages: Vec<SpoolPage>,
    reject_with: Option<String>,
    sink: Arc<Mutex<Vec<RecordedJob>>>,
}

#[cfg(test)]
impl PlatformAdapter for MockPlatformAdapter {
    type Error = String;
    type JobHandle = MockJobHandle;

    fn begin_job(&self, options: &PrintOptions) -> Result<Self::JobHandle, Self::Error> {
        Ok(MockJobHandle {
            options: options.clone(),
            pages: Vec::new(),
            reject_with: self.reject_with.clone(),
            sink: self.jobs.clone(),
        })
    }
}

#[cfg(test)]
impl PlatformJobHandle for MockJobHandle {
    type Error = String;

    fn submit_page(&mut self, page: SpoolPage) -> Result<(), Self::Error> {
        self.pages.push(page);
        Ok(())
    }

    fn finish(self) -> Result<(), Self::Error> {
        if let Some(reason) = self.reject_with {
            return Err(reason);
        }
        let mut guard = self.sink.lock().expect("lock poisoned");
        guard.push(RecordedJob {
            options: self.options,
            pages: self.pages,
            aborted: false,
            abort_reason: None,
        });
        Ok(())
    }

    fn abort(self, reason: &str) {
        let mut guard = self.sink.lock().expect("lock poisoned");
        guard.push(RecordedJob {
            options: self.options,
            pages: Vec::new(),
            aborted: true,
            abort_reason: Some(reason.to_string()),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn blank_page() -> RenderedPage {
        RenderedPage {
            width_px: 1,
            height_px: 1,
            dpi: 192,
            grayscale: false,
            png: vec![0x89, b'P', b'N', b'G'],
        }
    }

    #[test]
    fn cups_arguments_follow_options() {
        let options = PrintOptions {
            device_name: Some("Front_Desk".into()),
            color: false,
            ..PrintOptions::default()
        };
        let args = cups_arguments(&options, &[PathBuf::from("/tmp/p1.png")]);
        assert_eq!(
            args,
            vec![
                "-s",
                "-d",
                "Front_Desk",
                "-o",
                "media=Letter",
                "-o",
                "print-color-mode=monochrome",
                "-o",
                "ppi=192",
                "-o",
                "page-left=0",
                "-o",
                "page-right=0",
                "-o",
                "page-top=0",
                "-o",
                "page-bottom=0",
                "/tmp/p1.png",
            ]
        );
    }

    #[test]
    fn custom_media_is_expressed_in_millimetres() {
        assert_eq!(media_name(PageSize::new(100_000, 150_000)), "Custom.100.0x150.0mm");
        assert_eq!(media_name(PageSize::A4), "A4");
    }

    #[test]
    fn shell_arguments_target_named_device() {
        let file = Path::new("C:\\spool\\p1.png");
        let named = PrintOptions::default().for_device(Some("Office"));
        assert_eq!(
            shell_arguments(&named, file),
            vec!["/pt", "C:\\spool\\p1.png", "Office"]
        );
        assert_eq!(
            shell_arguments(&PrintOptions::default(), file),
            vec!["/p", "C:\\spool\\p1.png"]
        );
    }

    #[test]
    fn directory_delivery_keeps_pages() {
        let dir = tempdir().unwrap();
        let adapter = SystemAdapter::from_spool_dir(Some(dir.path().join("out")));
        let mut job = adapter.begin_job(&PrintOptions::default()).unwrap();
        job.submit_page(SpoolPage {
            job_id: PrintJobId::new(),
            page_number: 1,
            page: blank_page(),
        })
        .unwrap();
        job.finish().unwrap();

        let written: Vec<_> = fs::read_dir(dir.path().join("out")).unwrap().collect();
        assert_eq!(written.len(), 1);
    }

    #[test]
    fn missing_spooler_is_a_launch_error() {
        let dir = tempdir().unwrap();
        let adapter = SystemAdapter::new(
            Delivery::Cups {
                program: "lasoprinter-no-such-spooler".into(),
            },
            dir.path(),
        );
        let mut job = adapter.begin_job(&PrintOptions::default()).unwrap();
        job.submit_page(SpoolPage {
            job_id: PrintJobId::new(),
            page_number: 1,
            page: blank_page(),
        })
        .unwrap();
        let err = job.finish().unwrap_err();
        assert!(matches!(err, SpoolError::Launch { .. }));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn mock_adapter_records_abort_reason() {
        let adapter = MockPlatformAdapter::new();
        let handle = adapter.begin_job(&PrintOptions::default()).unwrap();
        handle.abort("user cancelled");

        let jobs = adapter.drain_jobs();
        assert_eq!(jobs.len(), 1);
        assert!(jobs[0].aborted);
        assert_eq!(jobs[0].abort_reason.as_deref(), Some("user cancelled"));
    }
}
