use std::path::Path;

use flexi_logger::{
    detailed_format, Cleanup, Criterion, Duplicate, FileSpec, FlexiLoggerError, Logger,
    LoggerHandle, Naming,
};

const LOG_BASENAME: &str = "lasoprinter";
const ROTATE_BYTES: u64 = 10 * 1024 * 1024;
const KEEP_FILES: usize = 3;

/// 常駐模式：寫入輪替的記錄檔。 / Host mode: rotating log files under `log_dir`.
///
/// `RUST_LOG` wins over `level` when set.
pub fn init_host_logging(
    level: &str,
    log_dir: &Path,
    duplicate_to_stderr: bool,
) -> Result<LoggerHandle, FlexiLoggerError> {
    let file_spec = FileSpec::default()
        .directory(log_dir)
        .basename(LOG_BASENAME);

    Logger::try_with_env_or_str(level)?
        .log_to_file(file_spec)
        .format_for_files(detailed_format)
        .rotate(
            Criterion::Size(ROTATE_BYTES),
            Naming::Timestamps,
            Cleanup::KeepLogFiles(KEEP_FILES),
        )
        .duplicate_to_stderr(if duplicate_to_stderr {
            Duplicate::Info
        } else {
            Duplicate::None
        })
        .start()
}

/// 單次指令：僅輸出至標準錯誤。 / One-shot commands log to stderr only.
pub fn init_console_logging(level: &str) -> Result<LoggerHandle, FlexiLoggerError> {
    Logger::try_with_env_or_str(level)?.log_to_stderr().start()
}
