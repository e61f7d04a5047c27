//! URL scheme registration with the operating system.
//! 向作業系統註冊 URL scheme。
//!
//! Registration runs on every launch and is idempotent; a failure is only logged.
//! Linux gets a hidden `.desktop` entry made the default `x-scheme-handler`, Windows
//! gets the per-user `HKCU\Software\Classes\<scheme>` keys, and on macOS the bundle's
//! `Info.plist` already declares the scheme.

use std::env;
use std::io;
use std::path::{Path, PathBuf};
#[cfg(any(target_os = "linux", target_os = "windows"))]
use std::process::Command;

use lasoprinter_settings::RunMode;
use log::{info, warn};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("failed to resolve current executable: {0}")]
    CurrentExe(#[source] io::Error),
    #[error("no user data directory available")]
    NoDataDir,
    #[error("failed to write {path}: {source}")]
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
    #[error("{program} failed: {stderr}")]
    Rejected { program: String, stderr: String },
}

/// 作業系統啟動處理程式時使用的指令。 / Command the OS runs to open a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl HandlerCommand {
    /// Development launches carry the mode and config path explicitly so the OS
    /// starts an identically configured process; production runs the bare executable.
    pub fn for_mode(program: PathBuf, mode: RunMode, config: Option<&Path>) -> Self {
        let mut args = Vec::new();
        if mode.is_development() {
            args.push("--mode".to_string());
            args.push(mode.to_string());
            if let Some(config) = config {
                args.push("--config".to_string());
                args.push(absolutize(config).display().to_string());
            }
        }
        Self { program, args }
    }

    pub fn current(mode: RunMode, config: Option<&Path>) -> Result<Self, RegistrationError> {
        let program = env::current_exe().map_err(RegistrationError::CurrentExe)?;
        Ok(Self::for_mode(program, mode, config))
    }
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

pub fn desktop_file_name(scheme: &str) -> String {
    format!("{scheme}-handler.desktop")
}

/// Renders the hidden desktop entry that declares the scheme handler.
pub fn desktop_entry(scheme: &str, command: &HandlerCommand) -> String {
    let mut exec = vec![quote_exec_arg(&command.program.display().to_string())];
    exec.extend(command.args.iter().map(|arg| quote_exec_arg(arg)));
    exec.push("%u".to_string());

    format!(
        "[Desktop Entry]\n\
         Type=Application\n\
         Name=lasoprinter\n\
         Comment=Silent image printing for {scheme} links\n\
         Exec={exec}\n\
         Terminal=false\n\
         NoDisplay=true\n\
         MimeType=x-scheme-handler/{scheme};\n",
        exec = exec.join(" ")
    )
}

// Desktop entry Exec quoting: reserved characters force double quotes, inside
// which `"`, `` ` ``, `$` and `\` are backslash-escaped.
fn quote_exec_arg(arg: &str) -> String {
    const RESERVED: &[char] = &[
        ' ', '\t', '\n', '"', '\'', '\\', '>', '<', '~', '|', '&', ';', '$', '*', '?', '#', '(',
        ')', '`',
    ];
    if !arg.is_empty() && !arg.contains(RESERVED) {
        return arg.replace('%', "%%");
    }
    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    for ch in arg.chars() {
        match ch {
            '"' | '`' | '$' | '\\' => {
                quoted.push('\\');
                quoted.push(ch);
            }
            '%' => quoted.push_str("%%"),
            _ => quoted.push(ch),
        }
    }
    quoted.push('"');
    quoted
}

/// `reg add` invocations registering the scheme under the current user.
/// 於目前使用者下註冊 scheme 的 `reg add` 參數。
pub fn windows_registry_commands(scheme: &str, command: &HandlerCommand) -> Vec<Vec<String>> {
    let root = format!(r"HKCU\Software\Classes\{scheme}");
    let mut line = vec![quote_windows_arg(&command.program.display().to_string())];
    line.extend(command.args.iter().map(|arg| quote_windows_arg(arg)));
    line.push("\"%1\"".to_string());

    let add = |key: String, value: Option<&str>, data: String| {
        let mut args = vec!["add".to_string(), key];
        match value {
            Some(name) => {
                args.push("/v".to_string());
                args.push(name.to_string());
            }
            None => args.push("/ve".to_string()),
        }
        args.extend(["/t", "REG_SZ", "/d"].map(String::from));
        args.push(data);
        args.push("/f".to_string());
        args
    };

    vec![
        add(root.clone(), None, format!("URL:{scheme} protocol")),
        add(root.clone(), Some("URL Protocol"), String::new()),
        add(format!(r"{root}\shell\open\command"), None, line.join(" ")),
    ]
}

fn quote_windows_arg(arg: &str) -> String {
    format!("\"{}\"", arg.replace('"', "\\\""))
}

/// 註冊 URL scheme 的元件。 / Registers this executable as the scheme handler.
#[derive(Debug, Clone)]
pub struct ProtocolRegistrar {
    scheme: String,
    command: HandlerCommand,
}

impl ProtocolRegistrar {
    pub fn new(scheme: impl Into<String>, command: HandlerCommand) -> Self {
        Self {
            scheme: scheme.into(),
            command,
        }
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn command(&self) -> &HandlerCommand {
        &self.command
    }

    /// Fire-and-forget variant used at startup.
    pub fn register_or_warn(&self) {
        if let Err(err) = self.register() {
            warn!("could not register {}:// handler: {err}", self.scheme);
        }
    }

    #[cfg(target_os = "linux")]
    pub fn register(&self) -> Result<(), RegistrationError> {
        let dir = dirs::data_dir()
            .ok_or(RegistrationError::NoDataDir)?
            .join("applications");
        self.register_in(&dir)?;

        let file_name = desktop_file_name(&self.scheme);
        let mime = format!("x-scheme-handler/{}", self.scheme);
        run_tool("xdg-mime", &["default", file_name.as_str(), mime.as_str()])?;
        info!("registered {}:// handler via {}", self.scheme, file_name);
        Ok(())
    }

    #[cfg(target_os = "windows")]
    pub fn register(&self) -> Result<(), RegistrationError> {
        for args in windows_registry_commands(&self.scheme, &self.command) {
            let args: Vec<&str> = args.iter().map(String::as_str).collect();
            run_tool("reg", &args)?;
        }
        info!("registered {}:// handler in HKCU", self.scheme);
        Ok(())
    }

    #[cfg(target_os = "macos")]
    pub fn register(&self) -> Result<(), RegistrationError> {
        info!(
            "{}:// handler is declared by the application bundle; skipping",
            self.scheme
        );
        Ok(())
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
    pub fn register(&self) -> Result<(), RegistrationError> {
        info!("no protocol registration on this platform");
        Ok(())
    }

    /// Writes the desktop entry into `applications_dir` and returns its path.
    pub fn register_in(&self, applications_dir: &Path) -> Result<PathBuf, RegistrationError> {
        std::fs::create_dir_all(applications_dir).map_err(|source| RegistrationError::Write {
            path: applications_dir.to_path_buf(),
            source,
        })?;
        let path = applications_dir.join(desktop_file_name(&self.scheme));
        std::fs::write(&path, desktop_entry(&self.scheme, &self.command)).map_err(|source| {
            RegistrationError::Write {
                path: path.clone(),
                source,
            }
        })?;
        Ok(path)
    }
}

#[cfg(any(target_os = "linux", target_os = "windows"))]
fn run_tool(program: &str, args: &[&str]) -> Result<(), RegistrationError> {
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|source| RegistrationError::Launch {
            program: program.to_string(),
            source,
        })?;
    if output.status.success() {
        Ok(())
    } else {
        Err(RegistrationError::Rejected {
            program: program.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}
