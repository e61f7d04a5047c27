mod logger;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use flexi_logger::LoggerHandle;
use lasoprinter_deeplink::parse_link;
use lasoprinter_host::{
    build_printer, print_request, HandlerCommand, HostExit, HostOptions, PrintRequest,
    ProtocolRegistrar,
};
use lasoprinter_settings::{default_config_path, default_log_dir, AppConfig, ConfigStore, RunMode};
use log::{info, warn};

#[derive(Parser)]
#[command(
    name = "lasoprinter",
    about = "Prints images silently when a lasoprinter:// link is opened",
    author,
    version
)]
struct Cli {
    /// 設定檔路徑。 / Path to config.json (defaults to the user config directory).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// 執行模式；預設讀取 LASOPRINTER_ENV。 / Run mode; defaults to LASOPRINTER_ENV.
    #[arg(long, global = true, value_enum)]
    mode: Option<ModeChoice>,

    #[command(subcommand)]
    command: Option<Commands>,

    /// 作業系統啟動時傳入的連結。 / Link handed over by the operating system.
    #[arg(value_name = "LINK")]
    link: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// 註冊 URL scheme 處理程式。 / Register the URL scheme handler and exit.
    Register,
    /// 顯示連結解析結果。 / Show how a link is parsed.
    Inspect {
        #[arg(value_name = "LINK")]
        link: String,
    },
    /// 直接靜默列印影像。 / Print image references silently, one after another.
    Print(PrintArgs),
}

#[derive(Args)]
struct PrintArgs {
    /// 目標印表機；預設使用系統預設印表機。 / Target printer (system default when omitted).
    #[arg(long, value_name = "NAME")]
    printer: Option<String>,

    /// 將頁面寫成 PNG 檔而不送往印表機。 / Write pages as PNG files instead of printing.
    #[arg(long, value_name = "DIR")]
    spool_dir: Option<PathBuf>,

    /// 影像路徑或 URI。 / Image paths or URIs.
    #[arg(required = true, value_name = "REF")]
    references: Vec<String>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeChoice {
    #[value(alias = "dev")]
    Development,
    #[value(alias = "prod")]
    Production,
}

impl From<ModeChoice> for RunMode {
    fn from(choice: ModeChoice) -> Self {
        match choice {
            ModeChoice::Development => RunMode::Development,
            ModeChoice::Production => RunMode::Production,
        }
    }
}

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let Cli {
        config,
        mode,
        command,
        link,
    } = Cli::parse();
    let mode = mode.map(RunMode::from).unwrap_or_else(RunMode::from_env);
    let config_path = config.or_else(default_config_path);
    let app_config = load_config(config_path.as_ref())?;

    match command {
        None => {
            let _logger = start_host_logging(&app_config, mode)?;
            execute_host(app_config, mode, config_path, link)
        }
        Some(command) => {
            let _logger = logger::init_console_logging(&app_config.log_level)
                .context("failed to start logging")?;
            match command {
                Commands::Register => execute_register(&app_config, mode, config_path),
                Commands::Inspect { link } => execute_inspect(&app_config, &link),
                Commands::Print(args) => execute_print(app_config, args),
            }
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<AppConfig> {
    match path {
        Some(path) => {
            let store = ConfigStore::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?;
            Ok(store.into_config())
        }
        None => Ok(AppConfig::default()),
    }
}

fn start_host_logging(config: &AppConfig, mode: RunMode) -> Result<LoggerHandle> {
    match default_log_dir() {
        Some(dir) => {
            logger::init_host_logging(&config.log_level, &dir, mode.is_development())
                .with_context(|| format!("failed to start logging in {}", dir.display()))
        }
        None => {
            logger::init_console_logging(&config.log_level).context("failed to start logging")
        }
    }
}

fn execute_host(
    config: AppConfig,
    mode: RunMode,
    config_path: Option<PathBuf>,
    link: Option<String>,
) -> Result<()> {
    let exit = lasoprinter_host::run(HostOptions {
        config,
        mode,
        config_path,
        initial_link: link,
        register_protocol: true,
    })
    .context("host failed")?;
    if exit == HostExit::Forwarded {
        info!("exiting after handing the launch to the running instance");
    }
    Ok(())
}

fn execute_register(
    config: &AppConfig,
    mode: RunMode,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let command = HandlerCommand::current(mode, config_path.as_deref())?;
    let registrar = ProtocolRegistrar::new(config.scheme.clone(), command);
    registrar
        .register()
        .with_context(|| format!("failed to register {}:// handler", config.scheme))?;
    println!("registered {}:// handler", config.scheme);
    Ok(())
}

fn execute_inspect(config: &AppConfig, link: &str) -> Result<()> {
    let parsed = parse_link(link, &config.scheme)?;
    println!("action: {}", parsed.action);
    if let Some(printer) = &parsed.printer {
        println!("printer: {printer}");
    }
    if parsed.images.is_empty() {
        println!("no images");
    }
    for image in &parsed.images {
        println!("{image}");
    }
    for segment in &parsed.undecodable {
        println!("skipped {segment}");
    }
    Ok(())
}

fn execute_print(mut config: AppConfig, args: PrintArgs) -> Result<()> {
    if args.spool_dir.is_some() {
        config.spool_dir = args.spool_dir;
    }
    let mut printer = build_printer(&config);
    let request = PrintRequest {
        images: args.references,
        printer: args.printer,
    };

    let report = print_request(&mut printer, &request);
    for (reference, result) in &report.outcomes {
        match result {
            Ok(()) => println!("printed {reference}"),
            Err(err) => println!("failed {reference}: {err}"),
        }
    }
    let failures = report.failure_count();
    if failures > 0 {
        warn!("{failures} of {} image(s) failed", request.images.len());
        bail!("{failures} image(s) failed to print");
    }
    Ok(())
}
