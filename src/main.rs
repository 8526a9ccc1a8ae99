use std::{
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};

use clap::{Parser, Subcommand, ValueEnum};
use janitor::{
    config::JanitorConfig,
    health::{ProcessProbe, create_database},
    observability,
    orchestrator::{Maintenance, MaintenanceDeps, RunOptions, report_setup_failure},
    report::RunReport,
    retention,
    sinks::create_sinks,
    store::create_store,
};

const DEFAULT_CONFIG_PATH: &str = "janitor.toml";

#[derive(Parser, Debug)]
#[command(version, about = "Retention sweep and health report job", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to config file (defaults to ./janitor.toml if it exists,
    /// otherwise built-in defaults)
    #[arg(short, long, global = true)]
    config: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run maintenance once and print the report (default)
    Run {
        /// Decide and count without mutating the store
        #[arg(long)]
        dry_run: bool,
        /// Run key rotation regardless of the configured weekday
        #[arg(long)]
        force_rotation: bool,
        /// Report output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Parse and validate the configuration file, then exit
    CheckConfig,
    /// Print the effective record family table
    Families,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Json,
    Text,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match args.command {
        Some(Command::CheckConfig) => run_check_config(args.config.as_deref()),
        Some(Command::Families) => run_families(args.config.as_deref()),
        Some(Command::Run {
            dry_run,
            force_rotation,
            format,
        }) => {
            let options = RunOptions {
                dry_run,
                force_rotation,
            };
            run_maintenance(args.config.as_deref(), options, format).await
        }
        None => run_maintenance(args.config.as_deref(), RunOptions::default(), OutputFormat::Text).await,
    }
}

/// Load the configuration. An explicit path must exist; the default path
/// falls back to built-in defaults when absent.
fn load_config(explicit_config_path: Option<&str>) -> Result<(JanitorConfig, Option<PathBuf>), String> {
    let path = match explicit_config_path {
        Some(path) => PathBuf::from(path),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => PathBuf::from(DEFAULT_CONFIG_PATH),
        None => return Ok((JanitorConfig::default(), None)),
    };

    JanitorConfig::from_file(&path)
        .map(|config| (config, Some(path.clone())))
        .map_err(|e| format!("Failed to load config from {}: {}", path.display(), e))
}

fn run_check_config(explicit_config_path: Option<&str>) -> ExitCode {
    match load_config(explicit_config_path) {
        Ok((config, path)) => {
            let source = path
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "built-in defaults".to_string());
            println!("Configuration OK ({source})");
            println!("  store:    {}", config.store.backend_name());
            println!(
                "  families: {} enabled",
                retention::descriptors(&config.retention.periods).len()
            );
            println!("  dry run:  {}", config.retention.safety.dry_run);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run_families(explicit_config_path: Option<&str>) -> ExitCode {
    let config = match load_config(explicit_config_path) {
        Ok((config, _)) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    println!("{:<18} {:<20} {:<13} {:<8} EXPIRY", "FAMILY", "PATTERN", "POLICY", "ENABLED");
    for descriptor in retention::table(&config.retention.periods) {
        let policy = serde_json::to_value(descriptor.policy)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        let expiry = match descriptor.expiry {
            retention::Expiry::Timestamp { field, max_age } => {
                format!("{} older than {}s", field.name, max_age.as_secs())
            }
            retention::Expiry::NativeTtl {
                cap,
                clamp_existing,
            } => {
                let mode = if clamp_existing { "clamp" } else { "set if missing" };
                format!("ttl {}s ({mode})", cap.as_secs())
            }
        };
        println!(
            "{:<18} {:<20} {:<13} {:<8} {}",
            descriptor.family.as_str(),
            descriptor.pattern,
            policy,
            descriptor.is_enabled(),
            expiry
        );
    }
    ExitCode::SUCCESS
}

async fn run_maintenance(
    explicit_config_path: Option<&str>,
    options: RunOptions,
    format: OutputFormat,
) -> ExitCode {
    let (config, config_path) = match load_config(explicit_config_path) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = observability::init_tracing(&config.observability) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    tracing::info!(
        config_file = %config_path
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "built-in defaults".to_string()),
        "Configuration loaded"
    );

    let sinks = match create_sinks(&config.reporting) {
        Ok(sinks) => sinks,
        Err(e) => {
            tracing::error!(error = %e, "Failed to create report sinks");
            return ExitCode::FAILURE;
        }
    };
    let store = match create_store(&config.store) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!(error = %e, "Failed to create store client");
            let report = report_setup_failure(
                &config,
                options,
                &sinks,
                format!("Store client could not be created: {e}"),
            )
            .await;
            print_report(&report, format);
            return ExitCode::FAILURE;
        }
    };
    let deps = MaintenanceDeps {
        store,
        database: create_database(&config.database),
        liveness: Arc::new(ProcessProbe),
        sinks,
    };

    let maintenance = Maintenance::new(config, options, deps);
    let report = maintenance.run_once().await;
    maintenance.shutdown().await;

    print_report(&report, format);

    if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn print_report(report: &RunReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => match serde_json::to_string_pretty(report) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("Failed to serialize report: {e}"),
        },
        OutputFormat::Text => {
            println!("{}", report.render().body);
        }
    }
}
