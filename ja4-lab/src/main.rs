#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use ja4_lab_lib::capture::{ArtifactName, CaptureManager};
use ja4_lab_lib::config::{load_from_path, LabConfig, LoggingConfig};
use ja4_lab_lib::extraction::{discover_artifacts, write_ja4_results, SignatureExtractor};
use ja4_lab_lib::lifecycle::{ProxyTrafficDriver, SuiteRunner};
use ja4_lab_lib::runtime::{ContainerRuntime, DockerCompose};
use ja4_lab_lib::telemetry::{init_tracing, LogGuard};
use ja4_lab_lib::{LabError, Result};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Evaluate how TLS-intercepting proxies alter JA4 fingerprints")]
struct Cli {
    /// Path to configuration TOML file
    #[arg(short, long, value_name = "FILE", default_value = "config/lab.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every proxy and the versions it declares
    ListVersions,
    /// Test every proxy at every declared version
    TestAll,
    /// Test one proxy at one version
    Test {
        #[arg(long)]
        proxy: String,
        #[arg(long)]
        version: String,
    },
    /// Start or stop packet capture
    Capture {
        #[command(subcommand)]
        action: CaptureAction,
    },
    /// Extract JA4 signatures from capture files
    Extract {
        /// Directory scanned recursively for .pcap/.pcapng files
        /// Default: the configured captures directory
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,
        /// Output file
        /// Default: the configured ja4_results_file
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum CaptureAction {
    Start {
        /// Interface tcpdump listens on
        #[arg(long)]
        interface: Option<String>,
        /// Capture file name, or `auto` for a timestamped name
        #[arg(long, default_value = "auto")]
        output: String,
        /// Container to capture on (repeatable)
        #[arg(long = "target")]
        targets: Vec<String>,
    },
    Stop {
        /// Container to stop capturing on (repeatable); defaults to the recorded session
        #[arg(long = "target")]
        targets: Vec<String>,
    },
    /// Show the recorded capture session
    Status,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_from_path(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            let _guard = init_tracing(&LoggingConfig::default()).ok();
            error!(%err, path = %cli.config.display(), "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    let _guard: LogGuard = match init_tracing(&config.logging) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("failed to initialize logging: {err}");
            return ExitCode::FAILURE;
        }
    };
    info!(path = %cli.config.display(), proxies = config.proxies.len(), "configuration loaded");

    match run(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "command failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, config: LabConfig) -> Result<()> {
    let runtime: Arc<dyn ContainerRuntime> =
        Arc::new(DockerCompose::new(&config.project_root, &config.timeout));

    match command {
        Command::ListVersions => {
            for proxy in &config.proxies {
                println!("{} ({}): {}", proxy.id, proxy.name, proxy.versions.join(", "));
            }
            Ok(())
        }
        Command::TestAll => {
            let mut runner = suite(&config, runtime).await;
            let summary = runner.run_suite().await?;
            println!(
                "{} trials: {} succeeded, {} failed, {} errored, {} signatures",
                summary.total, summary.succeeded, summary.failed, summary.errored, summary.signatures
            );
            println!("results: {}", runner.store().path().display());
            Ok(())
        }
        Command::Test { proxy, version } => {
            let mut runner = suite(&config, runtime).await;
            let result = runner.run_single(&proxy, &version).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Command::Capture { action } => {
            let manager = CaptureManager::new(
                runtime,
                config.captures_dir(),
                &config.capture,
                config.timeout.settle(),
            );
            match action {
                CaptureAction::Start { interface, output, targets } => {
                    let targets = if !targets.is_empty() {
                        targets
                    } else if !config.capture.targets.is_empty() {
                        config.capture.targets.clone()
                    } else {
                        config.proxies.iter().map(|p| p.service().to_string()).collect()
                    };
                    let interface = interface.unwrap_or_else(|| config.capture.interface.clone());
                    let report =
                        manager.start(&targets, &interface, &ArtifactName::parse(&output)).await?;
                    for failure in &report.failed {
                        warn!(%failure, "target not capturing");
                    }
                    println!("capturing {} on {}", report.session.name, report.session.targets.join(", "));
                    Ok(())
                }
                CaptureAction::Stop { targets } => {
                    let report = manager.stop(&targets).await?;
                    if report.already_collected {
                        println!("no active capture");
                    }
                    for path in &report.artifacts {
                        println!("{}", path.display());
                    }
                    Ok(())
                }
                CaptureAction::Status => {
                    match manager.current_session() {
                        Some(session) => println!(
                            "{} {} on {}",
                            session.state.as_str(),
                            session.name,
                            session.targets.join(", ")
                        ),
                        None => println!("{}", manager.state().as_str()),
                    }
                    Ok(())
                }
            }
        }
        Command::Extract { dir, out } => {
            let dir = dir.unwrap_or_else(|| config.captures_dir());
            let out = out.unwrap_or_else(|| config.ja4_results_file());
            let artifacts = discover_artifacts(&dir)?;
            if artifacts.is_empty() {
                return Err(LabError::CaptureUnavailable(format!(
                    "no capture files under {}",
                    dir.display()
                )));
            }

            let extractor = SignatureExtractor::discover(
                &config.extraction,
                config.manifest_file(),
                config.timeout.command(),
            )
            .await?;
            let report = extractor.extract(&artifacts).await;
            if report.records.is_empty() {
                warn!(malformed = report.malformed, "no JA4 signatures found");
            }
            write_ja4_results(&out, &report.records)?;
            println!("{} signatures from {} files -> {}", report.records.len(), artifacts.len(), out.display());
            Ok(())
        }
    }
}

async fn suite(config: &LabConfig, runtime: Arc<dyn ContainerRuntime>) -> SuiteRunner {
    let traffic = Arc::new(ProxyTrafficDriver::new(&config.traffic, config.timeout.request()));
    SuiteRunner::from_config(config, runtime, traffic).await
}
