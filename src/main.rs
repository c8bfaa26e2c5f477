//! Command-line entry point for the SVID helper.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use svid_helper::{HelperConfig, Mode, SvidHelper};

/// Fetches SPIFFE X.509 credentials from the SPIRE agent and writes them to
/// a directory as PEM files.
#[derive(Debug, Parser)]
#[command(name = "svid-helper", version, about)]
struct Args {
    /// Run mode: fetch once (init) or keep rotating (refresh).
    #[arg(long, env = "HELPER_MODE", value_enum, ignore_case = true)]
    mode: Mode,

    /// Directory to write svid.pem, svid-key.pem and bundle.pem into.
    #[arg(long, env = "HELPER_SVID_PATH")]
    svid_path: PathBuf,

    /// Workload API endpoint served by the SPIRE agent: a socket path,
    /// unix:// URI or tcp://IP:PORT.
    #[arg(
        long,
        env = "HELPER_WORKLOAD_API_SOCKET",
        default_value = "/var/run/spire/agent.sock"
    )]
    workload_api_socket: String,

    /// SPIFFE ID of the pod to fetch credentials for.
    #[arg(long, env = "HELPER_POD_SPIFFE_ID")]
    pod_spiffe_id: String,

    /// Seconds to wait for the one-shot fetch in init mode.
    #[arg(long, env = "HELPER_TIMEOUT", default_value_t = 5)]
    timeout: u64,

    /// Log filter, e.g. "info" or "svid_helper=debug".
    #[arg(long, env = "HELPER_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Args {
    fn into_config(self) -> Result<HelperConfig, Box<dyn std::error::Error>> {
        Ok(HelperConfig {
            mode: self.mode,
            endpoint: self.workload_api_socket.parse()?,
            svid_dir: self.svid_path,
            target_id: self.pod_spiffe_id.parse()?,
            init_timeout: Duration::from_secs(self.timeout),
        })
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&args.log_level))
        .with_writer(std::io::stderr)
        .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "helper failed");
            let mut source = e.source();
            while let Some(cause) = source {
                error!(cause = %cause, "caused by");
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = args.into_config()?;

    let cancel = CancellationToken::new();
    spawn_signal_listener(cancel.clone());

    SvidHelper::new(config).run(cancel).await?;
    Ok(())
}

/// Cancels the helper on SIGINT or SIGTERM, so a refresh sidecar shuts down
/// cleanly with the pod.
fn spawn_signal_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        match shutdown_signal().await {
            Ok(()) => {
                info!("shutdown signal received");
                cancel.cancel();
            }
            Err(e) => error!(error = %e, "unable to listen for shutdown signals"),
        }
    });
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = interrupt.recv() => {}
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
