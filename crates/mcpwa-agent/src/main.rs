use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use mcpwa::{create_engine, WhatsApp};
use mcpwa_agent::logging::init_logging;
use mcpwa_agent::transport::transport_factory;
use mcpwa_agent::{Cli, GatewayServer, ServerOptions, TracingLogSink};
use tracing::{error, info};

fn main() -> ExitCode {
    let cli = Cli::parse();
    let log_dir = cli.log_dir();
    let _log_guard = match init_logging(cli.log_level.as_deref(), log_dir.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("mcpwa-agent: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "failed to build the async runtime");
            return ExitCode::FAILURE;
        }
    };
    let outcome = runtime.block_on(run(cli));
    // A pending read on standard input would otherwise hold the runtime open.
    runtime.shutdown_timeout(Duration::from_millis(500));

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            eprintln!("mcpwa-agent: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = cli
        .automation_config()
        .context("invalid automation settings")?;
    let vocabulary = cli.vocabulary().context("invalid filter aliases")?;
    let engine = create_engine(cli.target_app()).context("no accessibility engine")?;

    info!(
        transport = %cli.transport,
        bundle_id = %cli.bundle_id,
        "starting mcpwa-agent {}",
        env!("CARGO_PKG_VERSION")
    );
    let server = GatewayServer::new(
        WhatsApp::new(engine, config),
        transport_factory(cli.transport, cli.socket_path.clone()),
        ServerOptions {
            vocabulary,
            log_sink: Arc::new(TracingLogSink),
        },
    );
    server.start().await.context("failed to start the gateway")?;

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for ctrl-c")?;
            info!("interrupted");
        }
        _ = server.wait_stopped() => info!("transport closed"),
    }
    server.stop().await;
    Ok(())
}
