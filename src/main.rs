use std::path::PathBuf;

use clap::Parser;
use envoy_gateway::{start, Configuration};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    filter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    Layer, Registry,
};

pub enum Guard {
    Appender(WorkerGuard),
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct CommandArgs {
    /// YAML configuration, built-in defaults are used when absent.
    #[arg(short = 'c', long)]
    config_path: Option<PathBuf>,
}

fn init_tracing_logging() -> Guard {
    let file_appender = tracing_appender::rolling::never(".", "envoy-gateway.log");
    let (non_blocking_appender, guard) = tracing_appender::non_blocking(file_appender);
    let file_filter = tracing_subscriber::EnvFilter::new(std::env::var("RUST_FILE_LOG").unwrap_or_else(|_| "debug".to_owned()));
    let console_filter = tracing_subscriber::EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_owned()));

    let console_layer = fmt::layer()
        .event_format(fmt::format().compact())
        .with_target(true)
        .with_span_events(FmtSpan::NONE)
        .with_ansi(false)
        .with_filter(filter::filter_fn(|meta| !meta.is_span()))
        .with_filter(console_filter);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_appender)
        .with_span_events(FmtSpan::NONE)
        .with_target(true)
        .with_ansi(false)
        .with_filter(filter::filter_fn(|meta| !meta.is_span()))
        .with_filter(file_filter);

    Registry::default().with(console_layer).with(file_layer).init();
    Guard::Appender(guard)
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> envoy_gateway::Result<()> {
    let args = CommandArgs::parse();
    let _guard = init_tracing_logging();

    let configuration = Configuration::load(args.config_path.as_deref())
        .and_then(|configuration| configuration.validate().map(|()| configuration))
        .inspect_err(|e| error!("Invalid configuration {e}"))?;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutting down");
                signal.cancel();
            }
            Err(e) => warn!("Unable to listen for the shutdown signal {e}"),
        }
    });

    start(configuration, shutdown).await
}
