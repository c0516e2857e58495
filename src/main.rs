//! Binary entrypoint: CLI flag handling, runtime bootstrap, and the
//! dual-listener (function + metrics) startup/shutdown sequence.

use clap::Parser;
use procwatch::{
    auth::Auth,
    config::Config,
    handler::{MetricsHandler, WatchdogHandler},
    limits::ReqLimits,
    lock,
    shutdown::{self, ShutdownSignal},
    state::{ConcurrencyLimiter, InFlight, ReadyState},
    Server,
};
use socket2::{Domain, Protocol, Socket, Type};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;

/// Turns a command-line executable into a network-addressable HTTP function.
#[derive(Parser, Debug)]
#[command(name = "procwatch", version)]
struct Cli {
    /// Runs a one-shot readiness probe against the lock file and exits;
    /// does not start a runtime or bind any socket.
    #[arg(long)]
    run_healthcheck: bool,
}

fn main() {
    let cli = Cli::parse();
    if cli.run_healthcheck {
        lock::run_healthcheck_mode();
    }

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = match Config::load() {
        Ok(config) => Arc::new(config),
        Err(err) => {
            tracing::error!(%err, "configuration error");
            std::process::exit(1);
        }
    };

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to start the tokio runtime")
        .block_on(run(config));
}

async fn run(config: Arc<Config>) {
    let ready = Arc::new(ReadyState::new());
    let in_flight = Arc::new(InFlight::new());
    let limiter = Arc::new(ConcurrencyLimiter::new(config.max_inflight));
    let auth = Arc::new(Auth::from_config(&config));

    let function_listener = match bind(config.port) {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(%err, port = config.port, "failed to bind the function listener");
            std::process::exit(1);
        }
    };
    let metrics_listener = match bind(config.metrics_port) {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(%err, port = config.metrics_port, "failed to bind the metrics listener");
            std::process::exit(1);
        }
    };

    let handler = WatchdogHandler::new(
        config.clone(),
        auth,
        ready.clone(),
        limiter,
        in_flight.clone(),
    );
    let function_server = Server::builder()
        .listener(function_listener)
        .handler(handler)
        .request_limits(ReqLimits::from_config(&config))
        .build();
    let metrics_server = Server::builder()
        .listener(metrics_listener)
        .handler(MetricsHandler)
        .build();

    let (signal, function_shutdown) = ShutdownSignal::new();
    let metrics_shutdown = function_shutdown.clone();

    if !config.suppress_lock {
        if let Err(err) = lock::create() {
            tracing::error!(%err, "failed to create the readiness lock file");
            std::process::exit(1);
        }
    }
    ready.set_ready();
    tracing::info!(port = config.port, metrics_port = config.metrics_port, fprocess = ?config.fprocess, "procwatch ready");

    let drain = shutdown::wait_for_signal_and_drain(config.clone(), ready, in_flight, signal);

    tokio::select! {
        _ = function_server.launch_until(function_shutdown) => {}
        _ = metrics_server.launch_until(metrics_shutdown) => {}
        _ = drain => {
            tracing::info!("shutdown sequence complete, exiting");
        }
    }
}

/// Binds a listener the way a long-lived service should: `SO_REUSEADDR` so a
/// restart during a TIME_WAIT window doesn't fail to bind, and `TCP_NODELAY`
/// since invocation responses are latency-sensitive and rarely benefit from
/// Nagle's batching.
fn bind(port: u16) -> std::io::Result<TcpListener> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();

    let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nodelay(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;

    TcpListener::from_std(socket.into())
}
