//! sockloop - A Lightweight Single-Threaded TCP Connection Server
//!
//! This is the main entry point for the sockloop server binary.
//! It parses the command line, sets up logging, and runs the event loop
//! with the bundled echo handler until a signal or a fault stops it.

use anyhow::Context;
use clap::Parser;
use sockloop::config::{FaultPolicy, ServerConfig};
use sockloop::connection::EchoHandler;
use sockloop::metrics::TimerMetrics;
use sockloop::server::EventLoop;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Command-line options
#[derive(Parser, Debug)]
#[command(name = "sockloop")]
#[command(version)]
#[command(about = "Single-threaded TCP echo server built on a readiness poll loop")]
struct Cli {
    /// Port to listen on (all interfaces)
    #[arg(short, long, default_value_t = sockloop::DEFAULT_PORT)]
    port: u16,

    /// Socket kind (stream)
    #[arg(long, default_value = "stream")]
    socket_kind: String,

    /// Transport protocol (ip, tcp, udp)
    #[arg(long, default_value = "tcp")]
    protocol: String,

    /// Seconds after accept before a connection is evicted
    #[arg(long, default_value_t = sockloop::DEFAULT_IDLE_TIMEOUT.as_secs())]
    idle_timeout: u64,

    /// Upper bound on a single readiness wait, in milliseconds
    #[arg(long, default_value_t = 1000)]
    poll_timeout_ms: u64,

    /// What to do on an unclassified handler failure (stop-server, close-connection)
    #[arg(long, default_value = "stop-server")]
    fault_policy: FaultPolicy,

    /// Log level when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    /// Builds the server configuration, validating kind and protocol.
    fn server_config(&self) -> anyhow::Result<ServerConfig> {
        let mut config = ServerConfig::new(self.port)
            .with_idle_timeout(Duration::from_secs(self.idle_timeout))
            .with_poll_timeout(Duration::from_millis(self.poll_timeout_ms))
            .with_fault_policy(self.fault_policy);

        config.set_socket_kind(&self.socket_kind)?;
        config.set_transport_protocol(&self.protocol)?;

        Ok(config)
    }
}

fn print_banner(config: &ServerConfig, bound: SocketAddr) {
    println!(
        r#"
sockloop v{} - Single-Threaded TCP Connection Server
──────────────────────────────────────────────────────────────
Listening on {} ({} / {})
Idle timeout: {}s

Use Ctrl+C to shutdown.
"#,
        sockloop::VERSION,
        bound,
        config.socket_kind,
        config.protocol,
        config.idle_timeout.as_secs()
    );
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .context("invalid log level")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    // Configuration errors stop us before any socket exists
    let config = cli.server_config().context("invalid configuration")?;

    let mut server = EventLoop::new(config, EchoHandler::new(), TimerMetrics::new())
        .context("failed to create event loop")?;
    server
        .shutdown_controller()
        .install_signal_handler()
        .context("failed to install signal handler")?;

    let bound = server
        .start_listening()
        .context("failed to start listening")?;
    print_banner(server.config(), bound);

    let outcome = server.run();

    let stats = server.stats();
    info!(
        accepted = stats.accepted(),
        evicted = stats.evicted(),
        closed = stats.closed(),
        "Connection totals"
    );
    server.metrics().log_metrics();

    match outcome {
        Ok(()) => {
            info!("Server shutdown complete");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Server stopped on failure");
            std::process::exit(1);
        }
    }
}
