//! httpd — static file server
//!
//! One epoll reactor thread performs all socket I/O; a fixed pool of
//! worker threads parses requests and builds responses. Serves `GET`
//! for files below a single document root, with keep-alive.
//!
//! Usage:
//!     ./target/release/httpd [PORT] [--port 8080] [--dir ./resources]
//!                            [--workers 8] [--max-requests 10000] [--max-conns 65535]
//!
//! Every option also has an `HTTPD_*` environment variable; flags win.
//! Logging is controlled with `HTTPD_LOG` (an `EnvFilter` directive,
//! default `info`).
//!
//! Benchmark:
//!     wrk -t4 -c100 -d10s http://127.0.0.1:8080/index.html

use anyhow::{bail, Context, Result};
use httpd_core::env::env_get_str;
use httpd_runtime::{signal, Reactor, ServerConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "\
usage: httpd [PORT] [options]

options:
  -p, --port <N>          listen port (HTTPD_PORT)
  -d, --dir <PATH>        document root (HTTPD_DOC_ROOT)
  -t, --workers <N>       worker threads (HTTPD_WORKERS)
      --max-requests <N>  work queue capacity (HTTPD_MAX_REQUESTS)
      --max-conns <N>     live connection limit (HTTPD_MAX_CONNECTIONS)
  -h, --help              print this help";

fn init_tracing() {
    let filter = EnvFilter::try_new(env_get_str("HTTPD_LOG", "info"))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .with_target(false)
        .init();
}

/// Apply command-line flags on top of the environment-derived config.
///
/// Returns `None` when help was requested.
fn parse_args(args: &[String], mut config: ServerConfig) -> Result<Option<ServerConfig>> {
    let mut it = args.iter();
    while let Some(arg) = it.next() {
        let flag = arg.as_str();
        let mut value = || {
            it.next()
                .cloned()
                .with_context(|| format!("{} requires a value", flag))
        };
        config = match flag {
            "--port" | "-p" => config.port(value()?.parse().context("invalid --port")?),
            "--dir" | "-d" => config.doc_root(value()?),
            "--workers" | "-t" => {
                config.num_workers(value()?.parse().context("invalid --workers")?)
            }
            "--max-requests" => {
                config.max_requests(value()?.parse().context("invalid --max-requests")?)
            }
            "--max-conns" => {
                config.max_connections(value()?.parse().context("invalid --max-conns")?)
            }
            "--help" | "-h" => return Ok(None),
            s if s.parse::<u16>().is_ok() => config.port(s.parse()?),
            other => bail!("unknown argument '{}'\n\n{}", other, USAGE),
        };
    }
    Ok(Some(config))
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(config) = parse_args(&args, ServerConfig::from_env())? else {
        println!("{}", USAGE);
        return Ok(());
    };

    init_tracing();
    config.validate().context("invalid configuration")?;
    config.log();

    signal::ignore_sigpipe().context("failed to ignore SIGPIPE")?;
    let mut reactor = Reactor::new(config).context("failed to start server")?;
    signal::install_shutdown_handler(&reactor.shutdown_handle())
        .context("failed to install signal handlers")?;

    reactor.run().context("event loop failed")?;
    info!(live = reactor.live_connections(), "server stopped");
    Ok(())
}
