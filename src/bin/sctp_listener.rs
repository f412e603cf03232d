//! Receiver side of the bridge: SCTP in, loss accounting, UDP out.

use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use tokio::signal::unix::{SignalKind, signal};
use tracing::info;
use tracing_subscriber::EnvFilter;

use wfb_bridge::config::ListenerConfig;
use wfb_bridge::listener::Listener;
use wfb_bridge::shutdown::Shutdown;

const USAGE: &str = "\
Usage: sctp_listener [OPTIONS]
  --config <file>            key=value config file, applied before flags
  --port <port>              SCTP listen port (default 6600)
  --udp-port <port>          local UDP re-emit port (default 5600)
  --buffer-kb <KB>           socket buffer size (default 16)
  --rto-initial <ms>         initial retransmission timeout (default 2)
  --rto-min <ms>             minimum retransmission timeout (default 2)
  --rto-max <ms>             maximum retransmission timeout (default 10)
  --pr-sctp-ttl <ms>         partial-reliability lifetime (default 50)
  --delayed-ack-time <ms>    delayed ACK time (default 10)
  --max-attempts <n>         max INIT attempts, 0 = kernel default
  --heartbeat-interval <ms>  heartbeat interval, 0 = kernel default
  --stats-window <s>         rolling stats window (default 10)
  --report-interval <s>      stats report interval (default 2)
  --verbose                  log per-association detail and stats
  --help                     print this help";

fn parse_flag<T: FromStr>(flag: &str, value: Option<&String>) -> Result<T> {
    let value = value.with_context(|| format!("missing value for {flag}"))?;
    value
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid value for {flag}: {value}"))
}

fn parse_args(args: &[String]) -> Result<ListenerConfig> {
    let mut cfg = ListenerConfig::default();

    if let Some(pos) = args.iter().position(|a| a == "--config") {
        let path: &String = args.get(pos + 1).context("missing value for --config")?;
        cfg.apply_file(Path::new(path))?;
    }

    let mut it = args.iter();
    while let Some(flag) = it.next() {
        match flag.as_str() {
            "--config" => {
                it.next();
            }
            "--verbose" => cfg.verbose = true,
            "--port" => cfg.sctp_port = parse_flag(flag, it.next())?,
            "--udp-port" => cfg.udp_port = parse_flag(flag, it.next())?,
            "--buffer-kb" => cfg.buffer_kb = parse_flag(flag, it.next())?,
            "--rto-initial" => cfg.tuning.rto_initial_ms = parse_flag(flag, it.next())?,
            "--rto-min" => cfg.tuning.rto_min_ms = parse_flag(flag, it.next())?,
            "--rto-max" => cfg.tuning.rto_max_ms = parse_flag(flag, it.next())?,
            "--pr-sctp-ttl" => cfg.tuning.pr_ttl_ms = parse_flag(flag, it.next())?,
            "--delayed-ack-time" => cfg.tuning.delayed_ack_ms = parse_flag(flag, it.next())?,
            "--max-attempts" => cfg.tuning.max_init_attempts = parse_flag(flag, it.next())?,
            "--heartbeat-interval" => {
                cfg.tuning.heartbeat_interval_ms = parse_flag(flag, it.next())?
            }
            "--stats-window" => cfg.stats_window_secs = parse_flag(flag, it.next())?,
            "--report-interval" => cfg.report_interval_secs = parse_flag(flag, it.next())?,
            other => bail!("unknown argument: {other}\n{USAGE}"),
        }
    }
    Ok(cfg)
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "wfb_bridge=debug,sctp_listener=debug"
    } else {
        "wfb_bridge=info,sctp_listener=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "--help") {
        println!("{USAGE}");
        return Ok(());
    }
    let cfg = parse_args(&args)?;
    cfg.validate()?;
    init_tracing(cfg.verbose);

    let shutdown = Shutdown::new();
    {
        let shutdown = shutdown.clone();
        let mut term = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
            info!("shutdown signal received");
            shutdown.trigger();
        });
    }

    let listener = Listener::new(cfg, shutdown)?;
    let monitor = listener.monitor();
    let result = listener.run().await;

    info!(
        total_packets = monitor.total_packets(),
        total_bytes = monitor.total_bytes(),
        "listener exiting"
    );
    result
}
