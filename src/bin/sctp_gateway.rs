//! Sender side of the bridge: UDP in, SCTP out.

use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::Ordering;

use anyhow::{Context, Result, bail};
use tokio::signal::unix::{SignalKind, signal};
use tracing::info;
use tracing_subscriber::EnvFilter;

use wfb_bridge::config::GatewayConfig;
use wfb_bridge::gateway::Gateway;
use wfb_bridge::shutdown::Shutdown;

const USAGE: &str = "\
Usage: sctp_gateway [OPTIONS]
  --config <file>            key=value config file, applied before flags
  --udp-port <port>          UDP ingress port (default 5600)
  --sctp-address <addr>      SCTP receiver address (default 10.5.0.1)
  --sctp-port <port>         SCTP receiver port (default 6600)
  --queue-capacity <slots>   relay queue slots (default 1024)
  --mtu <bytes>              per-slot buffer size (default 2048)
  --udp-buffer <KB>          UDP receive buffer (default 16)
  --sctp-buffer <KB>         SCTP send buffer (default 16)
  --rto-initial <ms>         initial retransmission timeout (default 2)
  --rto-min <ms>             minimum retransmission timeout (default 2)
  --rto-max <ms>             maximum retransmission timeout (default 10)
  --pr-ttl <ms>              partial-reliability lifetime (default 50)
  --delayed-ack-time <ms>    delayed ACK time (default 10)
  --max-attempts <n>         max INIT attempts, 0 = kernel default
  --heartbeat-interval <ms>  heartbeat interval, 0 = kernel default
  --verbose                  log state transitions and drops
  --help                     print this help";

fn parse_flag<T: FromStr>(flag: &str, value: Option<&String>) -> Result<T> {
    let value = value.with_context(|| format!("missing value for {flag}"))?;
    value
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid value for {flag}: {value}"))
}

fn parse_args(args: &[String]) -> Result<GatewayConfig> {
    let mut cfg = GatewayConfig::default();

    // The config file is applied first so flags override it, regardless of
    // argument order.
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
            "--udp-port" => cfg.udp_port = parse_flag(flag, it.next())?,
            "--sctp-address" => cfg.sctp_address = parse_flag(flag, it.next())?,
            "--sctp-port" => cfg.sctp_port = parse_flag(flag, it.next())?,
            "--queue-capacity" => cfg.queue_capacity = parse_flag(flag, it.next())?,
            "--mtu" => cfg.mtu = parse_flag(flag, it.next())?,
            "--udp-buffer" => cfg.udp_buffer_kb = parse_flag(flag, it.next())?,
            "--sctp-buffer" => cfg.sctp_buffer_kb = parse_flag(flag, it.next())?,
            "--rto-initial" => cfg.tuning.rto_initial_ms = parse_flag(flag, it.next())?,
            "--rto-min" => cfg.tuning.rto_min_ms = parse_flag(flag, it.next())?,
            "--rto-max" => cfg.tuning.rto_max_ms = parse_flag(flag, it.next())?,
            "--pr-ttl" => cfg.tuning.pr_ttl_ms = parse_flag(flag, it.next())?,
            "--delayed-ack-time" => cfg.tuning.delayed_ack_ms = parse_flag(flag, it.next())?,
            "--max-attempts" => cfg.tuning.max_init_attempts = parse_flag(flag, it.next())?,
            "--heartbeat-interval" => {
                cfg.tuning.heartbeat_interval_ms = parse_flag(flag, it.next())?
            }
            other => bail!("unknown argument: {other}\n{USAGE}"),
        }
    }
    Ok(cfg)
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "wfb_bridge=debug,sctp_gateway=debug"
    } else {
        "wfb_bridge=info,sctp_gateway=info"
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

    let gateway = Gateway::new(cfg, shutdown)?;
    let counters = gateway.counters();
    let queue = gateway.queue();
    let result = gateway.run().await;

    info!(
        received = counters.received.load(Ordering::Relaxed),
        forwarded = counters.forwarded.load(Ordering::Relaxed),
        dropped = queue.dropped(),
        reconnects = counters.reconnects.load(Ordering::Relaxed),
        "gateway exiting"
    );
    result
}
