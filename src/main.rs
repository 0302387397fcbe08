use clap::Parser;
use logship::Pipeline;
use logship_core::config::Config;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "logship", about = "Tail an access log and ship it to InfluxDB")]
struct Cli {
    /// Access log to tail.
    #[arg(long)]
    path: Option<PathBuf>,

    /// Sink connection string: address@user@password@db@precision.
    #[arg(long = "influx-dsn")]
    influx_dsn: Option<String>,

    /// Config file (default: $XDG_CONFIG_HOME/logship/config.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    parser_workers: Option<usize>,

    #[arg(long)]
    writer_workers: Option<usize>,

    /// Status endpoint address, e.g. 127.0.0.1:9193.
    #[arg(long)]
    monitor_listen: Option<SocketAddr>,

    /// Log at debug level.
    #[arg(long)]
    debug: bool,

    /// Append logs to this file instead of stderr.
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Cli {
    fn apply(&self, cfg: &mut Config) {
        if let Some(path) = &self.path {
            cfg.input.path = path.clone();
        }
        if let Some(dsn) = &self.influx_dsn {
            cfg.sink.dsn = dsn.clone();
        }
        if let Some(n) = self.parser_workers {
            cfg.pipeline.parser_workers = n;
        }
        if let Some(n) = self.writer_workers {
            cfg.pipeline.writer_workers = n;
        }
        if let Some(addr) = self.monitor_listen {
            cfg.monitor.listen = addr;
        }
    }
}

fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    let default_level = if cli.debug { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_env("RUST_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    match &cli.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            tracing_subscriber::fmt()
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false)
                .with_env_filter(filter)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_env_filter(filter)
                .init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    let mut cfg = Config::load(cli.config.as_deref())?;
    cli.apply(&mut cfg);

    // `prepare` validates, now that every layer and flag is applied.
    let pipeline = Pipeline::prepare(cfg).await?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("interrupt received");
                on_signal.cancel();
            }
            Err(e) => tracing::warn!(error = %e, "cannot listen for Ctrl-C"),
        }
    });

    let report = pipeline.run(cancel).await?;
    tracing::info!(?report, "done");
    Ok(())
}
