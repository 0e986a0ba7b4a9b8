use clap::Parser;
use huginn_net_probe::{Database, HuginnNetProbe, ProbeConfig, RawSocketTransport};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Target IPv4 address
    #[arg(short = 't', long)]
    target: Ipv4Addr,

    /// A TCP port known to be open on the target
    #[arg(short = 'o', long = "open-port")]
    open_port: u16,

    /// A TCP port known to be closed on the target
    #[arg(short = 'c', long = "closed-port")]
    closed_port: u16,

    /// Signature table to use instead of the bundled one
    #[arg(short = 'd', long)]
    database: Option<String>,

    /// Seconds to wait for each reply
    #[arg(long = "reply-timeout", default_value_t = 3)]
    reply_timeout: u64,

    /// Log file path
    #[arg(short = 'l', long = "log-file")]
    log_file: Option<String>,
}

fn initialize_logging(log_file: Option<String>) {
    let console_writer = std::io::stdout.with_max_level(tracing::Level::INFO);

    let file_appender = RollingFileAppender::new(
        Rotation::NEVER,
        ".",
        log_file.unwrap_or_else(|| "fingerprint.log".to_string()),
    )
    .with_max_level(tracing::Level::DEBUG);

    let subscriber = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(console_writer.and(file_appender))
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set subscriber: {e}");
        std::process::exit(1);
    }
}

fn load_database(path: Option<&str>) -> Result<Database, String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read {path}: {e}"))?
            .parse()
            .map_err(|e| format!("cannot parse {path}: {e}")),
        None => Database::load_default().map_err(|e| e.to_string()),
    }
}

fn main() {
    let args = Args::parse();
    initialize_logging(args.log_file);

    let cancel_signal = Arc::new(AtomicBool::new(false));
    let ctrl_c_signal = cancel_signal.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received signal, initiating graceful shutdown...");
        ctrl_c_signal.store(true, Ordering::Relaxed);
    }) {
        error!("Error setting signal handler: {e}");
        return;
    }

    let db = match load_database(args.database.as_deref()) {
        Ok(db) => db,
        Err(e) => {
            error!("Failed to load database: {}", e);
            return;
        }
    };
    info!("Loaded {} signatures", db.len());

    let config = ProbeConfig::default()
        .with_reply_timeout(Duration::from_secs(args.reply_timeout))
        .with_join_timeout(Duration::from_secs(args.reply_timeout.max(1) * 4));

    let transport = match RawSocketTransport::for_target(args.target, &config) {
        Ok(transport) => transport,
        Err(e) => {
            error!("Failed to set up transport: {}", e);
            return;
        }
    };
    info!("Probing {} from {}", args.target, transport.source());

    let engine = match HuginnNetProbe::with_config(Arc::new(transport), Some(&db), config) {
        Ok(engine) => engine.with_cancel_signal(cancel_signal),
        Err(e) => {
            error!("Failed to create HuginnNetProbe: {}", e);
            return;
        }
    };

    match engine.fingerprint(args.target, args.open_port, args.closed_port) {
        Ok(result) => info!("{}", result),
        Err(e) => error!("Fingerprint failed: {}", e),
    }
}
