use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use moosync::config::Config;
use moosync::entities::EntityKind;
use moosync::notice::{Notifier, Severity};
use moosync::remote::{RemoteService, RestClient};
use moosync::store::OfflineStore;
use moosync::sync::SyncEngine;

#[derive(Parser, Debug)]
#[command(name = "moosync")]
#[command(about = "Offline-first sync engine for the Moo Insights farm & shop manager")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/moosync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Log filter, e.g. warn or moosync=debug
  #[arg(long, default_value = "warn")]
  log_level: String,

  /// Also write logs to daily-rotated files in this directory
  #[arg(long)]
  log_dir: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Show cached record counts and the pending sync queue depth
  Status,
  /// List pending sync queue entries
  Queue,
  /// Replay pending mutations against the remote service now
  Sync,
  /// Refresh the local cache from the remote service, every table
  Pull,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = init_tracing(&args);

  let config = Config::load(args.config.as_deref())?;
  let store = Arc::new(match &config.store_path {
    Some(path) => OfflineStore::open_at(path)?,
    None => OfflineStore::open()?,
  });

  match args.command {
    Command::Status => status(&store),
    Command::Queue => queue(&store),
    Command::Sync => sync(&config, store).await,
    Command::Pull => pull(&config, store).await,
  }
}

fn init_tracing(args: &Args) -> Option<tracing_appender::non_blocking::WorkerGuard> {
  let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
  let stderr_layer = tracing_subscriber::fmt::layer()
    .with_writer(std::io::stderr)
    .with_target(false);

  match &args.log_dir {
    Some(dir) => {
      let appender = tracing_appender::rolling::daily(dir, "moosync.log");
      let (writer, guard) = tracing_appender::non_blocking(appender);
      let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false);
      tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
      Some(guard)
    }
    None => {
      tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .init();
      None
    }
  }
}

fn status(store: &OfflineStore) -> Result<()> {
  println!("pending sync queue: {}", store.pending_sync_count()?);
  println!();
  for (kind, count) in store.record_counts()? {
    println!("{:<24} {count}", kind.table_name());
  }
  Ok(())
}

fn queue(store: &OfflineStore) -> Result<()> {
  let entries = store.get_sync_queue()?;
  if entries.is_empty() {
    println!("sync queue is empty");
    return Ok(());
  }
  for entry in entries {
    println!(
      "#{:<5} {:<6} {:<24} {}",
      entry.id, entry.operation, entry.table, entry.timestamp
    );
  }
  Ok(())
}

async fn sync(config: &Config, store: Arc<OfflineStore>) -> Result<()> {
  let remote = build_remote(config)?;
  let notices = Notifier::new();
  let mut rx = notices.subscribe();
  let engine = SyncEngine::new(store, remote, notices);

  let report = engine.replay_pending().await;
  while let Ok(notice) = rx.try_recv() {
    let tag = match notice.severity {
      Severity::Info => "info",
      Severity::Warning => "warn",
      Severity::Error => "error",
    };
    println!("[{tag}] {}: {}", notice.title, notice.body);
  }
  match &report.failure {
    Some(failure) => println!(
      "aborted after {} of {} entries: {failure}",
      report.replayed,
      report.replayed + report.pending
    ),
    None => println!("replayed {} pending mutations", report.replayed),
  }
  Ok(())
}

async fn pull(config: &Config, store: Arc<OfflineStore>) -> Result<()> {
  let remote = build_remote(config)?;
  for kind in EntityKind::ALL {
    let rows = remote.select_all(kind).await?;
    store.save_raw(kind, &rows)?;
    println!("{:<24} {} records", kind.table_name(), rows.len());
  }
  Ok(())
}

fn build_remote(config: &Config) -> Result<Arc<dyn RemoteService>> {
  let url = config.remote_url()?;
  let api_key = Config::api_key()?;
  Ok(Arc::new(RestClient::new(url, api_key)?))
}
