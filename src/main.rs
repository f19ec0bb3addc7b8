mod cache;
mod config;
mod event;
mod network;
#[cfg(test)]
mod testing;
mod worker;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cache::{CacheStore, SqliteStore};
use event::{Event, Reaction};
use network::{HttpFetcher, Request, RequestMode};
use worker::{CacheManager, CleanupReport, Population, PopulateReport};

#[derive(Parser, Debug)]
#[command(name = "sitecache")]
#[command(about = "Offline-capable request cache with versioned generations")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/sitecache/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Also write logs to a daily rolling file in this directory
  #[arg(long, global = true)]
  log_dir: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Install and activate the configured deployment
  Deploy,
  /// Bring the deployment up (installing only if needed), then serve one
  /// request through the cache
  Fetch {
    /// Site-relative path, query string allowed
    path: String,
    /// Treat the request as a top-level navigation
    #[arg(long)]
    navigate: bool,
    #[arg(long, default_value = "GET")]
    method: String,
    /// Simulate an unavailable network
    #[arg(long)]
    offline: bool,
  },
  /// List stored generations
  Generations,
}

fn init_logging(log_dir: Option<&Path>) -> Option<WorkerGuard> {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sitecache=info"));
  let stderr = fmt::layer().with_writer(std::io::stderr);

  match log_dir {
    Some(dir) => {
      let appender = tracing_appender::rolling::daily(dir, "sitecache.log");
      let (writer, guard) = tracing_appender::non_blocking(appender);
      tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(fmt::layer().with_ansi(false).with_writer(writer))
        .init();
      Some(guard)
    }
    None => {
      tracing_subscriber::registry().with(filter).with(stderr).init();
      None
    }
  }
}

fn print_reports(populated: &PopulateReport, cleaned: &CleanupReport) {
  match &populated.population {
    Population::Complete { entries } => {
      println!("installed {} ({} entries)", populated.generation, entries)
    }
    Population::Failed { reason } => {
      println!("installed {} (precache failed: {})", populated.generation, reason)
    }
  }
  for name in &cleaned.kept {
    println!("kept {}", name);
  }
  for name in &cleaned.deleted {
    println!("deleted {}", name);
  }
  for name in &cleaned.failed {
    println!("could not delete {}", name);
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = init_logging(args.log_dir.as_deref());

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;
  let store = Arc::new(SqliteStore::open(&config.database_path()?)?);

  match args.command {
    Command::Deploy => {
      let fetcher = Arc::new(HttpFetcher::new(config.origin.clone())?);
      let manager = CacheManager::new(&config, store, fetcher);
      let (populated, cleaned) = manager.deploy().await?;
      print_reports(&populated, &cleaned);
    }
    Command::Fetch {
      path,
      navigate,
      method,
      offline,
    } => {
      let fetcher = Arc::new(HttpFetcher::new(config.origin.clone())?.with_offline(offline));
      let manager = CacheManager::new(&config, store, fetcher);
      manager.resume().await?;

      let url = config
        .origin
        .join(&path)
        .map_err(|e| eyre!("Invalid path {}: {}", path, e))?;
      let method = Method::from_bytes(method.to_uppercase().as_bytes())
        .map_err(|e| eyre!("Invalid method {}: {}", method, e))?;
      let mode = if navigate {
        RequestMode::Navigate
      } else {
        RequestMode::Subresource
      };
      let request = Request { method, url, mode };

      let reaction = manager.dispatch(&Event::Fetch(request)).await;
      manager.flush().await;

      let Reaction::Responded(response) = reaction? else {
        return Err(eyre!("fetch produced no response"));
      };

      let mut out = std::io::stdout().lock();
      writeln!(out, "HTTP {}", response.status)?;
      for (name, value) in &response.headers {
        writeln!(out, "{}: {}", name, value)?;
      }
      writeln!(out)?;
      out.write_all(&response.body)?;
      out.flush()?;
    }
    Command::Generations => {
      let current = [config.cache.static_name(), config.cache.data_name()];
      for info in store.generations()? {
        let marker = if current.contains(&info.name) { "*" } else { " " };
        println!("{} {} ({} entries)", marker, info.name, info.entries);
      }
    }
  }

  Ok(())
}
