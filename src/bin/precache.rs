//! precache CLI - warms a disk cache from an asset manifest.
//!
//! Runs the install and activation phases against a local cache directory:
//! fetches every asset in the manifest into a fresh generation bucket and
//! prunes the buckets of earlier deployments.

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use swcache::{AssetList, CacheWorker, ClientRegistry, DiskStore, ReqwestNetwork};

struct CliConfig {
    manifest: PathBuf,
    cache_dir: PathBuf,
}

fn parse_args() -> Option<CliConfig> {
    let mut args = env::args().skip(1);
    let manifest = PathBuf::from(args.next()?);
    let cache_dir = args
        .next()
        .map_or_else(|| PathBuf::from("cache"), PathBuf::from);
    if args.next().is_some() {
        return None;
    }
    Some(CliConfig { manifest, cache_dir })
}

fn usage() {
    eprintln!("Usage: precache <manifest.toml> [cache-dir]");
    eprintln!();
    eprintln!("Fetches every asset in the manifest into a versioned cache");
    eprintln!("bucket under cache-dir (default: ./cache) and deletes the");
    eprintln!("buckets of earlier versions.");
}

async fn run(config: CliConfig) -> swcache::Result<()> {
    let assets = AssetList::load(&config.manifest)?;
    let version = assets.version.clone();
    let asset_count = assets.paths.len();

    let net = Arc::new(ReqwestNetwork::new(
        reqwest::Client::new(),
        assets.origin.clone(),
    ));
    let store = Arc::new(DiskStore::new(config.cache_dir));
    let worker = CacheWorker::new(assets, net, store);

    worker.install().await?;
    // no open pages here; claiming is a no-op, pruning is the point
    worker.activate(&ClientRegistry::new()).await?;

    println!("cached {asset_count} assets for generation {version}");
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    let Some(config) = parse_args() else {
        usage();
        return ExitCode::FAILURE;
    };

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("precache failed: {e}");
            ExitCode::FAILURE
        }
    }
}
