use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use serde_json::json;
use tokio::io::AsyncReadExt;
use tracing::info;
use tracing_subscriber::EnvFilter;

use triton_common::{ExternalStore, FileSink, LocalSink, Locator, MemorySink, StagedBlob};
use triton_store::backend;
use triton_store::{BackendKind, SimpleHttpStore, StoreConfig, TritonStoreManager};

const USAGE: &str = "usage: triton-store [--config PATH] <put FILE | get LOCATOR [OUT] | rm LOCATOR>";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let config = if args.first().map(|s| s.as_str()) == Some("--config") {
        if args.len() < 2 {
            bail!(USAGE);
        }
        let path = PathBuf::from(args.remove(1));
        args.remove(0);
        StoreConfig::load(&path)?
    } else if let Ok(path) = std::env::var("TRITON_CONFIG") {
        StoreConfig::load(Path::new(&path))?
    } else {
        StoreConfig::from_env()?
    };

    let args: Vec<&str> = args.iter().map(|s| s.as_str()).collect();
    match args.as_slice() {
        ["put", file] => put(&config, Path::new(file)).await,
        ["get", locator] => get(&config, locator, None).await,
        ["get", locator, out] => get(&config, locator, Some(Path::new(out))).await,
        ["rm", locator] => remove(&config, locator).await,
        _ => bail!(USAGE),
    }
}

async fn local_sink(config: &StoreConfig) -> anyhow::Result<Box<dyn LocalSink>> {
    match &config.staging_dir {
        Some(dir) => {
            let sink = FileSink::create(dir)
                .await
                .with_context(|| format!("Failed to create staging file in {}", dir.display()))?;
            Ok(Box::new(sink))
        }
        None => Ok(Box::new(MemorySink::new())),
    }
}

async fn put(config: &StoreConfig, path: &Path) -> anyhow::Result<()> {
    let mut file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut buf = vec![0u8; config.upload_buffer_size];
    let local = local_sink(config).await?;

    match config.backend {
        BackendKind::Triton => {
            let manager = TritonStoreManager::startup(config)?;
            let mut session = manager.upload_session(local);
            loop {
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                session.append(&buf[..n]).await.context("Upload append failed")?;
            }
            let result = session.finish().await.context("Failed to finish upload")?;
            commit(&manager, result.into_staged()).await
        }
        BackendKind::Raw => {
            let store = SimpleHttpStore::startup(config)?;
            let mut local = local;
            loop {
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                local.write(&buf[..n]).await?;
            }
            commit(&store, StagedBlob::new(local.finish().await?)).await
        }
    }
}

async fn commit(store: &dyn ExternalStore, staged: StagedBlob) -> anyhow::Result<()> {
    let locator = store
        .store_blob(&staged)
        .await
        .context("Failed to store blob")?;
    let size = staged.size();
    info!(locator = %locator, size, "Stored object");
    println!("{}", json!({ "locator": locator, "size": size }));

    staged.blob.discard().await?;
    Ok(())
}

async fn get(config: &StoreConfig, locator: &str, out: Option<&Path>) -> anyhow::Result<()> {
    let store = backend::from_config(config)?;
    let mut stream = store
        .read_stream_from_store(&Locator::new(locator))
        .await
        .with_context(|| format!("Failed to fetch {}", locator))?;

    let copied = match out {
        Some(path) => {
            let mut file = tokio::fs::File::create(path)
                .await
                .with_context(|| format!("Failed to create {}", path.display()))?;
            stream.copy_to(&mut file).await?
        }
        None => stream.copy_to(&mut tokio::io::stdout()).await?,
    };
    info!(locator, bytes = copied, "Fetched object");
    Ok(())
}

async fn remove(config: &StoreConfig, locator: &str) -> anyhow::Result<()> {
    let store = backend::from_config(config)?;
    store
        .delete_from_store(&Locator::new(locator))
        .await
        .with_context(|| format!("Failed to delete {}", locator))?;
    info!(locator, "Deleted object");
    Ok(())
}
