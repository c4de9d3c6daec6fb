//! Polling pool of `sh` workers with events rendered through `tracing`.
//!
//! ```text
//! RUST_LOG=poolvisor=debug cargo run --example echo_pool --features logging
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use poolvisor::{
    CommandFactory, LogWriter, ManagerConfig, PoolManager, PoolOptions, Subscribe,
};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const WORKER: &str = r#"while read line; do echo "$POOL_SLOT_NAME handled $line" >&2; echo "$POOL_SLOT_NAME"; done"#;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("poolvisor=info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let mgr = PoolManager::builder(ManagerConfig::default())
        .with_subscribers(subs)
        .build();

    let factory = Arc::new(CommandFactory::new("sh").arg("-c").arg(WORKER));
    let opts = PoolOptions::polling().with_tick(Duration::from_millis(20));
    mgr.add_process_pools("echo", factory, 3, opts)
        .await
        .context("starting echo pool")?;

    for job in 0..10 {
        mgr.write_by_polling("echo", format!("job-{job}\n")).await;
    }
    while mgr.queued("echo").await.unwrap_or(0) > 0 {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    mgr.reboot("echo", 2).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    for info in mgr.slots("echo").await {
        println!("{} pid={} state={:?}", info.name, info.pid, info.state);
    }
    Ok(())
}
