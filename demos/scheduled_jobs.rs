//! # Scheduled jobs
//!
//! Runs a heartbeat every 2 seconds, a one-shot warm-up, and a daily report at
//! 03:00. Cancels the heartbeat after 7 seconds, then shuts down.
//!
//! ## Run
//! ```bash
//! cargo run --example scheduled_jobs --features "logging"
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use taskwarden::{
    Kwargs, LogWriter, LoggerConfig, RunnableFn, Runtime, RuntimeConfig, TaskError, logger_init,
};
use tokio_util::sync::CancellationToken;

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> anyhow::Result<()> {
    logger_init(&LoggerConfig::default())?;

    let rt = Runtime::builder(RuntimeConfig::default())
        .with_subscriber(Arc::new(LogWriter::new()))
        .build();
    let scheduler = rt.start_scheduler()?;

    let job = |name: &'static str| {
        rt.thread(
            name,
            RunnableFn::arc(move |_ctx: CancellationToken, _kw: Kwargs| async move {
                println!("{:>6}[{name}] fired", "");
                Ok::<_, TaskError>(json!(name))
            }),
        )
    };

    scheduler.every(2)?.seconds().run(job("heartbeat"))?;
    scheduler.once().run(job("warm-up"))?;
    scheduler.at("03:00")?.run(job("daily-report"))?;

    for key in scheduler.jobs() {
        println!("scheduled {key}");
    }

    tokio::time::sleep(Duration::from_secs(7)).await;
    let removed = scheduler.cancel("heartbeat")?;
    println!("cancelled {removed} heartbeat job(s); remaining: {:?}", scheduler.jobs());

    rt.shutdown().await?;
    Ok(())
}
