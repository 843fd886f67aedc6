//! # Supervised worker
//!
//! A flaky worker fails every other run; a watchdog notices and restarts it.
//! Ctrl-C shuts everything down.
//!
//! ## Run
//! ```bash
//! cargo run --example supervised_worker --features "logging"
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::json;
use taskwarden::{
    Kwargs, LogWriter, LoggerConfig, RunnableFn, Runtime, RuntimeConfig, TaskError, logger_init,
};
use tokio_util::sync::CancellationToken;

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> anyhow::Result<()> {
    logger_init(&LoggerConfig {
        level: "info,taskwarden=debug".into(),
        ..LoggerConfig::default()
    })?;

    let rt = Runtime::builder(RuntimeConfig::default())
        .with_subscriber(Arc::new(LogWriter::new()))
        .build();
    let watchdog = rt.watchdog(Duration::from_secs(1))?;

    let attempts = Arc::new(AtomicUsize::new(0));
    let worker = rt.thread(
        "flaky",
        RunnableFn::arc(move |ctx: CancellationToken, _kw: Kwargs| {
            let attempts = Arc::clone(&attempts);
            async move {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                println!("{:>6}[flaky] attempt {attempt}", "");

                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(1500)) => {}
                    _ = ctx.cancelled() => return Ok(json!("stopped")),
                }
                if attempt % 2 == 1 {
                    return Err(TaskError::raise("IoError", "upstream went away"));
                }
                Ok(json!({ "attempt": attempt }))
            }
        }),
    );
    watchdog.register(worker, "flaky")?;

    println!("running; press Ctrl-C to stop");
    rt.run_until_signal().await?;
    Ok(())
}
