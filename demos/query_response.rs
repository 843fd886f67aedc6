//! # Query / response over queues
//!
//! A calculator task listens on its queue; the caller sends queries and reads the
//! correlated responses from its own queue.
//!
//! ## Run
//! ```bash
//! cargo run --example query_response
//! ```

use std::time::Duration;

use serde_json::{Value, json};
use taskwarden::{HandlerFn, Kwargs, MessageFrame, Runtime, RuntimeConfig, TaskBuilder, TaskError};

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> anyhow::Result<()> {
    let rt = Runtime::builder(RuntimeConfig::default()).build();

    let calculator = rt.queue_with(HandlerFn::arc(|frame: MessageFrame| async move {
        let numbers: Vec<i64> = frame
            .payload()
            .as_array()
            .map(|items| items.iter().filter_map(Value::as_i64).collect())
            .unwrap_or_default();
        if numbers.is_empty() {
            return Err(TaskError::raise("ValueError", "expected a list of integers"));
        }
        Ok(Some(json!({ "sum": numbers.iter().sum::<i64>() })))
    }));
    let host = rt.task(
        TaskBuilder::new("calculator")
            .runnable(calculator.as_runnable())
            .stop_with(calculator.as_stoppable(), Kwargs::new()),
    );
    host.start();

    let inbox = rt.queue();
    for batch in [json!([1, 2, 3]), json!([10, 20]), json!([7])] {
        let session = calculator.query(batch.clone(), Some(&inbox))?;
        let reply = inbox.get_frame(Some(Duration::from_secs(2))).await?;
        println!(
            "{batch} -> {} (session match: {})",
            reply.payload(),
            reply.session_id() == Some(session.as_str())
        );
    }

    host.stop().await;
    host.wait_finished(Duration::from_secs(2)).await;
    host.cleanup().await;
    println!("calculator finished: {}", host.status());

    rt.shutdown().await?;
    Ok(())
}
