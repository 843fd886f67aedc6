use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use taskwarden::{
    EventKind, ExecMode, Kwargs, Runnable, RunnableFn, Runtime, RuntimeConfig, Signal, StopFn,
    TaskBuilder, TaskError, TaskStatus,
};

fn sleeper(secs: u64) -> Arc<dyn Runnable> {
    RunnableFn::arc(move |_ctx: CancellationToken, _kw: Kwargs| async move {
        tokio::time::sleep(Duration::from_secs(secs)).await;
        Ok::<_, TaskError>(json!("done"))
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn lifecycle_reaches_completed_with_return_value() {
    let task = TaskBuilder::new("sleeper").runnable(sleeper(2)).build();
    assert_eq!(task.status(), TaskStatus::NotStarted);
    assert!(!task.is_alive());

    task.start();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(task.status(), TaskStatus::Running);
    assert!(task.is_alive());
    assert!(task.is_runnable());

    assert!(task.wait_finished(Duration::from_secs(3)).await);
    assert_eq!(task.status(), TaskStatus::Completed);
    assert_eq!(task.result().return_value, Some(json!("done")));
    assert!(task.record().pid.is_none());

    task.cleanup().await;
    assert!(!task.is_alive());

    task.start();
    assert_eq!(task.status(), TaskStatus::Running);
    assert!(task.result().return_value.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failures_are_captured_in_the_record() {
    let failing = TaskBuilder::new("failing")
        .runnable(RunnableFn::arc(|_ctx: CancellationToken, _kw: Kwargs| async move {
            Err::<Value, _>(TaskError::raise("ValueError", "bad input"))
        }))
        .build();
    failing.start();
    assert!(failing.wait_finished(Duration::from_secs(1)).await);

    let result = failing.result();
    assert_eq!(failing.status(), TaskStatus::Error);
    assert_eq!(result.exception_name.as_deref(), Some("ValueError"));
    assert_eq!(result.exception_desc.as_deref(), Some("bad input"));
    assert!(result.exception_stack.is_some());

    let panicking = TaskBuilder::new("panicking")
        .runnable(RunnableFn::arc(|_ctx: CancellationToken, _kw: Kwargs| async move {
            let explode = true;
            if explode {
                panic!("kaboom");
            }
            Ok::<Value, TaskError>(Value::Null)
        }))
        .build();
    panicking.start();
    assert!(panicking.wait_finished(Duration::from_secs(1)).await);
    assert_eq!(panicking.status(), TaskStatus::Error);
    assert_eq!(panicking.result().exception_name.as_deref(), Some("Panic"));
    assert_eq!(panicking.result().exception_desc.as_deref(), Some("kaboom"));

    // a captured backtrace, not the error's debug rendering
    let stack = panicking.result().exception_stack.unwrap_or_default();
    assert!(!stack.is_empty());
    assert!(!stack.contains("Panicked {"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn kwargs_reach_the_target() {
    let task = TaskBuilder::new("greeter")
        .kwarg("who", "ops")
        .runnable(RunnableFn::arc(|_ctx: CancellationToken, kw: Kwargs| async move {
            let who = kw.get("who").and_then(Value::as_str).unwrap_or("nobody").to_string();
            Ok::<_, TaskError>(json!(format!("hello {who}")))
        }))
        .build();
    task.start();
    assert!(task.wait_finished(Duration::from_secs(1)).await);
    assert_eq!(task.result().return_value, Some(json!("hello ops")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_hook_releases_a_blocking_target() {
    let release = Signal::new();
    let waiter = release.clone();
    let hook_signal = release.clone();

    let task = TaskBuilder::new("blocked")
        .runnable(RunnableFn::arc(move |_ctx: CancellationToken, _kw: Kwargs| {
            let waiter = waiter.clone();
            async move {
                waiter.wait().await;
                Ok::<_, TaskError>(json!("released"))
            }
        }))
        .stop_with(
            StopFn::arc(move |_kw: Kwargs| {
                let signal = hook_signal.clone();
                async move { signal.set() }
            }),
            Kwargs::new(),
        )
        .build();

    task.start();
    assert!(task.wait_started(Duration::from_secs(1)).await);
    task.stop().await;
    assert!(!task.is_runnable());

    assert!(task.wait_finished(Duration::from_secs(1)).await);
    assert_eq!(task.result().return_value, Some(json!("released")));
    task.cleanup().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_without_hook_cancels_the_token() {
    let task = TaskBuilder::new("cooperative")
        .runnable(RunnableFn::arc(|ctx: CancellationToken, _kw: Kwargs| async move {
            ctx.cancelled().await;
            Ok::<_, TaskError>(json!("cancelled"))
        }))
        .build();

    task.start();
    assert!(task.wait_started(Duration::from_secs(1)).await);
    task.stop().await;
    assert!(task.wait_finished(Duration::from_secs(1)).await);
    assert_eq!(task.status(), TaskStatus::Completed);
    assert_eq!(task.result().return_value, Some(json!("cancelled")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn mismatched_mode_is_a_no_op() {
    let task = TaskBuilder::new("mismatch")
        .runnable(sleeper(1))
        .mode(ExecMode::Process)
        .build();

    task.start();
    assert_eq!(task.status(), TaskStatus::NotStarted);
    assert!(!task.is_alive());

    let empty = TaskBuilder::new("").build();
    assert!(!empty.id().is_empty());
    empty.start();
    assert!(!empty.is_alive());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cleanup_detaches_a_run_that_outlives_its_bound() {
    let done = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&done);
    let task = TaskBuilder::new("stubborn")
        .runnable(RunnableFn::arc(move |_ctx: CancellationToken, _kw: Kwargs| {
            let counter = Arc::clone(&counter);
            async move {
                tokio::time::sleep(Duration::from_millis(500)).await;
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, TaskError>(json!("late"))
            }
        }))
        .timeouts(taskwarden::TaskTimeouts {
            thread_join: Duration::from_millis(100),
            process_join: Duration::from_millis(100),
        })
        .build();

    task.start();
    task.cleanup().await;
    assert!(!task.is_alive());
    assert_eq!(task.status(), TaskStatus::Running);

    assert!(task.wait_finished(Duration::from_secs(2)).await);
    assert_eq!(done.load(Ordering::SeqCst), 1);
    assert_eq!(task.status(), TaskStatus::Completed);
    assert_eq!(task.result().return_value, Some(json!("late")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn detached_run_does_not_overwrite_a_newer_run() {
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let task = TaskBuilder::new("overlap")
        .runnable(RunnableFn::arc(move |_ctx: CancellationToken, _kw: Kwargs| {
            let run = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                let ms = if run == 0 { 300 } else { 1500 };
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok::<_, TaskError>(json!(run))
            }
        }))
        .timeouts(taskwarden::TaskTimeouts {
            thread_join: Duration::from_millis(100),
            process_join: Duration::from_millis(100),
        })
        .build();

    task.start();
    task.cleanup().await;
    task.start();

    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(task.status(), TaskStatus::Running);
    assert!(task.result().return_value.is_none());

    assert!(task.wait_finished(Duration::from_secs(3)).await);
    assert_eq!(task.status(), TaskStatus::Completed);
    assert_eq!(task.result().return_value, Some(json!(1)));
    task.cleanup().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn runtime_tasks_publish_lifecycle_events() {
    let rt = Runtime::builder(RuntimeConfig::default()).build();
    let mut rx = rt.bus().subscribe();

    let task = rt.thread("evented", sleeper(0));
    task.start();
    assert!(task.wait_finished(Duration::from_secs(1)).await);

    let mut kinds = Vec::new();
    while kinds.len() < 2 {
        let ev = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        if ev.task.as_deref() == Some("evented") {
            kinds.push(ev.kind);
        }
    }
    assert_eq!(kinds, vec![EventKind::TaskStarting, EventKind::TaskCompleted]);

    rt.shutdown().await.unwrap();
}

#[cfg(unix)]
mod process {
    use taskwarden::CommandSpec;

    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn child_receives_kwargs_and_returns_stdout() {
        let task = TaskBuilder::new("echo")
            .command(CommandSpec::new("sh").args(["-c", "cat"]))
            .kwarg("x", 7)
            .build();
        assert_eq!(task.mode(), ExecMode::Process);

        task.start();
        assert!(task.wait_finished(Duration::from_secs(5)).await);
        assert_eq!(task.status(), TaskStatus::Completed);
        assert_eq!(task.result().return_value, Some(json!({"x": 7})));
        assert!(task.record().pid.is_some());
        task.cleanup().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn non_zero_exit_records_stderr() {
        let task = TaskBuilder::new("fail")
            .command(CommandSpec::new("sh").args(["-c", "echo nope >&2; exit 3"]))
            .build();

        task.start();
        assert!(task.wait_finished(Duration::from_secs(5)).await);
        let result = task.result();
        assert_eq!(task.status(), TaskStatus::Error);
        assert_eq!(result.exception_name.as_deref(), Some("ExitStatus"));
        assert_eq!(result.exception_stack.as_deref(), Some("nope"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stop_terminates_the_child() {
        let task = TaskBuilder::new("sleepy")
            .command(CommandSpec::new("sleep").arg("30"))
            .build();

        task.start();
        assert!(task.wait_started(Duration::from_secs(1)).await);
        tokio::time::sleep(Duration::from_millis(100)).await;
        task.stop().await;

        assert!(task.wait_finished(Duration::from_secs(5)).await);
        assert_eq!(task.status(), TaskStatus::Error);
        task.cleanup().await;
        assert!(!task.is_alive());
    }
}
