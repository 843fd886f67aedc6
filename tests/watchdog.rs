use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use taskwarden::{
    EventKind, Kwargs, RunnableFn, Runtime, RuntimeConfig, RuntimeError, StopFn, TaskBuilder,
    TaskError, TaskRef, TaskStatus, Watchdog,
};

fn idle(rt: &Runtime, id: &str) -> TaskRef {
    rt.thread(
        id,
        RunnableFn::arc(|ctx: CancellationToken, _kw: Kwargs| async move {
            ctx.cancelled().await;
            Ok::<_, TaskError>(json!("stopped"))
        }),
    )
}

async fn eventually(mut check: impl FnMut() -> bool, within: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn registered_task_is_started_and_watched() {
    let rt = Runtime::builder(RuntimeConfig::default()).build();
    let watchdog = rt.watchdog(Duration::from_millis(200)).unwrap();
    let task = idle(&rt, "svc");

    let label = watchdog.register(Arc::clone(&task), "svc").unwrap();
    assert_eq!(label, "svc");
    assert!(watchdog.contains("svc"));

    assert!(eventually(|| task.status() == TaskStatus::Running, Duration::from_secs(1)).await);
    assert!(eventually(|| watchdog.watched_labels() == vec!["svc".to_string()], Duration::from_secs(1)).await);
    assert!(watchdog.pending_start_labels().is_empty());
    assert!(Arc::ptr_eq(&watchdog.task("svc").unwrap(), &task));

    rt.shutdown().await.unwrap();
    assert!(!watchdog.is_running());
    assert!(!watchdog.contains("svc"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn exited_task_is_restarted_within_two_intervals() {
    let rt = Runtime::builder(RuntimeConfig::default()).build();
    let mut rx = rt.bus().subscribe();
    let interval = Duration::from_millis(200);
    let watchdog = rt.watchdog(interval).unwrap();

    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let task = rt.thread(
        "short",
        RunnableFn::arc(move |_ctx: CancellationToken, _kw: Kwargs| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok::<_, TaskError>(Value::Null)
            }
        }),
    );
    watchdog.register(task, "short").unwrap();

    assert!(eventually(|| runs.load(Ordering::SeqCst) >= 2, interval * 2 + Duration::from_millis(300)).await);

    let restarted = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match rx.recv().await {
                Ok(ev) if ev.kind == EventKind::TaskRestarted => break ev,
                Ok(_) => continue,
                Err(err) => panic!("bus closed: {err}"),
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(restarted.label.as_deref(), Some("short"));
    assert!(restarted.reason.as_deref().unwrap_or("").starts_with("not running"));

    rt.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn deregister_stops_the_task() {
    let rt = Runtime::builder(RuntimeConfig::default()).build();
    let watchdog = rt.watchdog(Duration::from_millis(200)).unwrap();
    let task = idle(&rt, "svc");

    watchdog.register(Arc::clone(&task), "svc").unwrap();
    assert!(eventually(|| task.status() == TaskStatus::Running, Duration::from_secs(1)).await);

    watchdog.deregister("svc").unwrap();
    assert!(task.wait_finished(Duration::from_secs(1)).await);
    assert_eq!(task.status(), TaskStatus::Completed);
    assert!(!task.is_runnable());
    assert!(eventually(|| !watchdog.contains("svc"), Duration::from_secs(1)).await);

    assert!(matches!(
        watchdog.deregister("svc"),
        Err(RuntimeError::NotFound { .. })
    ));

    rt.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn loop_stop_stops_every_task() {
    let rt = Runtime::builder(RuntimeConfig::default()).build();
    let watchdog = rt.watchdog(Duration::from_secs(10)).unwrap();
    let a = idle(&rt, "a");
    let b = idle(&rt, "b");

    watchdog.register(Arc::clone(&a), "a").unwrap();
    watchdog.register(Arc::clone(&b), "b").unwrap();
    assert!(eventually(|| a.is_alive() && b.is_alive(), Duration::from_secs(1)).await);

    watchdog.loop_stop().await.unwrap();
    assert!(!watchdog.is_running());
    assert!(a.wait_finished(Duration::from_secs(1)).await);
    assert!(b.wait_finished(Duration::from_secs(1)).await);
    assert!(watchdog.watched_labels().is_empty());
    assert!(watchdog.pending_stop_labels().is_empty());

    assert!(watchdog.loop_stop().await.is_ok());
    rt.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_teardown_reports_shutdown_timeout() {
    let watchdog = Arc::new(
        Watchdog::new(Duration::from_millis(100))
            .unwrap()
            .with_shutdown_timeout(Duration::from_millis(200)),
    );
    watchdog.spawn();

    let task = TaskBuilder::new("slow")
        .runnable(RunnableFn::arc(|ctx: CancellationToken, _kw: Kwargs| async move {
            ctx.cancelled().await;
            Ok::<_, TaskError>(Value::Null)
        }))
        .stop_with(
            StopFn::arc(|_kw: Kwargs| async move {
                tokio::time::sleep(Duration::from_secs(1)).await;
            }),
            Kwargs::new(),
        )
        .build();
    watchdog.register(Arc::clone(&task), "slow").unwrap();
    assert!(eventually(|| task.is_alive(), Duration::from_secs(1)).await);

    match watchdog.loop_stop().await {
        Err(RuntimeError::ShutdownTimeout { alive, .. }) => {
            assert_eq!(alive, vec!["slow".to_string()]);
        }
        other => panic!("expected shutdown timeout, got {other:?}"),
    }
    assert!(!watchdog.is_running());
    assert!(task.is_alive());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn duplicate_labels_are_rejected() {
    let rt = Runtime::builder(RuntimeConfig::default()).build();
    let watchdog = rt.watchdog(Duration::from_secs(1)).unwrap();

    watchdog.register(idle(&rt, "one"), "dup").unwrap();
    assert!(matches!(
        watchdog.register(idle(&rt, "two"), "dup"),
        Err(RuntimeError::InvalidLabel { .. })
    ));

    let generated = watchdog.register(idle(&rt, "three"), "").unwrap();
    assert!(watchdog.contains(&generated));

    rt.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn a_failing_label_does_not_stall_the_others() {
    let rt = Runtime::builder(RuntimeConfig::default()).build();
    let mut rx = rt.bus().subscribe();
    let watchdog = rt.watchdog(Duration::from_millis(100)).unwrap();

    let bad = rt.task(
        TaskBuilder::new("bad")
            .runnable(RunnableFn::arc(|ctx: CancellationToken, _kw: Kwargs| async move {
                ctx.cancelled().await;
                Ok::<_, TaskError>(Value::Null)
            }))
            .stop_with(
                StopFn::arc(|_kw: Kwargs| async move { panic!("stop hook exploded") }),
                Kwargs::new(),
            ),
    );
    let good = idle(&rt, "good");

    watchdog.register(Arc::clone(&bad), "bad").unwrap();
    watchdog.register(Arc::clone(&good), "good").unwrap();
    assert!(eventually(|| watchdog.watched_labels().len() == 2, Duration::from_secs(1)).await);

    watchdog.deregister("bad").unwrap();
    let fault = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match rx.recv().await {
                Ok(ev) if ev.kind == EventKind::WatchdogFault => break ev,
                Ok(_) => continue,
                Err(err) => panic!("bus closed: {err}"),
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(fault.label.as_deref(), Some("bad"));
    assert!(fault.reason.as_deref().unwrap_or("").contains("stop hook exploded"));

    assert!(eventually(|| !watchdog.contains("bad"), Duration::from_secs(1)).await);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(watchdog.is_running());
    assert_eq!(watchdog.watched_labels(), vec!["good".to_string()]);
    assert_eq!(good.status(), TaskStatus::Running);
    assert!(good.is_alive());

    rt.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_request_wins_over_a_pending_restart() {
    let rt = Runtime::builder(RuntimeConfig::default()).build();
    let mut rx = rt.bus().subscribe();
    let watchdog = rt.watchdog(Duration::from_secs(10)).unwrap();

    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let brief = rt.thread(
        "brief",
        RunnableFn::arc(move |_ctx: CancellationToken, _kw: Kwargs| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok::<_, TaskError>(Value::Null)
            }
        }),
    );

    watchdog.register(Arc::clone(&brief), "brief").unwrap();
    assert!(eventually(|| watchdog.watched_labels() == vec!["brief".to_string()], Duration::from_secs(1)).await);
    // down and watched: the next pass would restart it
    assert!(brief.wait_finished(Duration::from_secs(1)).await);
    assert_eq!(brief.status(), TaskStatus::Completed);

    watchdog.deregister("brief").unwrap();
    assert!(eventually(|| !watchdog.contains("brief"), Duration::from_secs(1)).await);
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(brief.status(), TaskStatus::Completed);
    while let Ok(ev) = rx.try_recv() {
        assert_ne!(ev.kind, EventKind::TaskRestarted, "restarted after a stop request");
    }

    rt.shutdown().await.unwrap();
}
