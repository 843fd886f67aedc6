use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{Local, Utc};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use taskwarden::{
    EventKind, Kwargs, RunnableFn, Runtime, RuntimeConfig, RuntimeError, TaskError, TaskRef,
};

fn counting(rt: &Runtime, id: &str, runs: &Arc<AtomicUsize>) -> TaskRef {
    let runs = Arc::clone(runs);
    rt.thread(
        id,
        RunnableFn::arc(move |_ctx: CancellationToken, _kw: Kwargs| {
            let runs = Arc::clone(&runs);
            async move {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok::<_, TaskError>(Value::Null)
            }
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
async fn interval_job_fires_and_is_rearmed_later() {
    let rt = Runtime::builder(RuntimeConfig::default()).build();
    let scheduler = rt.start_scheduler().unwrap();
    let runs = Arc::new(AtomicUsize::new(0));

    let first = scheduler
        .every(1)
        .unwrap()
        .seconds()
        .run(counting(&rt, "tick", &runs))
        .unwrap();
    assert_eq!(scheduler.jobs(), vec![first.clone()]);

    assert!(eventually(|| runs.load(Ordering::SeqCst) >= 1, Duration::from_secs(2)).await);
    assert!(eventually(|| scheduler.jobs().first().is_some_and(|k| k.due > first.due), Duration::from_millis(500)).await);

    let jobs = scheduler.jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].name, "tick");
    assert!(jobs[0].to_string().ends_with("__tick"));

    rt.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn one_shot_job_fires_once_and_is_dropped() {
    let rt = Runtime::builder(RuntimeConfig::default()).build();
    let mut rx = rt.bus().subscribe();
    let scheduler = rt.start_scheduler().unwrap();
    let runs = Arc::new(AtomicUsize::new(0));

    let key = scheduler.once().run(counting(&rt, "once", &runs)).unwrap();

    assert!(eventually(|| runs.load(Ordering::SeqCst) == 1, Duration::from_secs(2)).await);
    assert!(eventually(|| scheduler.is_empty(), Duration::from_millis(500)).await);

    let fired = tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            match rx.recv().await {
                Ok(ev) if ev.kind == EventKind::JobFired => break ev,
                Ok(_) => continue,
                Err(err) => panic!("bus closed: {err}"),
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(fired.job.as_deref(), Some(key.to_string().as_str()));

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    rt.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancel_removes_jobs_by_task_name() {
    let rt = Runtime::builder(RuntimeConfig::default()).build();
    let scheduler = rt.scheduler();
    let runs = Arc::new(AtomicUsize::new(0));

    scheduler
        .every(1)
        .unwrap()
        .hour()
        .run(counting(&rt, "report", &runs))
        .unwrap();
    assert_eq!(scheduler.len(), 1);

    assert_eq!(scheduler.cancel("report").unwrap(), 1);
    assert!(scheduler.jobs().is_empty());
    assert!(matches!(
        scheduler.cancel("report"),
        Err(RuntimeError::NotFound { .. })
    ));

    rt.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn clock_time_in_the_past_rolls_to_tomorrow() {
    let rt = Runtime::builder(RuntimeConfig::default()).build();
    let scheduler = rt.scheduler();
    let runs = Arc::new(AtomicUsize::new(0));

    let earlier = (Local::now() - chrono::Duration::minutes(2))
        .format("%H:%M")
        .to_string();
    let key = scheduler
        .at(&earlier)
        .unwrap()
        .run(counting(&rt, "nightly", &runs))
        .unwrap();

    let ahead = key.due - Utc::now().timestamp();
    assert!(ahead > 23 * 3_600, "due in {ahead}s");
    assert!(ahead <= 24 * 3_600);

    assert!(matches!(
        scheduler.at("24:61"),
        Err(RuntimeError::InvalidTime { .. })
    ));

    rt.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_scheduler_ends_the_loop() {
    let rt = Runtime::builder(RuntimeConfig::default()).build();
    let scheduler = rt.start_scheduler().unwrap();
    assert!(eventually(|| scheduler.is_running(), Duration::from_secs(1)).await);

    rt.stop_scheduler().await;
    assert!(eventually(|| !scheduler.is_running(), Duration::from_secs(1)).await);

    let again = rt.start_scheduler().unwrap();
    assert!(Arc::ptr_eq(&again, &scheduler));
    assert!(eventually(|| scheduler.is_running(), Duration::from_secs(1)).await);

    rt.shutdown().await.unwrap();
    assert!(!scheduler.is_running());
}
