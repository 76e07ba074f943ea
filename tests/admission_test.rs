//! Admission gate: bounded concurrency, FIFO wake-up, exception safety.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::join_all;
use portunus::{AdmissionSemaphore, GatewayError};
use tokio::sync::Semaphore;
use tokio::time::Instant;

/// Operations block on `release` until the test hands out a permit.
struct Probe {
    release: Semaphore,
    current: AtomicUsize,
    peak: AtomicUsize,
    started: Mutex<Vec<usize>>,
    finished: Mutex<Vec<usize>>,
}

impl Probe {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            release: Semaphore::new(0),
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            started: Mutex::new(Vec::new()),
            finished: Mutex::new(Vec::new()),
        })
    }

    async fn work(&self, id: usize) -> portunus::Result<usize> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.started.lock().unwrap().push(id);

        self.release.acquire().await.unwrap().forget();

        self.current.fetch_sub(1, Ordering::SeqCst);
        self.finished.lock().unwrap().push(id);
        Ok(id)
    }
}

async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn at_most_max_concurrent_in_flight_and_fifo_resume() {
    let gate = Arc::new(AdmissionSemaphore::new(3));
    let probe = Probe::new();

    let mut handles = Vec::new();
    for id in 0..6 {
        let gate = gate.clone();
        let probe = probe.clone();
        handles.push(tokio::spawn(async move {
            gate.run(|| probe.work(id)).await
        }));
        // let each caller reach the gate before the next arrives
        settle().await;
    }

    assert_eq!(gate.in_flight(), 3);
    assert_eq!(gate.queued(), 3);
    assert_eq!(*probe.started.lock().unwrap(), vec![0, 1, 2]);

    for _ in 0..6 {
        probe.release.add_permits(1);
        settle().await;
        assert!(gate.in_flight() <= 3);
    }

    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(probe.peak.load(Ordering::SeqCst), 3);
    assert_eq!(*probe.started.lock().unwrap(), vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(gate.in_flight(), 0);
    assert_eq!(gate.queued(), 0);
}

#[tokio::test]
async fn failing_operation_wakes_next_waiter() {
    let gate = Arc::new(AdmissionSemaphore::new(1));
    let probe = Probe::new();

    let holder = {
        let gate = gate.clone();
        let probe = probe.clone();
        tokio::spawn(async move { gate.run(|| probe.work(0)).await })
    };
    settle().await;

    let waiter = {
        let gate = gate.clone();
        tokio::spawn(async move {
            gate.run(|| async { Err::<(), _>(GatewayError::Unknown("boom".into())) })
                .await
        })
    };
    settle().await;
    assert_eq!(gate.queued(), 1);

    probe.release.add_permits(1);
    holder.await.unwrap().unwrap();
    assert!(waiter.await.unwrap().is_err());

    // slot released despite the failure
    assert_eq!(gate.in_flight(), 0);
    assert_eq!(gate.run(|| async { Ok(1) }).await.unwrap(), 1);
}

#[tokio::test]
async fn cancelled_waiter_leaves_the_queue() {
    let gate = Arc::new(AdmissionSemaphore::new(1));
    let probe = Probe::new();

    let holder = {
        let gate = gate.clone();
        let probe = probe.clone();
        tokio::spawn(async move { gate.run(|| probe.work(0)).await })
    };
    settle().await;

    let gave_up = tokio::time::timeout(
        Duration::from_millis(20),
        gate.run(|| async { Ok(()) }),
    )
    .await;
    assert!(gave_up.is_err());
    assert_eq!(gate.queued(), 0);

    let next = {
        let gate = gate.clone();
        let probe = probe.clone();
        tokio::spawn(async move { gate.run(|| probe.work(1)).await })
    };
    settle().await;
    assert_eq!(gate.queued(), 1);

    probe.release.add_permits(2);
    assert_eq!(holder.await.unwrap().unwrap(), 0);
    assert_eq!(next.await.unwrap().unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_batch_completes_in_waves() {
    let gate = AdmissionSemaphore::new(3);
    let current = AtomicUsize::new(0);
    let peak = AtomicUsize::new(0);
    let (current, peak) = (&current, &peak);
    let start = Instant::now();

    let calls = (0..10).map(|id| {
        gate.run(move || async move {
            let now = current.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
            current.fetch_sub(1, Ordering::SeqCst);
            Ok(id)
        })
    });
    let results: Vec<usize> = join_all(calls)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    assert_eq!(results, (0..10).collect::<Vec<_>>());
    assert_eq!(peak.load(Ordering::SeqCst), 3);
    // ten calls through three slots take four rounds
    assert!(start.elapsed() >= Duration::from_millis(400));
    assert_eq!(gate.in_flight(), 0);
}
