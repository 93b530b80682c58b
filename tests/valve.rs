#![allow(missing_docs)]

mod common;

use common::init_test_logging;
use filament::sync::Notify;
use filament::{do_parallel, pair, sleep, ErrorKind, SerialValve, WaitStatus};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Two submissions: the second's first phase finishes while the first is
/// still blocked, yet commits run in submission order.
#[test]
fn second_phase_waits_for_predecessor() {
    init_test_logging();
    let valve = Arc::new(SerialValve::new());
    let counter = Arc::new(AtomicU32::new(0));
    let gate = Arc::new(Notify::new());

    let (started1, s1_running) = pair();
    let (v, c, g) = (valve.clone(), counter.clone(), gate.clone());
    let p1 = do_parallel(async move {
        v.do_serial(
            async move {
                started1.complete(());
                g.notified().await;
                Ok(())
            },
            async move {
                assert_eq!(c.fetch_add(1, Ordering::SeqCst), 0);
                Ok(())
            },
        )
        .await
    });
    s1_running.wait().unwrap();

    let (started2, s2_running) = pair();
    let (v, c) = (valve.clone(), counter.clone());
    let p2 = do_parallel(async move {
        v.do_serial(
            async move {
                started2.complete(());
                Ok(())
            },
            async move {
                assert_eq!(c.fetch_add(1, Ordering::SeqCst), 1);
                Ok(())
            },
        )
        .await
    });
    s2_running.wait().unwrap();
    std::thread::sleep(Duration::from_millis(10));

    // Both second phases are still gated on submission one.
    assert_eq!(p1.wait_for(Duration::ZERO), WaitStatus::Timeout);
    assert_eq!(p2.wait_for(Duration::ZERO), WaitStatus::Timeout);

    gate.notify_one();
    p2.wait().unwrap().unwrap();
    p1.wait().unwrap().unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

/// Three submissions whose first phases finish in reverse order: the
/// third immediately, the second after a sleep, the first only when a
/// latch is released after the third is done. Commits still run 0, 1, 2.
#[test]
fn triple_commits_in_submission_order() {
    init_test_logging();
    let valve = Arc::new(SerialValve::new());
    let counter = Arc::new(AtomicU32::new(0));
    let gate = Arc::new(Notify::new());

    let (started1, s1_running) = pair();
    let (v, c, g) = (valve.clone(), counter.clone(), gate.clone());
    let p1 = do_parallel(async move {
        v.do_serial(
            async move {
                started1.complete(());
                g.notified().await;
                Ok(())
            },
            async move {
                assert_eq!(c.fetch_add(1, Ordering::SeqCst), 0);
                Ok(())
            },
        )
        .await
    });
    s1_running.wait().unwrap();

    let (started2, s2_running) = pair();
    let (v, c) = (valve.clone(), counter.clone());
    let p2 = do_parallel(async move {
        v.do_serial(
            async move {
                started2.complete(());
                sleep(Duration::from_millis(100)).await;
                Ok(())
            },
            async move {
                assert_eq!(c.fetch_add(1, Ordering::SeqCst), 1);
                Ok(())
            },
        )
        .await
    });
    s2_running.wait().unwrap();

    let (started3, s3_running) = pair();
    let (v, c) = (valve.clone(), counter.clone());
    let p3 = do_parallel(async move {
        v.do_serial(
            async move {
                started3.complete(());
                Ok(())
            },
            async move {
                assert_eq!(c.fetch_add(1, Ordering::SeqCst), 2);
                Ok(())
            },
        )
        .await
    });
    s3_running.wait().unwrap();
    std::thread::sleep(Duration::from_millis(10));

    assert_eq!(p1.wait_for(Duration::ZERO), WaitStatus::Timeout);
    assert_eq!(p2.wait_for(Duration::ZERO), WaitStatus::Timeout);
    assert_eq!(p3.wait_for(Duration::ZERO), WaitStatus::Timeout);

    gate.notify_one();
    p3.wait().unwrap().unwrap();
    p1.wait().unwrap().unwrap();
    p2.wait().unwrap().unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 3);
}

/// First phases overlap: with sleeping first phases, total wall time for
/// N submissions stays well under N sleeps.
#[test]
fn first_phases_run_concurrently() {
    init_test_logging();
    let valve = Arc::new(SerialValve::new());
    const N: u32 = 4;
    const NAP: Duration = Duration::from_millis(150);

    let start = Instant::now();
    let joins: Vec<_> = (0..N)
        .map(|_| {
            let v = valve.clone();
            do_parallel(async move {
                v.do_serial(
                    async {
                        sleep(NAP).await;
                        Ok(())
                    },
                    async { Ok(()) },
                )
                .await
            })
        })
        .collect();
    for join in joins {
        join.wait().unwrap().unwrap();
    }
    let elapsed = start.elapsed();
    assert!(
        elapsed < NAP * (N - 1),
        "first phases serialized: {elapsed:?} for {N} submissions"
    );
}

#[test]
fn failed_first_phase_keeps_chain_order() {
    init_test_logging();
    let valve = Arc::new(SerialValve::new());
    let counter = Arc::new(AtomicU32::new(0));
    let gate = Arc::new(Notify::new());

    let (started1, s1_running) = pair();
    let (v, c, g) = (valve.clone(), counter.clone(), gate.clone());
    let p1 = do_parallel(async move {
        v.do_serial(
            async move {
                started1.complete(());
                g.notified().await;
                Ok(())
            },
            async move {
                assert_eq!(c.fetch_add(1, Ordering::SeqCst), 0);
                Ok(())
            },
        )
        .await
    });
    s1_running.wait().unwrap();

    // The middle submission fails its first phase; its successor must
    // still wait for submission one's commit.
    let v = valve.clone();
    let p2 = do_parallel(async move {
        v.do_serial(
            async { Err(filament::Error::new(ErrorKind::Io)) },
            async { Ok(()) },
        )
        .await
    });

    let (v, c) = (valve.clone(), counter.clone());
    let p3 = do_parallel(async move {
        v.do_serial(
            async { Ok(()) },
            async move {
                assert_eq!(c.fetch_add(1, Ordering::SeqCst), 1);
                Ok(())
            },
        )
        .await
    });

    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(p3.wait_for(Duration::ZERO), WaitStatus::Timeout);

    gate.notify_one();
    p3.wait().unwrap().unwrap();
    assert_eq!(p2.wait().unwrap().unwrap_err().kind(), ErrorKind::Io);
    p1.wait().unwrap().unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[test]
fn shutdown_rejects_new_submissions() {
    init_test_logging();
    let valve = Arc::new(SerialValve::new());
    let last = valve.close().expect("open valve");
    last.wait().unwrap();

    let v = valve.clone();
    let join = do_parallel(async move {
        v.do_serial(async { Ok(()) }, async { Ok(()) }).await
    });
    assert_eq!(join.wait().unwrap().unwrap_err().kind(), ErrorKind::Shutdown);
}
