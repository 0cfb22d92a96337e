use weft::task::{self, spawn};
use weft::time::{sleep, timeout};
use weft::{Cause, Error, JobState, RuntimeBuilder};

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[test]
fn test_sleep_waits_at_least_duration() {
    let rt = RuntimeBuilder::new().build().unwrap();

    let elapsed = rt
        .block_on(async {
            let start = Instant::now();
            sleep(Duration::from_millis(20)).await;
            start.elapsed()
        })
        .unwrap();

    assert!(elapsed >= Duration::from_millis(20));
}

#[test]
fn test_sleepers_resume_by_deadline() {
    let rt = RuntimeBuilder::new().build().unwrap();

    let order = rt
        .block_on(async {
            let order = Arc::new(Mutex::new(Vec::new()));

            let handles: Vec<_> = [30, 10, 20]
                .into_iter()
                .map(|ms| {
                    let order = order.clone();
                    spawn(async move {
                        sleep(Duration::from_millis(ms)).await;
                        order.lock().unwrap().push(ms);
                    })
                })
                .collect();

            for handle in handles {
                handle.await.unwrap();
            }

            let order = order.lock().unwrap().clone();
            order
        })
        .unwrap();

    assert_eq!(order, vec![10, 20, 30]);
}

#[test]
fn test_timeout_elapses() {
    let rt = RuntimeBuilder::new().build().unwrap();

    let result = rt
        .block_on(async {
            timeout(Duration::from_millis(10), sleep(Duration::from_secs(10))).await
        })
        .unwrap();

    assert_eq!(result, Err(Error::Timeout(Duration::from_millis(10))));
}

#[test]
fn test_timeout_returns_value_in_time() {
    let rt = RuntimeBuilder::new().build().unwrap();

    let result = rt
        .block_on(async {
            timeout(Duration::from_secs(5), async {
                sleep(Duration::from_millis(5)).await;
                "done"
            })
            .await
        })
        .unwrap();

    assert_eq!(result, Ok("done"));
}

#[test]
fn test_timeout_cancels_children_and_not_caller() {
    let rt = RuntimeBuilder::new().build().unwrap();
    let child_outcome = Arc::new(Mutex::new(None));
    let recorded = child_outcome.clone();

    let (result, caller_state) = rt
        .block_on(async move {
            let result = timeout(Duration::from_millis(10), async move {
                let child = spawn(sleep(Duration::from_secs(10)));
                child.invoke_on_completion(move |outcome| {
                    *recorded.lock().unwrap() = Some(outcome.clone());
                });

                child.await
            })
            .await;

            (result, task::current_state())
        })
        .unwrap();

    assert!(result.unwrap_err().is_timeout());
    assert_eq!(caller_state, Some(JobState::Active));

    match child_outcome.lock().unwrap().as_ref() {
        Some(Err(Cause::Cancelled(reason))) => assert!(reason.starts_with("timed out")),
        other => panic!("unexpected child outcome: {other:?}"),
    }
}

#[test]
fn test_timeout_reports_failure_not_timeout() {
    let rt = RuntimeBuilder::new().build().unwrap();

    let result = rt
        .block_on(async {
            timeout(Duration::from_secs(5), async {
                spawn(async {
                    panic!("failed early");
                });
                sleep(Duration::from_secs(10)).await;
            })
            .await
        })
        .unwrap();

    assert!(matches!(result, Err(Error::Failed(f)) if f.message() == "failed early"));
}

#[test]
fn test_cancelled_sleeper_leaves_delayed_queue() {
    let rt = RuntimeBuilder::new().build().unwrap();

    let start = Instant::now();

    rt.block_on(async {
        let sleeper = spawn(sleep(Duration::from_secs(30)));
        sleep(Duration::from_millis(5)).await;
        sleeper.cancel();

        assert!(sleeper.await.unwrap_err().is_cancelled());
    })
    .unwrap();

    assert!(start.elapsed() < Duration::from_secs(5));
}
