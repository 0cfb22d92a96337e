use weft::task::{self, non_cancellable, spawn};
use weft::time::sleep;
use weft::{Cause, Error, JobState, RuntimeBuilder};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn is_cancelled(outcome: &Result<(), Cause>) -> bool {
    matches!(outcome, Err(Cause::Cancelled(_)))
}

#[test]
fn test_cancel_propagates_to_all_descendants() {
    let rt = RuntimeBuilder::new().build().unwrap();
    let outcomes = Arc::new(Mutex::new(Vec::new()));
    let recorded = outcomes.clone();

    let result = rt
        .block_on(async move {
            let parent = spawn(async move {
                for _ in 0..2 {
                    let recorded = recorded.clone();
                    let child = spawn(async {
                        spawn(sleep(Duration::from_secs(10)));
                        sleep(Duration::from_secs(10)).await;
                    });
                    child.invoke_on_completion(move |outcome| {
                        recorded.lock().unwrap().push(outcome.clone());
                    });
                }
                sleep(Duration::from_secs(10)).await;
            });

            sleep(Duration::from_millis(5)).await;
            parent.cancel();
            parent.await
        })
        .unwrap();

    assert!(matches!(result, Err(Error::Cancelled(_))));

    let outcomes = outcomes.lock().unwrap();
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(is_cancelled));
}

#[test]
fn test_cancelling_leaf_does_not_affect_parent() {
    let rt = RuntimeBuilder::new().build().unwrap();

    let (parent_result, child_cancelled) = rt
        .block_on(async {
            let parent = spawn(async {
                let child = spawn(sleep(Duration::from_secs(10)));
                task::yield_now().await;

                child.cancel();
                let child_result = child.await;

                (7, matches!(child_result, Err(Error::Cancelled(_))))
            });

            let (value, child_cancelled) = parent.await.unwrap();
            (value, child_cancelled)
        })
        .unwrap();

    assert_eq!(parent_result, 7);
    assert!(child_cancelled);
}

#[test]
fn test_first_cancel_cause_wins() {
    let rt = RuntimeBuilder::new().build().unwrap();

    let result = rt
        .block_on(async {
            let handle = spawn(sleep(Duration::from_secs(10)));
            handle.cancel_with("first");
            handle.cancel_with("second");
            handle.await
        })
        .unwrap();

    assert_eq!(result, Err(Error::Cancelled(Arc::from("first"))));
}

#[test]
fn test_cancel_terminal_task_is_noop() {
    let rt = RuntimeBuilder::new().build().unwrap();

    let outcome = rt
        .block_on(async {
            let handle = spawn(async { 1 });
            handle.join().await.unwrap();
            handle.cancel();
            (handle.state(), handle.outcome())
        })
        .unwrap();

    assert_eq!(outcome, (JobState::Completed, Some(Ok(()))));
}

#[test]
fn test_task_cancelled_before_first_poll_never_runs() {
    let rt = RuntimeBuilder::new().build().unwrap();
    let ran = Arc::new(AtomicBool::new(false));
    let flag = ran.clone();

    let result = rt
        .block_on(async move {
            let handle = spawn(async move { flag.store(true, Ordering::SeqCst) });
            handle.cancel();
            handle.await
        })
        .unwrap();

    assert!(result.unwrap_err().is_cancelled());
    assert!(!ran.load(Ordering::SeqCst));
}

#[test]
fn test_non_cancellable_region_finishes_and_rejects_new_children() {
    let rt = RuntimeBuilder::new().build().unwrap();
    let cleanup_done = Arc::new(AtomicBool::new(false));
    let child_ran = Arc::new(AtomicBool::new(false));
    let child_state = Arc::new(Mutex::new(None));

    let (cleanup, ran, state) = (cleanup_done.clone(), child_ran.clone(), child_state.clone());

    let result = rt
        .block_on(async move {
            let worker = spawn(async move {
                non_cancellable(async move {
                    sleep(Duration::from_millis(20)).await;

                    let child = spawn(async move { ran.store(true, Ordering::SeqCst) });
                    *state.lock().unwrap() = Some(child.state());

                    cleanup.store(true, Ordering::SeqCst);
                })
                .await;

                // Never reached: the cancellation applies after the region.
                sleep(Duration::from_secs(10)).await;
            });

            sleep(Duration::from_millis(5)).await;
            worker.cancel();
            worker.await
        })
        .unwrap();

    assert!(result.unwrap_err().is_cancelled());
    assert!(cleanup_done.load(Ordering::SeqCst));
    assert!(!child_ran.load(Ordering::SeqCst));
    assert_eq!(*child_state.lock().unwrap(), Some(JobState::Cancelled));
}

#[test]
fn test_ensure_active_observes_cancellation() {
    let rt = RuntimeBuilder::new().worker_threads(2).build().unwrap();
    let observed = Arc::new(AtomicBool::new(false));
    let flag = observed.clone();

    let result = rt
        .block_on(async move {
            let busy = spawn(async move {
                loop {
                    if task::ensure_active().is_err() {
                        flag.store(true, Ordering::SeqCst);
                        break;
                    }
                    std::thread::yield_now();
                }
            });

            sleep(Duration::from_millis(10)).await;
            busy.cancel();
            busy.await
        })
        .unwrap();

    assert!(result.unwrap_err().is_cancelled());
    assert!(observed.load(Ordering::SeqCst));
}

#[test]
fn test_ensure_active_outside_runtime_is_ok() {
    assert!(task::ensure_active().is_ok());
    assert_eq!(task::current_id(), None);
}

#[test]
fn test_failure_after_cancellation_is_reported_not_recorded() {
    let reports = Arc::new(Mutex::new(Vec::new()));
    let sink = reports.clone();

    let rt = RuntimeBuilder::new()
        .on_uncaught_failure(move |report| {
            sink.lock().unwrap().push(report.failure.message().to_owned());
        })
        .build()
        .unwrap();

    let result = rt
        .block_on(async {
            let handle = spawn(async {
                non_cancellable(async {
                    sleep(Duration::from_millis(10)).await;
                    panic!("cleanup failed");
                })
                .await;
            });

            task::yield_now().await;
            handle.cancel_with("shutdown");
            handle.await
        })
        .unwrap();

    assert_eq!(result, Err(Error::Cancelled(Arc::from("shutdown"))));
    assert_eq!(*reports.lock().unwrap(), vec!["cleanup failed".to_owned()]);
}
