use weft::task::{self, scope, spawn};
use weft::time::sleep;
use weft::{Error, JobState, RuntimeBuilder};

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[test]
fn test_parent_waits_for_children() {
    let rt = RuntimeBuilder::new().build().unwrap();
    let child_done = Arc::new(AtomicBool::new(false));
    let flag = child_done.clone();

    let (state_while_waiting, result) = rt
        .block_on(async move {
            let parent = spawn(async move {
                spawn(async move {
                    sleep(Duration::from_millis(30)).await;
                    flag.store(true, Ordering::SeqCst);
                });
                "parent body done"
            });

            sleep(Duration::from_millis(10)).await;
            let state = parent.state();

            (state, parent.await)
        })
        .unwrap();

    assert_eq!(state_while_waiting, JobState::Completing);
    assert_eq!(result, Ok("parent body done"));
    assert!(child_done.load(Ordering::SeqCst));
}

#[test]
fn test_children_are_removed_as_they_terminate() {
    let rt = RuntimeBuilder::new().build().unwrap();

    let counts = rt
        .block_on(async {
            let parent = spawn(async {
                for ms in [5, 100] {
                    spawn(sleep(Duration::from_millis(ms)));
                }
            });

            let mut counts = Vec::new();
            sleep(Duration::from_millis(1)).await;
            counts.push(parent.child_count());
            sleep(Duration::from_millis(30)).await;
            counts.push(parent.child_count());
            parent.join().await.unwrap();
            counts.push(parent.child_count());
            counts
        })
        .unwrap();

    assert_eq!(counts, vec![2, 1, 0]);
}

#[test]
fn test_invoke_on_completion_after_termination_fires_synchronously() {
    let rt = RuntimeBuilder::new().build().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let observed = calls.clone();

    rt.block_on(async move {
        let handle = spawn(async { 1 });
        handle.join().await.unwrap();

        let calls = observed.clone();
        handle.invoke_on_completion(move |outcome| {
            assert!(outcome.is_ok());
            calls.fetch_add(1, Ordering::SeqCst);
        });

        // Ran before `invoke_on_completion` returned.
        assert_eq!(observed.load(Ordering::SeqCst), 1);
    })
    .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_invoke_on_completion_fires_once_with_outcome() {
    let rt = RuntimeBuilder::new().build().unwrap();
    let outcomes = Arc::new(Mutex::new(Vec::new()));
    let recorded = outcomes.clone();

    rt.block_on(async move {
        let handle = spawn(sleep(Duration::from_millis(5)));

        for _ in 0..2 {
            let recorded = recorded.clone();
            handle.invoke_on_completion(move |outcome| {
                recorded.lock().unwrap().push(outcome.clone());
            });
        }

        handle.cancel_with("stop");
        let _ = handle.await;
    })
    .unwrap();

    let outcomes = outcomes.lock().unwrap();
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|o| matches!(o, Err(weft::Cause::Cancelled(r)) if &**r == "stop")));
}

#[test]
fn test_panicking_callback_does_not_stop_completion() {
    let reports = Arc::new(Mutex::new(Vec::new()));
    let sink = reports.clone();

    let rt = RuntimeBuilder::new()
        .on_uncaught_failure(move |report| {
            sink.lock().unwrap().push(report.failure.message().to_owned());
        })
        .build()
        .unwrap();

    let later_ran = Arc::new(AtomicBool::new(false));
    let flag = later_ran.clone();

    let (outcome, parent) = rt
        .block_on(async move {
            let parent = spawn(async move {
                let child = spawn(sleep(Duration::from_millis(5)));
                child.invoke_on_completion(|_| panic!("callback boom"));
                child.invoke_on_completion(move |_| flag.store(true, Ordering::SeqCst));

                child.await
            });

            let outcome = parent.join().await;
            (outcome, parent.await)
        })
        .unwrap();

    assert!(outcome.is_ok());
    assert!(matches!(parent, Ok(Ok(()))));
    assert!(later_ran.load(Ordering::SeqCst));
    assert_eq!(*reports.lock().unwrap(), vec!["callback boom".to_owned()]);
}

#[test]
fn test_scope_returns_after_its_children() {
    let rt = RuntimeBuilder::new().build().unwrap();
    let finished = Arc::new(AtomicUsize::new(0));
    let counter = finished.clone();

    let value = rt
        .block_on(async move {
            let value = scope(async {
                for ms in [10, 20, 5] {
                    let counter = counter.clone();
                    spawn(async move {
                        sleep(Duration::from_millis(ms)).await;
                        counter.fetch_add(1, Ordering::SeqCst);
                    });
                }
                "scoped"
            })
            .await;

            (value, counter.load(Ordering::SeqCst))
        })
        .unwrap();

    assert_eq!(value, (Ok("scoped"), 3));
}

#[test]
fn test_scope_failure_cancels_siblings_but_not_caller() {
    let rt = RuntimeBuilder::new().build().unwrap();
    let sibling_finished = Arc::new(AtomicBool::new(false));
    let flag = sibling_finished.clone();

    let (result, still_active) = rt
        .block_on(async move {
            let result = scope(async move {
                spawn(async move {
                    sleep(Duration::from_secs(5)).await;
                    flag.store(true, Ordering::SeqCst);
                });
                spawn(async {
                    sleep(Duration::from_millis(5)).await;
                    panic!("boom");
                });
                5
            })
            .await;

            (result, task::ensure_active().is_ok())
        })
        .unwrap();

    match result {
        Err(Error::Failed(failure)) => assert_eq!(failure.message(), "boom"),
        other => panic!("unexpected scope result: {other:?}"),
    }

    assert!(still_active);
    assert!(!sibling_finished.load(Ordering::SeqCst));
}

#[test]
fn test_scope_may_borrow_from_caller() {
    let rt = RuntimeBuilder::new().build().unwrap();

    let total = rt
        .block_on(async {
            let values = vec![1, 2, 3];
            let borrowed = &values;

            scope(async move {
                task::yield_now().await;
                borrowed.iter().sum::<i32>()
            })
            .await
        })
        .unwrap();

    assert_eq!(total, Ok(6));
}

#[test]
fn test_root_failure_is_reported_once() {
    let reports = Arc::new(Mutex::new(Vec::new()));
    let sink = reports.clone();

    let rt = RuntimeBuilder::new()
        .on_uncaught_failure(move |report| {
            sink.lock().unwrap().push(report.failure.message().to_owned());
        })
        .build()
        .unwrap();

    let result = rt.block_on(async {
        spawn(async {
            panic!("child exploded");
        });
        sleep(Duration::from_secs(5)).await;
    });

    assert!(matches!(&result, Err(Error::Failed(f)) if f.message() == "child exploded"));
    assert_eq!(*reports.lock().unwrap(), vec!["child exploded".to_owned()]);
}

#[test]
fn test_named_task_and_current_id() {
    let rt = RuntimeBuilder::new().build().unwrap();

    let (name, same_id) = rt
        .block_on(async {
            let handle = task::Builder::new()
                .name("worker")
                .spawn(async { task::current_id() });

            let name = handle.name().map(str::to_owned);
            let id = handle.id();
            let seen = handle.await.unwrap();

            (name, seen == Some(id))
        })
        .unwrap();

    assert_eq!(name.as_deref(), Some("worker"));
    assert!(same_id);
}

#[weft::test]
async fn test_current_state_is_active_inside_body() {
    assert_eq!(task::current_state(), Some(JobState::Active));
}

#[test]
fn test_handle_polled_again_after_output_taken_fails_the_poller() {
    let rt = RuntimeBuilder::new()
        .on_uncaught_failure(|_| {})
        .build()
        .unwrap();

    let result = rt.block_on(async {
        let mut handle = spawn(async { 1 });

        let first = (&mut handle).await.unwrap();
        assert!(handle.is_finished());
        assert!(matches!(handle.outcome(), Some(Ok(()))));

        first + (&mut handle).await.unwrap()
    });

    assert!(
        matches!(result, Err(Error::Failed(f)) if f.message() == "JoinHandle polled after completion")
    );
}
