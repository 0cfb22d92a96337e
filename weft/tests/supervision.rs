use weft::task::{self, Builder, scope, spawn, spawn_try, supervisor_scope};
use weft::time::sleep;
use weft::{Cause, Error, JobState, RuntimeBuilder};

use std::sync::{Arc, Mutex};
use std::time::Duration;

fn recording_runtime() -> (weft::Runtime, Arc<Mutex<Vec<String>>>) {
    let reports = Arc::new(Mutex::new(Vec::new()));
    let sink = reports.clone();

    let rt = RuntimeBuilder::new()
        .on_uncaught_failure(move |report| {
            sink.lock().unwrap().push(report.failure.message().to_owned());
        })
        .build()
        .unwrap();

    (rt, reports)
}

#[test]
fn test_supervisor_isolates_child_failure() {
    let (rt, reports) = recording_runtime();

    let (bad_failed, good, supervisor_state) = rt
        .block_on(async {
            let supervisor = Builder::new().supervisor(true).spawn(async {
                let bad = spawn(async {
                    panic!("bad child");
                });
                let good = spawn(async {
                    sleep(Duration::from_millis(20)).await;
                    1
                });

                let bad = bad.await;
                let state = task::current_state();
                let good = good.await;

                (matches!(bad, Err(Error::Failed(_))), good, state)
            });

            supervisor.await.unwrap()
        })
        .unwrap();

    assert!(bad_failed);
    assert_eq!(good, Ok(1));
    assert_eq!(supervisor_state, Some(JobState::Active));
    assert_eq!(*reports.lock().unwrap(), vec!["bad child".to_owned()]);
}

#[test]
fn test_failing_child_cancels_siblings_and_fails_parent() {
    let (rt, reports) = recording_runtime();
    let sibling = Arc::new(Mutex::new(None));
    let recorded = sibling.clone();

    let result = rt
        .block_on(async move {
            scope(async move {
                let parent = spawn(async move {
                    let slow = spawn(sleep(Duration::from_secs(10)));
                    slow.invoke_on_completion(move |outcome| {
                        *recorded.lock().unwrap() = Some(outcome.clone());
                    });

                    spawn(async {
                        sleep(Duration::from_millis(5)).await;
                        panic!("boom");
                    });

                    let _ = slow.await;
                });

                parent.await
            })
            .await
        })
        .unwrap();

    // The failure surfaces through the scope, not the root.
    match result {
        Err(Error::Failed(failure)) => assert_eq!(failure.message(), "boom"),
        other => panic!("unexpected scope result: {other:?}"),
    }

    assert!(matches!(
        sibling.lock().unwrap().as_ref(),
        Some(Err(Cause::Cancelled(_)))
    ));
    assert!(reports.lock().unwrap().is_empty());
}

#[test]
fn test_supervisor_scope_reports_and_keeps_siblings() {
    let (rt, reports) = recording_runtime();

    let result = rt
        .block_on(async {
            supervisor_scope(async {
                spawn(async {
                    panic!("isolated");
                });

                let survivor = spawn(async {
                    sleep(Duration::from_millis(10)).await;
                    "survived"
                });

                survivor.await
            })
            .await
        })
        .unwrap();

    assert_eq!(result, Ok(Ok("survived")));
    assert_eq!(*reports.lock().unwrap(), vec!["isolated".to_owned()]);
}

#[test]
fn test_spawn_try_error_is_a_failure() {
    let (rt, reports) = recording_runtime();

    let result = rt
        .block_on(async {
            supervisor_scope(async {
                spawn_try(async { Err::<(), _>("invalid input") }).await
            })
            .await
        })
        .unwrap();

    match result {
        Ok(Err(Error::Failed(failure))) => assert_eq!(failure.message(), "invalid input"),
        other => panic!("unexpected result: {other:?}"),
    }

    assert_eq!(*reports.lock().unwrap(), vec!["invalid input".to_owned()]);
}

#[test]
fn test_spawn_try_ok_completes() {
    let rt = RuntimeBuilder::new().build().unwrap();

    let value = rt
        .block_on(async { spawn_try(async { Ok::<_, String>(3) }).await })
        .unwrap();

    assert_eq!(value, Ok(3));
}

#[test]
fn test_failing_root_fails_block_on() {
    let (rt, reports) = recording_runtime();

    let result: Result<(), Error> = rt.block_on(async {
        panic!("root failed");
    });

    assert!(matches!(result, Err(Error::Failed(f)) if f.message() == "root failed"));
    assert_eq!(reports.lock().unwrap().len(), 1);
}
