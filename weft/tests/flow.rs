use weft::channel::Capacity;
use weft::error::{Cause, Error, Failure};
use weft::flow::{AsFlow, channel_flow, flow, flow_of};
use weft::task::spawn;
use weft::RuntimeBuilder;

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[test]
fn test_each_collect_runs_the_producer_again() {
    let rt = RuntimeBuilder::new().build().unwrap();
    let runs = Arc::new(AtomicUsize::new(0));

    let counted = runs.clone();
    let (first, second) = rt
        .block_on(async move {
            let numbers = flow(move |out| {
                counted.fetch_add(1, Ordering::SeqCst);

                async move {
                    for i in 1..=3 {
                        out.emit(i).await?;
                    }
                    Ok(())
                }
            });

            (numbers.to_vec().await.unwrap(), numbers.to_vec().await.unwrap())
        })
        .unwrap();

    assert_eq!(first, vec![1, 2, 3]);
    assert_eq!(second, vec![1, 2, 3]);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[test]
fn test_nothing_runs_until_collected() {
    let rt = RuntimeBuilder::new().build().unwrap();
    let runs = Arc::new(AtomicUsize::new(0));

    let counted = runs.clone();
    rt.block_on(async move {
        let _unused = flow(move |out| {
            counted.fetch_add(1, Ordering::SeqCst);
            async move { out.emit(1).await }
        })
        .map(|n| n * 2);
    })
    .unwrap();

    assert_eq!(runs.load(Ordering::SeqCst), 0);
}

#[test]
fn test_operators_apply_in_order() {
    let rt = RuntimeBuilder::new().build().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let log = seen.clone();
    let values = rt
        .block_on(async move {
            flow_of(1..=10)
                .on_each(move |n| log.lock().unwrap().push(*n))
                .filter(|n| n % 2 == 0)
                .map(|n| n * 10)
                .take(3)
                .to_vec()
                .await
                .unwrap()
        })
        .unwrap();

    assert_eq!(values, vec![20, 40, 60]);

    // The producer may read ahead by a value before being stopped.
    let seen = seen.lock().unwrap();
    assert_eq!(seen[..6], [1, 2, 3, 4, 5, 6]);
    assert!(seen.len() < 10);
}

#[test]
fn test_take_stops_an_endless_producer() {
    let rt = RuntimeBuilder::new().worker_threads(2).build().unwrap();

    let values = rt
        .block_on(async {
            flow(|out| async move {
                let mut i = 0u64;
                loop {
                    out.emit(i).await?;
                    i += 1;
                }
            })
            .take(4)
            .to_vec()
            .await
            .unwrap()
        })
        .unwrap();

    assert_eq!(values, vec![0, 1, 2, 3]);
}

#[test]
fn test_breaking_out_of_collect_cancels_the_producer() {
    let rt = RuntimeBuilder::new().build().unwrap();
    let outcomes = Arc::new(Mutex::new(Vec::new()));

    let sink = outcomes.clone();
    let collected = rt
        .block_on(async move {
            let ticks = flow(|out| async move {
                for i in 0.. {
                    out.emit(i).await?;
                }
                Ok(())
            })
            .on_completion(move |outcome| sink.lock().unwrap().push(outcome.clone()));

            let mut collected = Vec::new();
            ticks
                .collect(|n| {
                    collected.push(n);
                    if collected.len() == 2 {
                        ControlFlow::Break(())
                    } else {
                        ControlFlow::Continue(())
                    }
                })
                .await
                .unwrap();

            collected
        })
        .unwrap();

    assert_eq!(collected, vec![0, 1]);

    let outcomes = outcomes.lock().unwrap();
    assert_eq!(outcomes.len(), 1);
    assert!(matches!(outcomes[0], Err(Cause::Cancelled(_))));
}

#[test]
fn test_completed_flow_reports_success_once() {
    let rt = RuntimeBuilder::new().build().unwrap();
    let outcomes = Arc::new(Mutex::new(Vec::new()));

    let sink = outcomes.clone();
    let values = rt
        .block_on(async move {
            vec!["a", "b"]
                .as_flow()
                .on_completion(move |outcome| sink.lock().unwrap().push(outcome.clone()))
                .to_vec()
                .await
                .unwrap()
        })
        .unwrap();

    assert_eq!(values, vec!["a", "b"]);
    assert_eq!(*outcomes.lock().unwrap(), vec![Ok(())]);
}

#[test]
fn test_values_emitted_before_a_failure_are_delivered() {
    let rt = RuntimeBuilder::new().build().unwrap();

    let (collected, result) = rt
        .block_on(async {
            let readings = flow(|out| async move {
                out.emit(1).await?;
                Err(Error::Failed(Failure::new("disk gone")))
            })
            .map(|n| n + 1);

            let mut collected = Vec::new();
            let result = readings
                .collect(|n| {
                    collected.push(n);
                    ControlFlow::Continue(())
                })
                .await;

            (collected, result)
        })
        .unwrap();

    assert_eq!(collected, vec![2]);
    assert_eq!(result, Err(Error::Failed(Failure::new("disk gone"))));
}

#[test]
fn test_catch_emits_fallback_after_upstream_failure() {
    let rt = RuntimeBuilder::new().build().unwrap();

    let values = rt
        .block_on(async {
            flow(|out| async move {
                out.emit(1).await?;
                out.emit(2).await?;
                panic!("sensor offline");
            })
            .catch(|failure, out| async move {
                assert_eq!(failure.message(), "sensor offline");
                out.emit(-1).await
            })
            .to_vec()
            .await
            .unwrap()
        })
        .unwrap();

    assert_eq!(values, vec![1, 2, -1]);
}

#[test]
fn test_channel_flow_forwards_values_sent_from_children() {
    let rt = RuntimeBuilder::new().worker_threads(2).build().unwrap();

    let mut values = rt
        .block_on(async {
            channel_flow(Capacity::Bounded(4), |tx| async move {
                for base in [0, 100] {
                    let tx = tx.clone();
                    spawn(async move {
                        for i in 0..3 {
                            tx.send(base + i).await.unwrap();
                        }
                    });
                }
            })
            .to_vec()
            .await
            .unwrap()
        })
        .unwrap();

    values.sort();
    assert_eq!(values, vec![0, 1, 2, 100, 101, 102]);
}
