//! Workers dying while they hold tasks.

use std::time::Duration;

use forkspace::core::task::TaskNode;
use forkspace::util::with_timeout;
use forkspace::Error;

use super::fixtures::{join_executions, leaf_executions, new_run, settings, Cluster, Tree, JOB_TIMEOUT};

/// Test: Worker killed mid-task
///
/// Given 64 slow leaves spread over three workers
/// When one worker is killed while the job is running
/// Then its tasks are rerun elsewhere and every leaf counts exactly once
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_killed_worker_tasks_are_requeued() {
    let run = new_run();
    let mut cluster = Cluster::<Tree>::start(3, settings(false, false));
    cluster.space.submit(TaskNode::root(Tree::root(&run, 3, 4, 20))).unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    cluster.kill(0);

    let result = with_timeout(JOB_TIMEOUT, cluster.space.take()).await.unwrap();
    assert_eq!(*result.value(), 64, "Each leaf should be counted exactly once");
    assert!(leaf_executions(&run) >= 64, "Every leaf should have run at least once");
    assert_eq!(cluster.space.worker_count(), 2, "The killed worker should be gone");

    let joins = join_executions(&run);
    assert!(joins.len() >= Tree::internal_nodes(3, 4));
    assert!(joins.iter().all(|&n| n == 4), "Every Join should see all four inputs: {:?}", joins);
    cluster.shutdown().await;
}

/// Test: Every worker lost, then a new one joins
///
/// Given a job whose only worker is killed partway through
/// When a fresh worker registers later
/// Then the job still finishes with the right answer
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_job_survives_losing_every_worker() {
    let run = new_run();
    let mut cluster = Cluster::<Tree>::start(1, settings(false, false));
    cluster.space.submit(TaskNode::root(Tree::root(&run, 2, 3, 15))).unwrap();

    tokio::time::sleep(Duration::from_millis(40)).await;
    cluster.kill(0);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(cluster.space.worker_count(), 0);
    assert!(!cluster.space.is_stopped(), "Losing workers must not stop the Space");

    cluster.add_worker();
    let result = with_timeout(JOB_TIMEOUT, cluster.space.take()).await.unwrap();
    assert_eq!(*result.value(), 9);
    cluster.shutdown().await;
}

/// Test: Killing a pooled worker
///
/// Given multicore workers absorbing Joins
/// When one of them is killed mid-job
/// Then the result is unaffected
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_killed_pooled_worker() {
    let run = new_run();
    let mut cluster = Cluster::<Tree>::start(2, settings(true, true));
    cluster.space.submit(TaskNode::root(Tree::root(&run, 3, 3, 10))).unwrap();

    tokio::time::sleep(Duration::from_millis(30)).await;
    cluster.kill(1);

    let result = with_timeout(JOB_TIMEOUT, cluster.space.take()).await.unwrap();
    assert_eq!(*result.value(), 27);
    cluster.shutdown().await;
}

/// Test: Stop wakes a waiting taker
///
/// Given a job that cannot finish because no worker is attached
/// When the Space is stopped
/// Then take returns an error instead of hanging
#[tokio::test]
async fn test_stop_interrupts_take() {
    let cluster = Cluster::<Tree>::start(0, settings(false, false));
    cluster.space.submit(TaskNode::root(Tree::root(&new_run(), 1, 2, 0))).unwrap();

    let space = cluster.space.clone();
    let taker = tokio::spawn(async move { space.take().await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    cluster.space.stop();

    let outcome = with_timeout(Duration::from_secs(5), async { Ok(taker.await) })
        .await
        .expect("take should return once stopped")
        .expect("taker panicked");
    assert!(matches!(outcome, Err(Error::Interrupted)), "take should report Interrupted");
}
