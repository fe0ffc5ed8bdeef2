//! Join counters and input slots under concurrent reporting.

use forkspace::core::task::TaskNode;

use super::fixtures::{join_executions, new_run, settings, Cluster, Tree};

/// Test: No lost updates
///
/// Given a three-way tree three levels deep on three workers
/// When siblings report concurrently
/// Then each of the 13 Joins runs exactly once with all three inputs
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_every_join_runs_once_with_all_inputs() {
    let run = new_run();
    let cluster = Cluster::<Tree>::start(3, settings(false, false));

    let result = cluster.solve(TaskNode::root(Tree::root(&run, 3, 3, 1))).await;
    assert_eq!(*result.value(), 27);

    let joins = join_executions(&run);
    assert_eq!(joins.len(), Tree::internal_nodes(3, 3), "Each Join should run exactly once");
    assert!(joins.iter().all(|&n| n == 3), "Join saw missing inputs: {:?}", joins);

    let stats = cluster.space.stats();
    assert_eq!(stats.waiting, 0, "Finished Joins must leave the waiting map");
    cluster.shutdown().await;
}

/// Test: Joins absorbed by the Space
///
/// Given Join absorption and pooled workers
/// When a wide tree finishes
/// Then Joins still run exactly once each
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_absorbed_joins_run_once() {
    let run = new_run();
    let cluster = Cluster::<Tree>::start(2, settings(true, true));

    let result = cluster.solve(TaskNode::root(Tree::root(&run, 2, 8, 0))).await;
    assert_eq!(*result.value(), 64);

    let joins = join_executions(&run);
    assert_eq!(joins.len(), Tree::internal_nodes(2, 8));
    assert!(joins.iter().all(|&n| n == 8));
    cluster.shutdown().await;
}

/// Test: Single-child decompositions
///
/// Given a chain where every split yields one child
/// When it runs
/// Then every Join fires on its only input
#[tokio::test]
async fn test_single_child_chain() {
    let run = new_run();
    let cluster = Cluster::<Tree>::start(1, settings(false, false));

    let result = cluster.solve(TaskNode::root(Tree::root(&run, 4, 1, 0))).await;
    assert_eq!(*result.value(), 1);
    assert_eq!(join_executions(&run), vec![1, 1, 1, 1]);
    cluster.shutdown().await;
}
