//! Whole jobs run in-process against their sequential answers.

use std::sync::Arc;

use forkspace::core::shared::{Context, MinCost, SharedState};
use forkspace::tasks::job::{FibonacciJob, Job, MandelbrotJob, TspJob};
use forkspace::tasks::mandelbrot::Region;
use forkspace::tasks::tsp::{self, City};
use forkspace::tasks::{run_sequential, JobOutput, JobTask};

use super::fixtures::{settings, Cluster};

const EPS: f64 = 1e-9;

/// Test: Fibonacci through a few single-threaded workers
///
/// Given a Space with three synchronous Computers
/// When fib(20) is submitted
/// Then the answer is 6765
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fibonacci_twenty_sync_workers() {
    let cluster = Cluster::<JobTask>::start(3, settings(false, false));
    let job = FibonacciJob::new(20).unwrap();

    let result = cluster.solve(job.root()).await;
    assert_eq!(job.collect(result).unwrap(), 6765, "fib(20) should be 6765");

    let stats = cluster.space.stats();
    assert_eq!(stats.ready, 0, "Nothing should be left to run");
    assert_eq!(stats.waiting, 0, "No Join should be left waiting");
    cluster.shutdown().await;
}

/// Test: Fibonacci with pooled workers that absorb Joins
///
/// Given a Space with Join absorption and two multicore Computers
/// When fib(20) is submitted
/// Then the answer matches the synchronous run
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fibonacci_twenty_multicore_absorbing() {
    let cluster = Cluster::<JobTask>::start(2, settings(true, true));
    let job = FibonacciJob::new(20).unwrap();

    let result = cluster.solve(job.root()).await;
    assert_eq!(job.collect(result).unwrap(), 6765);
    cluster.shutdown().await;
}

/// Test: Root that is atomic from the start
///
/// Given fib(1), which never splits
/// When it is submitted
/// Then the single task's value is the final result
#[tokio::test]
async fn test_atomic_root() {
    let cluster = Cluster::<JobTask>::start(1, settings(false, false));
    let job = FibonacciJob::new(1).unwrap();

    let result = cluster.solve(job.root()).await;
    assert_eq!(job.collect(result).unwrap(), 1);
    assert_eq!(cluster.space.stats().tasks_reported, 1, "Only the root should run");
    cluster.shutdown().await;
}

/// Test: Resubmitting the same problem
///
/// Given the same root payload solved twice on fresh Spaces
/// When both runs finish
/// Then they agree
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_same_root_same_answer() {
    let job = FibonacciJob::new(15).unwrap();
    let mut answers = Vec::new();
    for workers in [1, 3] {
        let cluster = Cluster::<JobTask>::start(workers, settings(false, false));
        let result = cluster.solve(job.root()).await;
        answers.push(job.collect(result).unwrap());
        cluster.shutdown().await;
    }
    assert_eq!(answers, vec![610, 610]);
}

/// Test: TSP on the unit square
///
/// Given four cities at the corners of a unit square
/// When the TSP job runs
/// Then the tour costs 4 and visits every city once starting at city 0
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tsp_unit_square() {
    let cluster = Cluster::<JobTask>::start(2, settings(false, false));
    let job = TspJob::new(vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]).unwrap();

    let result = cluster.solve(job.root()).await;
    let tour = job.collect(result).unwrap();

    assert!((tour.cost - 4.0).abs() < EPS, "Square tour should cost 4, got {}", tour.cost);
    assert_eq!(tour.order[0], 0, "Tours start at city 0");
    let mut visited = tour.order.clone();
    visited.sort_unstable();
    assert_eq!(visited, vec![0, 1, 2, 3]);
    cluster.shutdown().await;
}

/// Ten cities on a small grid.
fn ten_cities() -> Vec<City> {
    vec![
        [6.0, 3.0],
        [2.0, 2.0],
        [5.0, 8.0],
        [1.0, 5.0],
        [1.0, 6.0],
        [2.0, 7.0],
        [2.0, 8.0],
        [6.0, 5.0],
        [1.0, 3.0],
        [6.0, 6.0],
    ]
}

/// Eight cities whose greedy tour (about 31.77) is well above the optimum
/// (about 26.23).
fn eight_cities() -> Vec<City> {
    vec![
        [3.0, 9.0],
        [8.0, 2.0],
        [5.0, 9.0],
        [7.0, 9.0],
        [1.0, 9.0],
        [0.0, 7.0],
        [4.0, 8.0],
        [3.0, 3.0],
    ]
}

/// Cost found by searching on one thread from the greedy seed.
fn sequential_cost(job: &TspJob) -> f64 {
    let seeded = SharedState::with_value(MinCost(job.greedy().cost));
    let ctx = Context::new(Arc::new(seeded), None);
    match run_sequential(&job.task(), &ctx).unwrap() {
        JobOutput::Tour(Some(tour)) => tour.cost,
        _ => job.greedy().cost,
    }
}

/// Test: TSP against the sequential search
///
/// Given a ten-city instance
/// When the distributed search finishes
/// Then its cost equals the sequential search and never exceeds greedy
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_tsp_matches_sequential() {
    let cities = ten_cities();
    let job = TspJob::new(cities.clone()).unwrap();

    let cluster = Cluster::<JobTask>::start(3, settings(true, false));
    let result = cluster.solve(job.root()).await;
    let tour = job.collect(result).unwrap();
    cluster.shutdown().await;

    let sequential = sequential_cost(&job);
    assert!((tour.cost - sequential).abs() < EPS, "Distributed {} vs sequential {}", tour.cost, sequential);
    assert!(tour.cost <= job.greedy().cost + EPS);
    assert!((tsp::tour_cost(&cities, &tour.order) - tour.cost).abs() < EPS, "Reported cost should match the order");
}

/// Test: Consecutive TSP jobs on one Space
///
/// Given a Space that just solved the unit square, leaving a bound of 4
/// When a larger instance runs on the same Space
/// Then the old bound prunes nothing and the answer is the true optimum
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_second_tsp_job_ignores_previous_bound() {
    let cluster = Cluster::<JobTask>::start(2, settings(false, false));

    let square = TspJob::new(vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]).unwrap();
    let first = square.collect(cluster.solve(square.root()).await).unwrap();
    assert!((first.cost - 4.0).abs() < EPS);

    let job = TspJob::new(eight_cities()).unwrap();
    let second = job.collect(cluster.solve(job.root()).await).unwrap();
    cluster.shutdown().await;

    let sequential = sequential_cost(&job);
    assert!(sequential < job.greedy().cost - 1.0, "Instance should beat its greedy seed");
    assert!((second.cost - sequential).abs() < EPS, "Second job {} vs sequential {}", second.cost, sequential);
    assert!((second.cost - 26.2346).abs() < 1e-3);
}

/// Test: Mandelbrot rows
///
/// Given a 128-pixel region split into 32-row bands
/// When the job runs on absorbing workers
/// Then every row matches direct rendering
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_mandelbrot_matches_render() {
    let region = Region {
        corner: (-2.0, -1.5),
        edge: 3.0,
        size: 128,
        iteration_limit: 64,
    };
    let job = MandelbrotJob::new(region).unwrap();
    let cluster = Cluster::<JobTask>::start(2, settings(false, true));

    let result = cluster.solve(job.root()).await;
    let rows = match result.into_value() {
        JobOutput::Rows(rows) => rows,
        other => panic!("Expected rows, got {:?}", other),
    };

    assert_eq!(rows, region.render(), "Distributed rows should match direct rendering");
    let image = job.to_image(&rows).unwrap();
    assert_eq!(image.len(), 128);
    cluster.shutdown().await;
}
