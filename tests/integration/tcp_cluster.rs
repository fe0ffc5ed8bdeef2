//! Space, Computers and client as separate endpoints over TCP.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use forkspace::config::Settings;
use forkspace::net::codec::FrameWriter;
use forkspace::net::{run_worker, Client, Hello, Server};
use forkspace::system::Space;
use forkspace::tasks::job::{self, FibonacciJob, MandelbrotJob, TspJob};
use forkspace::tasks::mandelbrot::Region;
use forkspace::tasks::JobTask;
use forkspace::util::with_timeout;
use forkspace::Result;

use super::fixtures::{settings, JOB_TIMEOUT};

struct TcpCluster {
    space: Arc<Space<JobTask>>,
    addr: String,
    server: JoinHandle<Result<()>>,
    workers: Vec<JoinHandle<Result<()>>>,
}

impl TcpCluster {
    async fn start(workers: usize, settings: Settings) -> Self {
        let space = Space::<JobTask>::new(settings);
        let server = Server::bind(Arc::clone(&space), "127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap().to_string();
        let server = tokio::spawn(server.run());

        let workers = (0..workers)
            .map(|_| {
                let addr = addr.clone();
                tokio::spawn(async move { run_worker::<JobTask>(&addr, settings).await })
            })
            .collect();
        let cluster = Self {
            space,
            addr,
            server,
            workers,
        };
        cluster.wait_for_workers(cluster.workers.len()).await;
        cluster
    }

    async fn wait_for_workers(&self, count: usize) {
        let space = Arc::clone(&self.space);
        with_timeout(Duration::from_secs(10), async move {
            while space.worker_count() != count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            Ok(())
        })
        .await
        .expect("Workers did not register");
    }

    async fn client(&self) -> Client<JobTask> {
        Client::connect(&self.addr).await.unwrap()
    }

    /// Stop through a client and check every endpoint exits cleanly.
    async fn stop(self) {
        self.client().await.stop().await.unwrap();
        for worker in self.workers {
            let outcome = with_timeout(Duration::from_secs(10), async { Ok(worker.await) })
                .await
                .expect("Worker did not exit")
                .expect("Worker panicked");
            assert!(outcome.is_ok(), "Worker should exit cleanly: {:?}", outcome.err());
        }
        let served = with_timeout(Duration::from_secs(10), async { Ok(self.server.await) })
            .await
            .expect("Server did not exit")
            .expect("Server panicked");
        assert!(served.is_ok());
    }
}

/// Test: All three domains over sockets
///
/// Given a Space server and two remote Computers
/// When a client runs a Fibonacci, a TSP and a Mandelbrot job in turn
/// Then each answer matches its local reference
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_jobs_over_tcp() {
    let cluster = TcpCluster::start(2, settings(false, false)).await;
    let mut client = cluster.client().await;

    let fib = FibonacciJob::new(15).unwrap();
    let answer = with_timeout(JOB_TIMEOUT, job::run(&mut client, &fib)).await.unwrap();
    assert_eq!(answer, 610);

    let square = TspJob::new(vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]).unwrap();
    let tour = with_timeout(JOB_TIMEOUT, job::run(&mut client, &square)).await.unwrap();
    assert!((tour.cost - 4.0).abs() < 1e-9, "Square tour should cost 4, got {}", tour.cost);

    let region = Region {
        corner: (-0.75, 0.1),
        edge: 0.05,
        size: 64,
        iteration_limit: 48,
    };
    let mandelbrot = MandelbrotJob::new(region).unwrap();
    let image = with_timeout(JOB_TIMEOUT, job::run(&mut client, &mandelbrot)).await.unwrap();
    assert_eq!(image, mandelbrot.to_image(&region.render()).unwrap());

    drop(client);
    cluster.stop().await;
}

/// Test: Multicore remote workers with Join absorption
///
/// Given remote Computers that run a pool and a Space absorbing Joins
/// When fib(18) runs
/// Then the answer is 2584
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_absorbing_cluster_over_tcp() {
    let cluster = TcpCluster::start(2, settings(true, true)).await;
    let mut client = cluster.client().await;

    let fib = FibonacciJob::new(18).unwrap();
    let answer = with_timeout(JOB_TIMEOUT, job::run(&mut client, &fib)).await.unwrap();
    assert_eq!(answer, 2584);

    drop(client);
    cluster.stop().await;
}

/// Test: A worker that hangs up
///
/// Given a raw connection that registers as a worker
/// When it closes the socket
/// Then the Space deregisters it
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dropped_connection_deregisters_worker() {
    let cluster = TcpCluster::start(0, settings(false, false)).await;

    let stream = TcpStream::connect(&cluster.addr).await.unwrap();
    let mut writer = FrameWriter::new(stream);
    writer.send(&Hello::Worker { parallelism: 1 }).await.unwrap();
    cluster.wait_for_workers(1).await;

    drop(writer);
    cluster.wait_for_workers(0).await;
    assert!(!cluster.space.is_stopped());
    cluster.stop().await;
}
