use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use forkspace::config::Config;
use forkspace::net::{run_worker, Client, Server};
use forkspace::system::{LocalWorker, Space};
use forkspace::tasks::job::{self, FibonacciJob, MandelbrotJob, TspJob};
use forkspace::tasks::{City, JobTask, Region};
use forkspace::{flog, flog_debug, Error, Result};

/// Forkspace - distributed fork-join computing with a central task space
#[derive(Parser, Debug)]
#[command(name = "forkspace")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    FORKSPACE_DEBUG=1     Enable debug logging (alternative to --debug)")]
pub struct Cli {
    /// Enable debug logging (also writes to ~/.forkspace/<role>.log)
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    /// Configuration file (defaults to ~/.forkspace/forkspace.toml)
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Run the Space and accept workers and clients
    Space {
        /// Address to listen on (overrides the config file)
        #[arg(long)]
        listen: Option<String>,

        /// Computers to run inside the Space process
        #[arg(long, default_value_t = 0)]
        local: usize,
    },

    /// Run a Computer connected to a Space
    Computer {
        /// Space address (overrides the config file)
        #[arg(long)]
        space: Option<String>,
    },

    /// Compute a Fibonacci number
    Fib {
        n: u32,

        #[arg(long)]
        space: Option<String>,
    },

    /// Render a region of the Mandelbrot set
    Mandelbrot {
        #[arg(long, default_value_t = -0.7510975859375, allow_hyphen_values = true)]
        real: f64,

        #[arg(long, default_value_t = 0.1315680625, allow_hyphen_values = true)]
        imag: f64,

        #[arg(long, default_value_t = 0.01611)]
        edge: f64,

        /// Pixels per side
        #[arg(long, default_value_t = 1024)]
        size: u32,

        #[arg(long, default_value_t = 512)]
        iterations: u32,

        /// Write the escape counts as JSON to this file
        #[arg(long)]
        output: Option<PathBuf>,

        #[arg(long)]
        space: Option<String>,
    },

    /// Solve a Euclidean travelling salesman instance
    Tsp {
        /// JSON file with an array of [x, y] pairs (a built-in instance if omitted)
        #[arg(long)]
        cities: Option<PathBuf>,

        #[arg(long)]
        space: Option<String>,
    },

    /// Tell the Space and every Computer to shut down
    Stop {
        #[arg(long)]
        space: Option<String>,
    },
}

impl Command {
    fn role(&self) -> &'static str {
        match self {
            Command::Space { .. } => "space",
            Command::Computer { .. } => "computer",
            _ => "client",
        }
    }
}

/// Instance used when `tsp` is run without `--cities`.
const DEFAULT_CITIES: [City; 10] = [
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
];

fn main() -> Result<()> {
    let cli = Cli::parse();
    forkspace::log::init_with_debug(Some(cli.command.role()), cli.debug);

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    flog_debug!("Effective settings: {:?}", config.settings());

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(cli.command, config))
}

async fn run(command: Command, config: Config) -> Result<()> {
    match command {
        Command::Space { listen, local } => {
            let addr = listen.unwrap_or_else(|| config.effective_listen_addr().to_string());
            run_space(&addr, local, &config).await
        }
        Command::Computer { space } => {
            let addr = space.unwrap_or_else(|| config.effective_space_addr().to_string());
            run_worker::<JobTask>(&addr, config.settings()).await
        }
        Command::Fib { n, space } => {
            let job = FibonacciJob::new(n)?;
            let mut client = connect(space, &config).await?;
            let answer = job::run(&mut client, &job).await?;
            println!("fibonacci({}) = {}", n, answer);
            Ok(())
        }
        Command::Mandelbrot {
            real,
            imag,
            edge,
            size,
            iterations,
            output,
            space,
        } => {
            let job = MandelbrotJob::new(Region {
                corner: (real, imag),
                edge,
                size,
                iteration_limit: iterations,
            })?;
            let mut client = connect(space, &config).await?;
            let image = job::run(&mut client, &job).await?;
            let inside = image.iter().flatten().filter(|&&k| k >= iterations).count();
            println!("{}x{} pixels, {} inside the set", size, size, inside);
            if let Some(path) = output {
                fs::write(&path, serde_json::to_vec(&image)?)?;
                println!("Escape counts written to {}", path.display());
            }
            Ok(())
        }
        Command::Tsp { cities, space } => {
            let cities = match cities {
                Some(path) => read_cities(&path)?,
                None => DEFAULT_CITIES.to_vec(),
            };
            let job = TspJob::new(cities)?;
            let mut client = connect(space, &config).await?;
            let tour = job::run(&mut client, &job).await?;
            println!("Minimal tour: {:?}", tour.order);
            println!("Length: {:.6}", tour.cost);
            Ok(())
        }
        Command::Stop { space } => {
            let client = connect(space, &config).await?;
            client.stop().await?;
            println!("Space stopped");
            Ok(())
        }
    }
}

async fn run_space(addr: &str, local: usize, config: &Config) -> Result<()> {
    let space = Space::<JobTask>::new(config.settings());
    let server = Server::bind(space.clone(), addr).await?;

    let mut workers = Vec::with_capacity(local);
    for _ in 0..local {
        workers.push(LocalWorker::attach(&space, config.settings())?);
    }
    if local > 0 {
        flog!("Started {} local computer(s)", local);
    }

    server.run().await?;
    for worker in workers {
        worker.join().await?;
    }
    let stats = space.stats();
    flog!(
        "Space exiting after {} task(s), average task time {:?}",
        stats.tasks_reported,
        stats.average_task_time()
    );
    Ok(())
}

async fn connect(space: Option<String>, config: &Config) -> Result<Client<JobTask>> {
    let addr = space.unwrap_or_else(|| config.effective_space_addr().to_string());
    Client::connect(&addr).await
}

fn read_cities(path: &Path) -> Result<Vec<City>> {
    let cities: Vec<City> = serde_json::from_str(&fs::read_to_string(path)?)?;
    if cities.is_empty() {
        return Err(Error::Validation(format!("{} lists no cities", path.display())));
    }
    Ok(cities)
}
