use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use clap::ValueEnum;
use rand::Rng;
use tokio::task::JoinSet;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pace_limit::Config;
use pace_limit::LimitError;
use pace_limit::RateLimiter;
use pace_limit::Strategy;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mode {
    FixedWindow,
    MaxConcurrency,
    Throttle,
}

impl From<Mode> for Strategy {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::FixedWindow => Strategy::FixedWindow,
            Mode::MaxConcurrency => Strategy::MaxConcurrency,
            Mode::Throttle => Strategy::Throttle,
        }
    }
}

/// Spawns workers that each wait for a permit, simulate some work and release it.
#[derive(Debug, Parser)]
struct Args {
    #[arg(value_enum)]
    strategy: Mode,

    /// Number of concurrent workers
    #[arg(short, long, default_value_t = 10)]
    workers: usize,

    /// Permits per window, or concurrent leases [default: 5 or 4]
    #[arg(long)]
    limit: Option<usize>,

    #[arg(long, value_parser = humantime::parse_duration, default_value = "15s")]
    fixed_interval: Duration,

    #[arg(long, value_parser = humantime::parse_duration, default_value = "10s")]
    token_resets_after: Duration,

    #[arg(long, value_parser = humantime::parse_duration, default_value = "1s")]
    throttle: Duration,

    /// Upper bound of the simulated work per worker
    #[arg(long, value_parser = humantime::parse_duration, default_value = "5s")]
    max_work: Duration,

    /// Give up waiting for a permit after this long
    #[arg(long, value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,
}

impl Args {
    fn config(&self) -> Config {
        let default_limit = match self.strategy {
            Mode::MaxConcurrency => 4,
            _ => 5,
        };
        Config::new()
            .with_limit(self.limit.unwrap_or(default_limit))
            .with_fixed_interval(self.fixed_interval)
            .with_token_resets_after(self.token_resets_after)
            .with_throttle(self.throttle)
    }
}

async fn do_work(
    worker: usize,
    limiter: Arc<dyn RateLimiter>,
    max_work: Duration,
    timeout: Option<Duration>,
) -> Result<(), LimitError> {
    let permit = match timeout {
        Some(timeout) => limiter.acquire_timeout(timeout).await?,
        None => limiter.acquire().await?,
    };
    info!(worker, %permit, "permit acquired");

    let work = rand::rng().random_range(Duration::ZERO..=max_work);
    info!(worker, ?work, "working");
    tokio::time::sleep(work).await;

    limiter.release(&permit);
    info!(worker, "done");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let strategy = Strategy::from(args.strategy);
    let limiter = pace_limit::build(strategy, &args.config())?;
    info!(%strategy, workers = args.workers, "starting workers");

    let mut workers = JoinSet::new();
    for worker in 0..args.workers {
        let limiter = Arc::clone(&limiter);
        workers.spawn(do_work(worker, limiter, args.max_work, args.timeout));
    }

    let mut cancelled = 0;
    while let Some(outcome) = workers.join_next().await {
        match outcome? {
            Ok(()) => {}
            Err(LimitError::Cancelled) => cancelled += 1,
            Err(e) => return Err(e.into()),
        }
    }
    info!(cancelled, "all workers finished");

    Ok(())
}
