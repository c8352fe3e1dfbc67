//! # Tollgate CLI
//!
//! Records and inspects rate-limit counters in a shared Redis store.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::signal;

use tollgate_core::ports::CounterStore;
use tollgate_core::{RateLimiter, WaitOptions};
use tollgate_infra::{PooledRedisCounterStore, RedisCounterStore};

mod config;
mod telemetry;

use config::AppConfig;
use telemetry::TelemetryConfig;

#[derive(Debug, Parser)]
#[command(name = "tollgate", version, about = "Sliding-window rate limit counters")]
struct Cli {
    /// Limiter name, the middle segment of every store key.
    #[arg(long, short = 'l', default_value = "default")]
    limiter: String,

    /// Check a connection out of a pool per operation instead of sharing one.
    #[arg(long)]
    pooled: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Record hits for a subject and print the current bucket's count.
    Add {
        subject: String,
        #[arg(long, default_value_t = 1)]
        hits: u32,
    },
    /// Print the approximate hit count over a trailing interval.
    Count {
        subject: String,
        #[arg(long, short, default_value_t = 30)]
        interval: u64,
    },
    /// Exit non-zero if the subject has reached the threshold.
    Check {
        subject: String,
        #[arg(long, short, default_value_t = 30)]
        interval: u64,
        #[arg(long, short, default_value_t = 30)]
        threshold: i64,
    },
    /// Block until the subject is within bounds, then record one hit.
    Wait {
        subject: String,
        #[arg(long, short, default_value_t = 30)]
        interval: u64,
        #[arg(long, short, default_value_t = 30)]
        threshold: i64,
        /// Give up after this many seconds.
        #[arg(long)]
        deadline: Option<u64>,
    },
}

/// How a finished command should end the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Done,
    Exceeded,
}

impl From<Outcome> for ExitCode {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Done => ExitCode::SUCCESS,
            Outcome::Exceeded => ExitCode::FAILURE,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    telemetry::init_telemetry(&TelemetryConfig::from_env());

    let config = AppConfig::from_env()?;
    let store: Arc<dyn CounterStore> = if cli.pooled {
        Arc::new(PooledRedisCounterStore::new(config.redis).await?)
    } else {
        Arc::new(RedisCounterStore::new(config.redis.redis).await?)
    };
    let limiter = RateLimiter::new(cli.limiter, config.limiter, store)?;

    Ok(run(cli.command, &limiter).await?.into())
}

async fn run(command: Command, limiter: &RateLimiter) -> anyhow::Result<Outcome> {
    match command {
        Command::Add { subject, hits } => {
            println!("{}", limiter.add(&subject, hits).await?);
        }
        Command::Count { subject, interval } => {
            println!("{}", limiter.count(&subject, interval).await?);
        }
        Command::Check {
            subject,
            interval,
            threshold,
        } => {
            if limiter.exceeded(&subject, interval, threshold).await? {
                println!("exceeded (threshold {threshold} over {interval}s)");
                return Ok(Outcome::Exceeded);
            }
            println!("within bounds (threshold {threshold} over {interval}s)");
        }
        Command::Wait {
            subject,
            interval,
            threshold,
            deadline,
        } => {
            let options = WaitOptions {
                interval,
                threshold,
                deadline: deadline.map(Duration::from_secs),
            };
            let wait = limiter.exec_within_threshold(&subject, options, || limiter.add(&subject, 1));

            tokio::select! {
                result = wait => {
                    println!("{}", result??);
                }
                _ = signal::ctrl_c() => {
                    tracing::info!(subject = %subject, "Interrupted while waiting");
                }
            }
        }
    }

    Ok(Outcome::Done)
}
