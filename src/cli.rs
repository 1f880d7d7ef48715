use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use reqwest::Url;

use crate::sampler::{DEFAULT_PAUSE, DEFAULT_SAMPLES, DEFAULT_TIMEOUT, DEFAULT_URL};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one speed test and print the averaged throughput
    Measure(Measure),
    /// Interactive dashboard; press r to run a test
    Tui(Tui),
}

#[derive(Args, Clone, Debug)]
pub struct Sampling {
    /// Number of sequential downloads to average
    #[arg(long, default_value_t = DEFAULT_SAMPLES, value_parser = clap::value_parser!(u32).range(1..))]
    pub samples: u32,

    /// Pause between samples, in milliseconds
    #[arg(long, default_value_t = DEFAULT_PAUSE.as_millis() as u64)]
    pub pause_ms: u64,

    /// Resource downloaded for each sample
    #[arg(long, default_value = DEFAULT_URL)]
    pub url: Url,

    /// Per-request timeout, in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT.as_secs())]
    pub timeout_secs: u64,
}

impl Sampling {
    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Args, Clone, Debug)]
pub struct Measure {
    #[command(flatten)]
    pub sampling: Sampling,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Args, Clone, Debug)]
pub struct Tui {
    #[command(flatten)]
    pub sampling: Sampling,

    /// Start a test as soon as the dashboard opens
    #[arg(long)]
    pub autostart: bool,
}

#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}
