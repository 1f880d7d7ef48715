mod cli;
mod controller;
mod error;
mod metrics;
mod sampler;
mod session;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::error::SampleError;
use crate::session::{run_dashboard, run_measure};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .ok();

    let cli = Cli::parse();
    let result: Result<()> = match cli.command {
        Some(Commands::Measure(measure)) => run_measure(measure),
        Some(Commands::Tui(tui)) => run_dashboard(tui),
        None => {
            Cli::command().print_help().ok();
            println!();
            Ok(())
        }
    };

    if let Err(err) = result {
        let code = exit_code_for_error(&err);
        // Cancellation was already reported to the user
        if code != EXIT_CANCELLED {
            eprintln!("error: {err:?}");
        }
        std::process::exit(code);
    }
}

const EXIT_CANCELLED: i32 = 130;

pub(crate) fn exit_code_for_error(err: &anyhow::Error) -> i32 {
    // 130: cancelled, 3: network failure, 4: zero-duration measurement, 1: other
    for cause in err.chain() {
        if let Some(sample) = cause.downcast_ref::<SampleError>() {
            return match sample {
                SampleError::Cancelled => EXIT_CANCELLED,
                SampleError::Network(_) => 3,
                SampleError::ZeroDuration { .. } => 4,
            };
        }
    }
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;

    #[test]
    fn exit_code_cancelled() {
        let err = anyhow::Error::from(SampleError::Cancelled);
        assert_eq!(exit_code_for_error(&err), 130);
    }

    #[test]
    fn exit_code_network() {
        let err = anyhow::Error::from(SampleError::Network(FetchError::Status(reqwest::StatusCode::BAD_GATEWAY)));
        assert_eq!(exit_code_for_error(&err), 3);
    }

    #[test]
    fn exit_code_zero_duration() {
        let err = anyhow::Error::from(SampleError::ZeroDuration { elapsed_secs: 0.0 });
        assert_eq!(exit_code_for_error(&err), 4);
    }

    #[test]
    fn exit_code_through_context() {
        let err = anyhow::Error::from(SampleError::Cancelled).context("running measure");
        assert_eq!(exit_code_for_error(&err), 130);
    }

    #[test]
    fn exit_code_other() {
        let err = anyhow::anyhow!("other");
        assert_eq!(exit_code_for_error(&err), 1);
    }
}
