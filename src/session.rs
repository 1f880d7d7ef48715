use std::sync::Arc;

use anyhow::{Context, Result};
use crossbeam_channel as channel;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::cli::{Measure, OutputFormat, Sampling, Tui};
use crate::controller::{Command, RunController};
use crate::error::SampleError;
use crate::metrics::Summary;
use crate::sampler::{HttpFetcher, SpeedSampler};
use crate::ui::overview::run_tui;

fn build_runtime() -> Result<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Building tokio runtime")
}

fn build_sampler(sampling: &Sampling) -> Result<SpeedSampler<HttpFetcher>> {
    let fetcher = HttpFetcher::new(sampling.url.clone(), sampling.timeout())
        .context("Creating HTTP client")?;
    Ok(SpeedSampler::new(fetcher, sampling.pause()))
}

pub(crate) fn render_summary(summary: &Summary, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Text => format!(
            "{}\n{}\n{}",
            summary.bits_label(),
            summary.kb_label(),
            summary.mb_label()
        ),
        OutputFormat::Json => serde_json::to_string_pretty(summary).context("Serializing summary")?,
    })
}

pub fn run_measure(measure: Measure) -> Result<()> {
    let runtime = build_runtime()?;
    let sampler = build_sampler(&measure.sampling)?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        let _ = ctrlc::set_handler(move || {
            cancel.cancel();
        });
    }

    let total = measure.sampling.samples;
    info!(url = %measure.sampling.url, samples = total, pause_ms = measure.sampling.pause_ms, "Starting speed test");
    let result = runtime.block_on(sampler.run_all(total, cancel, |index| {
        eprintln!("Testing... ({index}/{total})");
    }));

    match result {
        Ok(summary) => {
            println!("{}", render_summary(&summary, measure.format)?);
            Ok(())
        }
        Err(e @ SampleError::Cancelled) => {
            eprintln!("Test aborted.");
            Err(e.into())
        }
        Err(e) => {
            error!(error = %e, "Speed test failed");
            Err(e.into())
        }
    }
}

pub fn run_dashboard(tui: Tui) -> Result<()> {
    let runtime = build_runtime()?;
    let sampler = Arc::new(build_sampler(&tui.sampling)?);

    let (event_tx, event_rx) = channel::unbounded();
    let (cmd_tx, cmd_rx) = tokio::sync::mpsc::unbounded_channel();
    let controller = RunController::new(sampler, tui.sampling.samples, event_tx);
    let server = runtime.spawn(controller.serve(cmd_rx));

    let ui_result = run_tui(event_rx, cmd_tx.clone(), tui.autostart, tui.sampling.url.to_string());

    // Make sure the controller winds down even if the UI bailed out early
    let _ = cmd_tx.send(Command::Quit);
    drop(cmd_tx);
    if let Err(e) = runtime.block_on(server) {
        warn!(?e, "Controller task ended abnormally");
    }
    ui_result
}
