use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use stage_engine::{Notice, PlayMode, RunOutcome, Sandbox, Vec2};
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

use super::bootstrap::ShowWiring;

#[derive(Debug, Error)]
pub(crate) enum ShowError {
    #[error("failed to start async runtime: {0}")]
    Runtime(#[source] std::io::Error),
    #[error("show rejected: {0}")]
    Rejected(#[from] Notice),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PerformerSummary {
    pub(crate) name: String,
    pub(crate) position: Vec2,
    pub(crate) rotation_degrees: f32,
    pub(crate) outcome: Option<RunOutcome>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ShowSummary {
    pub(crate) swaps: usize,
    pub(crate) stage_updates: usize,
    pub(crate) performers: Vec<PerformerSummary>,
}

pub(crate) fn run(show: ShowWiring) -> ExitCode {
    match run_blocking(show) {
        Ok(summary) => {
            log_summary(&summary);
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "show_failed");
            ExitCode::FAILURE
        }
    }
}

fn run_blocking(show: ShowWiring) -> Result<ShowSummary, ShowError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(ShowError::Runtime)?;
    runtime.block_on(perform(show))
}

/// Installs the scenario, plays every sprite at once and waits for collision
/// feedback and cooldowns to settle before summarising.
pub(crate) async fn perform(show: ShowWiring) -> Result<ShowSummary, ShowError> {
    let settle = show.config.collision.feedback_window + show.config.collision.cooldown_window;
    let sandbox = Sandbox::start(show.config);
    let stage_updates = Arc::new(AtomicUsize::new(0));
    let watcher = {
        let mut updates = sandbox.subscribe();
        let stage_updates = stage_updates.clone();
        tokio::spawn(async move {
            loop {
                match updates.recv().await {
                    Ok(update) => {
                        stage_updates.fetch_add(1, Ordering::Relaxed);
                        debug!(sprite = %update.sprite_id(), "stage_update");
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "stage_updates_lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    };

    let performers = show.scenario.install(&sandbox)?;
    info!(scenario = %show.source, performers = performers.len(), "show_starting");
    let report = sandbox.play(PlayMode::AllActive).await?;
    tokio::time::sleep(settle).await;
    watcher.abort();

    for logged in sandbox.events().snapshot() {
        debug!(seq = logged.seq, event = %logged.event, "event_log");
    }

    let performers = sandbox
        .sprites()
        .into_iter()
        .map(|sprite| PerformerSummary {
            name: sprite.display_name(),
            position: sprite.position,
            rotation_degrees: sprite.rotation_degrees,
            outcome: report.outcome_for(sprite.id),
        })
        .collect();

    Ok(ShowSummary {
        swaps: sandbox.swap_count(),
        stage_updates: stage_updates.load(Ordering::Relaxed),
        performers,
    })
}

fn log_summary(summary: &ShowSummary) {
    info!(
        swaps = summary.swaps,
        stage_updates = summary.stage_updates,
        "show_complete"
    );
    for performer in &summary.performers {
        info!(
            name = %performer.name,
            x = performer.position.x,
            y = performer.position.y,
            rotation = performer.rotation_degrees,
            outcome = ?performer.outcome,
            "performer_final"
        );
    }
}
