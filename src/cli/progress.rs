//! Terminal progress bars driven by engine progress events

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::HashMap;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

use crate::downloader::{ProgressEvent, TaskOutcome};

fn batch_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}

fn transfer_style(known_length: bool) -> ProgressStyle {
    let template = if known_length {
        "  {msg:40!} [{bar:30}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})"
    } else {
        "  {spinner} {msg:40!} {bytes} ({bytes_per_sec})"
    };
    ProgressStyle::default_bar()
        .template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

/// Consume `events` until every sender is dropped, drawing one bar for the
/// batch and one per active transfer.
///
/// With `visible == false` the bars are tracked but never drawn, which keeps
/// stdout clean for JSON output.
pub fn spawn_progress_display(
    mut events: UnboundedReceiver<ProgressEvent>,
    total_tasks: usize,
    visible: bool,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let multi = if visible {
            MultiProgress::new()
        } else {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        };
        let batch = multi.add(ProgressBar::new(total_tasks as u64));
        batch.set_style(batch_style());

        let mut transfers: HashMap<usize, ProgressBar> = HashMap::new();
        let mut failed = 0usize;

        while let Some(event) = events.recv().await {
            match event {
                ProgressEvent::Started {
                    index,
                    destination,
                    total_bytes,
                } => {
                    let bar = multi.add(match total_bytes {
                        Some(len) => ProgressBar::new(len),
                        None => ProgressBar::new_spinner(),
                    });
                    bar.set_style(transfer_style(total_bytes.is_some()));
                    bar.set_message(
                        destination
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_default(),
                    );
                    // A retry restarts the transfer from zero.
                    if let Some(previous) = transfers.insert(index, bar) {
                        previous.finish_and_clear();
                        multi.remove(&previous);
                    }
                }
                ProgressEvent::Advanced {
                    index,
                    bytes_downloaded,
                } => {
                    if let Some(bar) = transfers.get(&index) {
                        bar.set_position(bytes_downloaded);
                    }
                }
                ProgressEvent::Finished { index, outcome } => {
                    if let Some(bar) = transfers.remove(&index) {
                        bar.finish_and_clear();
                        multi.remove(&bar);
                    }
                    if matches!(outcome, TaskOutcome::Failed { .. }) {
                        failed += 1;
                        batch.set_message(format!("({failed} failed)"));
                    }
                    batch.inc(1);
                }
            }
        }

        for bar in transfers.into_values() {
            bar.finish_and_clear();
        }
        batch.finish_and_clear();
    })
}
