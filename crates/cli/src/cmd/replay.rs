//! Replay a fixture's events against a live view
//!
//! After each event the command waits out the debounce window, reports the
//! change notifications the tree emitted, and prints the tree again.

use super::Session;
use crate::fixture;
use crate::render;
use anyhow::Result;
use owo_colors::OwoColorize;
use std::path::Path;
use std::time::Duration;
use tokio::sync::broadcast::error::TryRecvError;
use tracing::warn;

/// Slack on top of the debounce window before changes are collected
const SETTLE: Duration = Duration::from_millis(100);

pub async fn run(fixture: &Path, depth: usize, page_size: Option<usize>) -> Result<()> {
    let session = Session::open(fixture, page_size)?;
    let tree = session.view.tree();
    let mut changes = tree.changes();

    println!("{}", "initial".bold());
    render::print_rows(&render::collect(tree, depth).await, true);

    if session.fixture.events.is_empty() {
        println!("\n{}", "No events to replay".yellow());
        return Ok(());
    }

    for (step, event) in session.fixture.events.iter().enumerate() {
        println!("\n{} {}", format!("[{}]", step + 1).yellow(), event.to_string().bold());
        fixture::apply(event, &session.source, &session.view);

        // Two windows: source-side coalescing, then the refresh itself
        tokio::time::sleep(session.settings.debounce() * 2 + SETTLE).await;

        let mut emitted = 0;
        loop {
            match changes.try_recv() {
                Ok(change) => {
                    emitted += 1;
                    println!("  {} {}", "changed".cyan(), render::describe_change(&change));
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!("Missed {} change notifications", skipped);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        if emitted == 0 {
            println!("  {}", "no changes".dimmed());
        }

        render::print_rows(&render::collect(tree, depth).await, true);
    }
    Ok(())
}
