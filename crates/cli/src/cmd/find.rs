//! Locate and reveal a repository or commit

use super::Session;
use crate::render::ConsoleHost;
use anyhow::Result;
use owo_colors::OwoColorize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use vista_core::{Expand, RevealOptions, ViewNode};

/// What to look for
pub struct Target {
    pub repository: String,
    /// Branch and commit sha; the repository itself when absent
    pub commit: Option<(String, String)>,
}

/// Focus the match and open it, `levels` deep when given
pub fn reveal_options(levels: Option<u8>) -> RevealOptions {
    let options = RevealOptions::focus_and_expand();
    match levels {
        Some(levels) => RevealOptions {
            expand: Expand::Levels(levels),
            ..options
        },
        None => options,
    }
}

pub async fn run(
    fixture: &Path,
    target: Target,
    options: RevealOptions,
    page_size: Option<usize>,
    timeout: Duration,
) -> Result<()> {
    let session = Session::open(fixture, page_size)?;
    let host = Arc::new(ConsoleHost::default());
    session.view.tree().attach_host(host);

    let found = match &target.commit {
        None => {
            session
                .view
                .reveal_repository(&target.repository, options)
                .await
        }
        Some((branch, sha)) => {
            let token = CancellationToken::new();
            let deadline = token.clone();
            let timer = tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                deadline.cancel();
            });

            let found = session
                .view
                .reveal_commit(
                    &target.repository,
                    branch,
                    sha,
                    options,
                    token,
                )
                .await;
            timer.abort();
            found
        }
    };

    let Some(node) = found else {
        anyhow::bail!("Not found: {}", describe(&target));
    };

    let record = session.view.tree().get_display_record(&node).await;
    println!("{} {}", "✓".green(), node.id().cyan());
    println!("  {}: {}", "label".dimmed(), record.label);
    if let Some(description) = record.description {
        println!("  {}: {}", "description".dimmed(), description);
    }
    if let Some(parent) = node.parent() {
        if let Some(Some(limit)) = session.view.tree().context().last_known_limit(parent.id()) {
            println!("  {}: {} commits loaded", "window".dimmed(), limit);
        }
    }
    Ok(())
}

fn describe(target: &Target) -> String {
    match &target.commit {
        Some((branch, sha)) => format!("{} on {} in {}", sha, branch, target.repository),
        None => format!("repository {}", target.repository),
    }
}
