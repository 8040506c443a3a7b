//! Common utilities for view integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use vista_core::{HostView, NodeRef, RevealOptions, TreeChange, ViewNode};
use vista_views::{BranchData, BranchInfo, CommitData, CommitInfo, RepositoryData, ViewSettings};

/// Repository with a checked-out `main` branch holding `commits` commits
pub fn repo(path: &str, commits: usize) -> RepositoryData {
    let mut main = BranchData::new(BranchInfo::new("main").current());
    for i in 0..commits {
        main = main.commit(CommitData::new(CommitInfo {
            sha: format!("sha{}", i),
            message: format!("commit {}", i),
            author: "dev".to_string(),
            date: Utc::now(),
        }));
    }
    RepositoryData::new(path).branch(main)
}

/// Settings with splatting off, so every repository gets its own row
pub fn nested(page_size: usize) -> ViewSettings {
    ViewSettings {
        page_size,
        splat_single_repository: false,
        ..ViewSettings::default()
    }
}

pub fn ids(nodes: &[NodeRef]) -> Vec<String> {
    nodes.iter().map(|n| n.id().to_string()).collect()
}

/// Next change notification, failing the test if none arrives
pub async fn next_change(rx: &mut broadcast::Receiver<TreeChange>) -> TreeChange {
    tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("timed out waiting for a tree change")
        .expect("change channel closed")
}

/// Host view that records every reveal request
#[derive(Default)]
pub struct RecordingHost {
    revealed: Mutex<Vec<String>>,
}

impl RecordingHost {
    pub fn revealed(&self) -> Vec<String> {
        self.revealed.lock().clone()
    }
}

#[async_trait]
impl HostView for RecordingHost {
    async fn reveal(&self, node: NodeRef, _options: RevealOptions) -> anyhow::Result<()> {
        self.revealed.lock().push(node.id().to_string());
        Ok(())
    }
}

pub fn host() -> Arc<RecordingHost> {
    Arc::new(RecordingHost::default())
}
