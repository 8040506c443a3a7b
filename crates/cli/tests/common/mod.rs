//! Common utilities for CLI integration tests

#![allow(dead_code)]

use cli_lib::fixture::Fixture;
use std::path::PathBuf;
use tempfile::TempDir;

/// Two repositories; `app` has three commits on `main`, listed two at a time
pub const TWO_REPOSITORIES: &str = r#"
[views]
page_size = 2
debounce_ms = 50
splat_single_repository = false

[[repositories]]
path = "/work/app"

[[repositories.branches]]
name = "main"
current = true

[[repositories.branches.commits]]
sha = "c3"
message = "Third"
author = "dev"
date = "2024-03-03T10:00:00Z"

[[repositories.branches.commits]]
sha = "c2"
message = "Second"
author = "dev"
date = "2024-03-02T10:00:00Z"

[[repositories.branches.commits]]
sha = "c1"
message = "First"
author = "dev"
date = "2024-03-01T10:00:00Z"

[[repositories]]
path = "/work/lib"

[[events]]
kind = "close"
path = "/work/lib"

[[events]]
kind = "change"
path = "/work/app"
reasons = ["index"]
"#;

/// Fixture written to a temporary directory
pub struct FixtureFile {
    pub dir: TempDir,
    pub path: PathBuf,
}

pub fn write_fixture(text: &str) -> FixtureFile {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("fixture.toml");
    std::fs::write(&path, text).expect("Failed to write fixture");
    FixtureFile { dir, path }
}

pub fn load(text: &str) -> Fixture {
    let file = write_fixture(text);
    Fixture::load(&file.path).expect("Failed to load fixture")
}
