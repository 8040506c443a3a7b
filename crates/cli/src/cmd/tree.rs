//! Print the view tree of a fixture

use super::Session;
use crate::render;
use anyhow::Result;
use owo_colors::OwoColorize;
use std::path::Path;

pub async fn run(fixture: &Path, depth: usize, page_size: Option<usize>) -> Result<()> {
    let session = Session::open(fixture, page_size)?;
    let rows = render::collect(session.view.tree(), depth).await;

    if rows.is_empty() {
        println!("{}", "(empty)".dimmed());
    }
    render::print_rows(&rows, true);
    Ok(())
}
