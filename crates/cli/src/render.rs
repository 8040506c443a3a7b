//! Terminal rendering of a view tree

use async_trait::async_trait;
use owo_colors::OwoColorize;
use parking_lot::Mutex;
use vista_core::{
    Collapsible, DisplayRecord, Expand, HostView, NodeRef, RevealOptions, TreeChange, ViewNode,
    ViewTree,
};

/// One rendered line
#[derive(Debug, Clone)]
pub struct Row {
    pub depth: usize,
    pub record: DisplayRecord,
    /// Whether the row's children follow it
    pub open: bool,
}

/// Walk the tree depth-first, opening collapsed nodes up to `max_depth`
///
/// Nodes that describe themselves as expanded are opened regardless of the
/// depth bound.
pub async fn collect(tree: &ViewTree, max_depth: usize) -> Vec<Row> {
    let mut rows = Vec::new();
    let mut stack: Vec<(NodeRef, usize)> = tree
        .get_children(None)
        .await
        .into_iter()
        .rev()
        .map(|node| (node, 0))
        .collect();

    while let Some((node, depth)) = stack.pop() {
        let record = tree.get_display_record(&node).await;
        let open = match record.collapsible {
            Collapsible::None => false,
            Collapsible::Expanded => true,
            Collapsible::Collapsed => depth < max_depth,
        };

        if open {
            tree.on_expanded(&node);
            let children = tree.get_children(Some(&node)).await;
            stack.extend(children.into_iter().rev().map(|child| (child, depth + 1)));
        }
        rows.push(Row { depth, record, open });
    }
    rows
}

/// Format a row, optionally with terminal colors
pub fn format_row(row: &Row, color: bool) -> String {
    let indent = "  ".repeat(row.depth);
    let marker = match (row.record.collapsible, row.open) {
        (Collapsible::None, _) => "•",
        (_, true) => "▾",
        (_, false) => "▸",
    };

    let mut line = if color {
        format!("{}{} {}", indent, marker.dimmed(), row.record.label.bold())
    } else {
        format!("{}{} {}", indent, marker, row.record.label)
    };
    if let Some(description) = &row.record.description {
        if color {
            line.push_str(&format!("  {}", description.dimmed()));
        } else {
            line.push_str(&format!("  {}", description));
        }
    }
    line
}

pub fn print_rows(rows: &[Row], color: bool) {
    for row in rows {
        println!("{}", format_row(row, color));
    }
}

pub fn describe_change(change: &TreeChange) -> String {
    match change.node_id() {
        Some(id) => format!("node {}", id),
        None => "all".to_string(),
    }
}

pub fn describe_reveal(options: &RevealOptions) -> String {
    let expand = match options.expand {
        Expand::None => "none".to_string(),
        Expand::Node => "node".to_string(),
        Expand::Levels(levels) => format!("{} levels", levels),
    };
    format!("(select={}, focus={}, expand={})", options.select, options.focus, expand)
}

/// Host that prints (and remembers) reveal requests
#[derive(Default)]
pub struct ConsoleHost {
    revealed: Mutex<Vec<String>>,
    quiet: bool,
}

impl ConsoleHost {
    /// Host that only records reveals
    pub fn quiet() -> Self {
        Self {
            revealed: Mutex::new(Vec::new()),
            quiet: true,
        }
    }

    pub fn revealed(&self) -> Vec<String> {
        self.revealed.lock().clone()
    }
}

#[async_trait]
impl HostView for ConsoleHost {
    async fn reveal(&self, node: NodeRef, options: RevealOptions) -> anyhow::Result<()> {
        if !self.quiet {
            println!(
                "{} {} {}",
                "→".green(),
                node.id().cyan(),
                describe_reveal(&options).dimmed()
            );
        }
        self.revealed.lock().push(node.id().to_string());
        Ok(())
    }
}
