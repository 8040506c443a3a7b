//! Paging capability
//!
//! A pageable node shows a prefix window of a logically larger child list.
//! The window is described by `limit` (`None` = everything) and `has_more`.

use crate::error::Result;
use async_trait::async_trait;
use parking_lot::Mutex;

/// How far `show_more` should extend a window
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageRequest {
    /// Grow the window by this many items
    Count(usize),
    /// Grow the window until an item with this id (or key) is included
    Until(String),
    /// Drop the limit entirely
    All,
}

/// Nodes whose children are a window over a larger set
#[async_trait]
pub trait Pageable: Send + Sync {
    /// Current window size, `None` when unbounded
    fn limit(&self) -> Option<usize>;

    /// Whether items exist beyond the current window
    fn has_more(&self) -> bool;

    /// Extend the window and refresh the cached children accordingly
    async fn show_more(&self, request: PageRequest) -> Result<()>;
}

/// Window bookkeeping held by pageable nodes
#[derive(Debug)]
pub struct PagingState {
    window: Mutex<Window>,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    limit: Option<usize>,
    has_more: bool,
}

impl PagingState {
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            window: Mutex::new(Window {
                limit,
                has_more: false,
            }),
        }
    }

    pub fn limit(&self) -> Option<usize> {
        self.window.lock().limit
    }

    pub fn has_more(&self) -> bool {
        self.window.lock().has_more
    }

    pub fn set_has_more(&self, has_more: bool) {
        self.window.lock().has_more = has_more;
    }

    /// Reset the window (e.g. on `refresh(reset = true)`)
    pub fn set_limit(&self, limit: Option<usize>) {
        let mut window = self.window.lock();
        window.limit = limit;
        window.has_more = false;
    }

    /// Grow the window by `count` items past what is currently `loaded`
    ///
    /// An unbounded window stays unbounded.
    pub fn grow(&self, count: usize, loaded: usize) -> Option<usize> {
        let mut window = self.window.lock();
        if let Some(limit) = window.limit {
            window.limit = Some(limit.max(loaded) + count);
        }
        window.limit
    }

    /// Remove the limit
    pub fn unbounded(&self) {
        self.window.lock().limit = None;
    }

    /// Cut a complete item list down to the window, updating `has_more`
    pub fn apply<T>(&self, mut items: Vec<T>) -> Vec<T> {
        let mut window = self.window.lock();
        match window.limit {
            Some(limit) if items.len() > limit => {
                items.truncate(limit);
                window.has_more = true;
            }
            _ => window.has_more = false,
        }
        items
    }
}
