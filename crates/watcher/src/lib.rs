//! Change-event plumbing for Vista views
//!
//! This crate provides:
//! - Trailing-edge debouncing of bursty events (`ChangeAggregator`)
//! - Repository change reasons and per-repository coalescing
//!
//! Nothing here knows about view nodes; subscribers own an aggregator and
//! decide what a coalesced batch means for them.

pub mod debounce;
pub mod reasons;

pub use debounce::{ChangeAggregator, DEFAULT_DEBOUNCE};
pub use reasons::{ChangeReason, ChangeReasons, RepositoryChange, RepositorySetChanged};
