//! Dashboard exports written next to the terminal listing.
//!
//! # Submodules
//!
//! - [`json`]: Snapshot of every tab for other tools to consume
//! - [`markdown`]: Human-readable report with one section per tab
//!
//! Both are optional and only written when the `dashboard` command is given
//! a target path. Files are replaced atomically like the collections.

pub mod json;
pub mod markdown;
