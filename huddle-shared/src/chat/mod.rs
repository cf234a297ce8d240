//! Client-side chat state shared by every front end.

pub mod cache;
pub mod scroll;

pub use cache::ChatCache;
pub use scroll::{ScrollAction, ScrollController, ScrollMetrics};
