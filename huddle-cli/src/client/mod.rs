//! HTTP client side of Huddle: API calls, paginated history, push listener
//! and the live chat loop.

pub mod api;
pub mod live;
pub mod pagination;
pub mod push;
