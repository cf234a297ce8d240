#![cfg_attr(not(test), forbid(unsafe_code))]
#![warn(clippy::pedantic)]
#![allow(clippy::multiple_crate_versions)]

//! Client library behind the `huddle` command: typed API calls, the paginated
//! history cache driver, the push listener and the live chat loop.

pub mod client;
