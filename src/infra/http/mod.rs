//! HTTP surface: the public site router and its middleware.

mod middleware;
mod public;

pub use public::{CACHE_STATUS_HEADER, HttpState, build_router};
