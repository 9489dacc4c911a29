//! Content rendering and caching pipeline for a self-hosted CMS.
//!
//! Stored content is rendered through runtime-editable Tera templates, kept in
//! a fail-open page cache and decorated with responsive image variants.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod media;
