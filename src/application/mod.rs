//! Application services layer.

pub mod admin;
pub mod error;
pub mod repos;
pub mod site;
pub mod templates;
pub mod uploads;
