//! Application services for the administrative surface.
//!
//! Every write that can change what the public site renders ends by evicting
//! the affected compiled templates and cached pages.

pub mod content;
pub mod templates;

pub use content::{AdminContentError, ContentAdminService, CreateContentCommand};
pub use templates::{AdminTemplateError, TemplateAdminService};
