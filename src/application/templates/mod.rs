//! Runtime template engine.
//!
//! Templates are user-editable HTML with Tera syntax, stored per
//! [`TemplateType`](crate::domain::templates::TemplateType). The engine
//! compiles the active template of each type lazily, caches the artifact and
//! renders typed contexts with it.

mod compile;
mod context;
mod engine;
mod error;

pub use compile::CompiledTemplate;
pub use context::{
    ArticleLoopContext, FeaturedImage, FooterContext, HeaderContext, PageContext, PostSummaryCtx,
    SiteContext, TemplateContext, declared_variables,
};
pub use engine::{PageInput, TemplateEngine};
pub use error::TemplateError;
