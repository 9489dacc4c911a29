use thiserror::Error;

use crate::application::repos::RepoError;
use crate::domain::templates::TemplateType;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("no active `{template_type}` template")]
    TemplateUnavailable { template_type: TemplateType },
    #[error("template does not compile: {message}")]
    TemplateSyntax { message: String },
    #[error("`{template_type}` template failed to render: {message}")]
    RenderFailure {
        template_type: TemplateType,
        message: String,
    },
    #[error("template context could not be serialised: {message}")]
    Context { message: String },
    #[error(transparent)]
    Repository(#[from] RepoError),
}

impl TemplateError {
    pub(crate) fn syntax(err: &tera::Error) -> Self {
        Self::TemplateSyntax {
            message: error_chain(err),
        }
    }

    pub(crate) fn render(template_type: TemplateType, err: &tera::Error) -> Self {
        Self::RenderFailure {
            template_type,
            message: error_chain(err),
        }
    }
}

/// Flatten an error and its sources into one line.
///
/// Tera reports the useful part (line, column, missing variable) in the
/// source chain rather than the top-level message.
pub(crate) fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !text.is_empty() && !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}
