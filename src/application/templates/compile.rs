//! Isolated compilation of user-supplied template source.

use std::collections::HashMap;

use tera::{Tera, Value};
use uuid::Uuid;

use super::error::TemplateError;
use crate::domain::templates::{TemplateSource, TemplateType};

/// Registration name; the `.html` suffix turns autoescaping on.
const TEMPLATE_NAME: &str = "template.html";

/// Built-in functions that would let a template read process state.
const DISABLED_FUNCTIONS: &[&str] = &["get_env"];

/// A parsed template ready to execute.
///
/// Each artifact owns a private [`Tera`] holding exactly one template, so
/// `{% include %}`, `{% extends %}` and `{% import %}` can only refer to
/// templates that do not exist and fail.
#[derive(Debug)]
pub struct CompiledTemplate {
    template_type: TemplateType,
    id: Option<Uuid>,
    version: i64,
    tera: Tera,
}

impl CompiledTemplate {
    /// Compile a stored template row.
    pub fn from_source(
        template_type: TemplateType,
        source: &TemplateSource,
    ) -> Result<Self, TemplateError> {
        let tera = build(&source.html_source)?;
        Ok(Self {
            template_type,
            id: Some(source.id),
            version: source.version,
            tera,
        })
    }

    /// Compile unsaved source text.
    pub fn standalone(template_type: TemplateType, source: &str) -> Result<Self, TemplateError> {
        Ok(Self {
            template_type,
            id: None,
            version: 0,
            tera: build(source)?,
        })
    }

    pub fn template_type(&self) -> TemplateType {
        self.template_type
    }

    pub fn id(&self) -> Option<Uuid> {
        self.id
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn execute(&self, context: &tera::Context) -> Result<String, TemplateError> {
        self.tera
            .render(TEMPLATE_NAME, context)
            .map_err(|err| TemplateError::render(self.template_type, &err))
    }
}

fn build(source: &str) -> Result<Tera, TemplateError> {
    let mut tera = Tera::default();
    for name in DISABLED_FUNCTIONS {
        tera.register_function(name, disabled_function);
    }
    tera.add_raw_template(TEMPLATE_NAME, source)
        .map_err(|err| TemplateError::syntax(&err))?;
    Ok(tera)
}

fn disabled_function(_: &HashMap<String, Value>) -> tera::Result<Value> {
    Err(tera::Error::msg(
        "this function is not available in site templates",
    ))
}
