//! Rendering of prompt texts, end messages and intent responses.
//!
//! Templates use Tera syntax (`Hello {{ name }}`) and see every session
//! variable plus `session_id` and `user_id`.

use std::error::Error as _;

use tera::{Context, Tera};
use tracing::warn;

use crate::domain::Session;

const CHECK_TEMPLATE_NAME: &str = "__mova_check";

pub fn check_syntax(template: &str) -> Result<(), String> {
    let mut tera = Tera::default();
    tera.add_raw_template(CHECK_TEMPLATE_NAME, template).map(|_| ()).map_err(|error| describe(&error))
}

pub fn render(template: &str, session: &Session) -> Result<String, String> {
    let mut context = Context::new();
    for (name, value) in &session.variables {
        context.insert(name.as_str(), value);
    }
    context.insert("session_id", &session.id.0);
    context.insert("user_id", &session.user_id);

    Tera::one_off(template, &context, false).map_err(|error| describe(&error))
}

/// Renders `template`, falling back to the raw text when rendering fails.
pub fn render_or_raw(template: &str, session: &Session) -> String {
    match render(template, session) {
        Ok(rendered) => rendered,
        Err(error) => {
            warn!(
                event_name = "template.render_failed",
                session_id = %session.id,
                error = %error,
                "template rendering failed; using raw text"
            );
            template.to_string()
        }
    }
}

fn describe(error: &tera::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
