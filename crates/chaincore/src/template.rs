//! `{{ path }}` placeholders in operation options, resolved against the
//! keyed data before a handler runs.

use crate::context::KeyedData;
use handlebars::Handlebars;
use serde_json::Value;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Render every string in `options`, recursing through arrays and objects.
pub fn render_options(options: &Value, data: &KeyedData) -> Value {
    let mut handlebars = Handlebars::new();
    // Options are data, not HTML.
    handlebars.register_escape_fn(handlebars::no_escape);
    render_value(options, &handlebars, data)
}

fn render_value(value: &Value, handlebars: &Handlebars, data: &KeyedData) -> Value {
    match value {
        Value::String(text) => render_string(text, handlebars, data),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| render_value(item, handlebars, data))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| (key.clone(), render_value(value, handlebars, data)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn render_string(text: &str, handlebars: &Handlebars, data: &KeyedData) -> Value {
    if !text.contains(OPEN) {
        return Value::String(text.to_string());
    }
    // A lone placeholder keeps the referenced value's type.
    if let Some(path) = single_placeholder(text) {
        return data.get_path(path).cloned().unwrap_or(Value::Null);
    }

    match handlebars.render_template(text, data.as_map()) {
        Ok(rendered) => Value::String(rendered),
        Err(e) => {
            tracing::debug!("Leaving option unrendered: {}", e);
            Value::String(text.to_string())
        }
    }
}

/// Path of a string that is exactly one plain `{{ path }}` expression.
fn single_placeholder(text: &str) -> Option<&str> {
    let inner = text.trim().strip_prefix(OPEN)?.strip_suffix(CLOSE)?.trim();
    let plain = inner
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '$' | '_' | '-' | '.'));
    if inner.is_empty() || !plain {
        return None;
    }
    Some(inner)
}
