use crate::db::TemplateRecord;
use anyhow::Result;
use minijinja::Environment;

/// Renders the value of a single template parameter. Values without a
/// brace are literals and skip the template engine entirely.
pub fn render_value(value: &str, context: &serde_json::Value) -> Result<String> {
    if !value.contains('{') {
        return Ok(value.to_string());
    }
    let env = Environment::new();
    Ok(env.render_str(value, context)?)
}

/// Produces the ordered variable → rendered-value mapping for a
/// template. Ordering follows the parameter table, which providers that
/// take positional parameters depend on.
pub fn render_content_variables(
    template: &TemplateRecord,
    context: &serde_json::Value,
) -> Result<serde_json::Map<String, serde_json::Value>> {
    let mut variables = serde_json::Map::new();
    for param in &template.parameters {
        if param.variable.is_empty() {
            continue;
        }
        let rendered = render_value(&param.value, context)?;
        variables.insert(param.variable.clone(), serde_json::Value::String(rendered));
    }
    Ok(variables)
}

/// Renders the template body against an already-rendered variable map.
/// Rendering is deterministic: the same body and variables always yield
/// the same output.
pub fn render_body(
    template: &TemplateRecord,
    variables: &serde_json::Map<String, serde_json::Value>,
) -> Result<String> {
    let env = Environment::new();
    let context = serde_json::Value::Object(variables.clone());
    Ok(env.render_str(&template.body, context)?)
}
