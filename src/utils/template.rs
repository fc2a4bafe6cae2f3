use crate::errors::ToolError;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([^{}]+)\}").expect("placeholder regex"));

/// Names of the `{placeholder}` segments in `template`, in order of appearance.
pub fn placeholders(template: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for caps in PLACEHOLDER.captures_iter(template) {
        let name = caps[1].to_string();
        if !out.contains(&name) {
            out.push(name);
        }
    }
    out
}

/// Replaces every `{name}` with `lookup(name)`. A placeholder the lookup
/// cannot fill is an invalid-params error naming it.
pub fn substitute<F>(template: &str, mut lookup: F) -> Result<String, ToolError>
where
    F: FnMut(&str) -> Option<String>,
{
    let mut missing: Option<String> = None;
    let out = PLACEHOLDER.replace_all(template, |caps: &Captures| {
        let name = &caps[1];
        match lookup(name) {
            Some(value) => value,
            None => {
                missing.get_or_insert_with(|| name.to_string());
                String::new()
            }
        }
    });
    if let Some(name) = missing {
        return Err(ToolError::invalid_params(format!(
            "Missing value for placeholder '{}' in {}",
            name, template
        )));
    }
    Ok(out.into_owned())
}
