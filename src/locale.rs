//! Error message table.
//!
//! Messages are looked up by dotted key and interpolated with `%{name}`
//! placeholders. Embedders can override individual entries.

use rustc_hash::FxHashMap;

#[derive(Clone, Debug, Default)]
pub struct Locale {
    overrides: FxHashMap<String, String>,
}

fn default_message(key: &str) -> Option<&'static str> {
    let message = match key {
        "errors.syntax.assign" => "Syntax Error in 'assign' - Valid syntax: assign [var] = [source]",
        "errors.syntax.capture" => "Syntax Error in 'capture' - Valid syntax: capture [var]",
        "errors.syntax.case" => "Syntax Error in 'case' - Valid syntax: case [condition]",
        "errors.syntax.case_invalid_when" => {
            "Syntax Error in tag 'case' - Valid when condition: {% when [condition] [or condition2...] %}"
        }
        "errors.syntax.case_invalid_else" => {
            "Syntax Error in tag 'case' - Valid else condition: {% else %} (no parameters) "
        }
        "errors.syntax.for" => "Syntax Error in 'for loop' - Valid syntax: for [item] in [collection]",
        "errors.syntax.for_invalid_in" => "For loops require an 'in' clause",
        "errors.syntax.for_invalid_attribute" => {
            "Invalid attribute in for loop. Valid attributes are limit and offset"
        }
        "errors.syntax.if" => "Syntax Error in tag 'if' - Valid syntax: if [expression]",
        "errors.syntax.include" => {
            "Error in tag 'include' - Valid syntax: include '[template]' (with|for) [object|collection]"
        }
        "errors.syntax.inline_comment_invalid" => {
            "Syntax error in tag '#' - Each line of comments must be prefixed by the '#' character"
        }
        "errors.syntax.invalid_delimiter" => {
            "'%{tag}' is not a valid delimiter for %{block_name} tags. use %{block_delimiter}"
        }
        "errors.syntax.render" => "Syntax error in tag 'render' - Template name must be a quoted string",
        "errors.syntax.tag_never_closed" => "'%{block_name}' tag was never closed",
        "errors.syntax.tag_termination" => {
            "Tag '%{token}' was not properly terminated with regexp: %{tag_end}"
        }
        "errors.syntax.tag_unexpected_args" => "Syntax Error in '%{tag}' - Valid syntax: %{tag}",
        "errors.syntax.unexpected_else" => "%{block_name} tag does not expect 'else' tag",
        "errors.syntax.unexpected_outer_tag" => "Unexpected outer '%{tag}' tag",
        "errors.syntax.unknown_tag" => "Unknown tag '%{tag}'",
        "errors.syntax.variable_termination" => {
            "Variable '%{token}' was not properly terminated with regexp: %{tag_end}"
        }
        "errors.argument.include" => "Argument error in tag 'include' - Illegal template name",
        "errors.disabled.tag" => "usage is not allowed in this context",
        _ => return None,
    };
    Some(message)
}

impl Locale {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the message stored under `key`.
    pub fn set(&mut self, key: impl Into<String>, message: impl Into<String>) {
        self.overrides.insert(key.into(), message.into());
    }

    /// Translate `key`, substituting each `%{name}` with its value.
    ///
    /// Unknown keys translate to `translation missing: KEY`.
    pub fn t(&self, key: &str, vars: &[(&str, &str)]) -> String {
        let template = match self.overrides.get(key) {
            Some(message) => message.as_str(),
            None => match default_message(key) {
                Some(message) => message,
                None => return format!("translation missing: {key}"),
            },
        };
        interpolate(template, vars)
    }
}

fn interpolate(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("%{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let name = &after[..end];
        match vars.iter().find(|(var, _)| *var == name) {
            Some((_, value)) => out.push_str(value),
            None => out.push_str(&rest[start..start + 2 + end + 1]),
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}
