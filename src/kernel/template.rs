//! Prompt templates with `{{$variable}}` placeholders.

use crate::error::{KernelError, Result};
use crate::kernel::prompt_config::InputVariable;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::warn;

static VARIABLE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*\$([0-9A-Za-z_]+)\s*\}\}").expect("variable pattern compiles")
});

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Text(String),
    Variable(String),
}

/// A parsed prompt template.
///
/// Only `{{$name}}` blocks are substituted; any other `{{...}}` block is
/// kept verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl PromptTemplate {
    pub fn parse(source: impl Into<String>) -> Result<Self> {
        let source = source.into();

        let mut segments = Vec::new();
        let mut last = 0;
        for captures in VARIABLE_PATTERN.captures_iter(&source) {
            let (Some(whole), Some(name)) = (captures.get(0), captures.get(1)) else {
                continue;
            };
            if whole.start() > last {
                segments.push(Segment::Text(source[last..whole.start()].to_string()));
            }
            segments.push(Segment::Variable(name.as_str().to_string()));
            last = whole.end();
        }
        if last < source.len() {
            segments.push(Segment::Text(source[last..].to_string()));
        }

        Ok(Self { source, segments })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Names of the variables referenced, in order of first use.
    pub fn variables(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for segment in &self.segments {
            if let Segment::Variable(name) = segment {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Substitute arguments, falling back to declared defaults.
    ///
    /// A missing variable declared as required is an error; any other
    /// missing variable renders as empty text.
    pub fn render(
        &self,
        arguments: &HashMap<String, Value>,
        declared: &[InputVariable],
    ) -> Result<String> {
        let mut rendered = String::with_capacity(self.source.len());

        for segment in &self.segments {
            match segment {
                Segment::Text(text) => rendered.push_str(text),
                Segment::Variable(name) => {
                    let declaration = declared.iter().find(|v| &v.name == name);
                    let value = arguments
                        .get(name)
                        .filter(|v| !v.is_null())
                        .or_else(|| declaration.and_then(|d| d.default.as_ref()));

                    match value {
                        Some(value) => rendered.push_str(&value_to_text(value)),
                        None if declaration.is_some_and(|d| d.is_required) => {
                            return Err(KernelError::TemplateError(format!(
                                "Missing required variable: {}",
                                name
                            )));
                        }
                        None => {
                            if declaration.is_none() {
                                warn!(variable = %name, "Template variable has no value");
                            }
                        }
                    }
                }
            }
        }

        Ok(rendered)
    }
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
