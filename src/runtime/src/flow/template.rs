//! Flow template merging.
//!
//! Templates are decoded into an ordered [`toml::Table`] so every field the
//! template author wrote survives the merge, including ones this tool does
//! not know about.

use std::path::{Path, PathBuf};

use oscar_core::error::{OscarError, Result};
use toml::{Table, Value};

/// Template file names looked up at the artifact root, first match wins.
pub const TEMPLATE_CANDIDATES: [&str; 2] = ["flow.toml", "pipeline.toml"];

/// Key path of the subscription topics inside an instance definition.
pub const TOPICS_PATH: [&str; 3] = ["input", "mqtt", "topics"];

/// User overrides applied to a template.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// Entrypoint written into every step
    pub script: String,
    /// Replaces `input.mqtt.topics` when non-empty
    pub topics: Vec<String>,
    /// Written into every step when set
    pub interval: Option<String>,
}

/// Find the bundled template of an artifact directory.
pub fn find_template(artifact_dir: &Path) -> Option<PathBuf> {
    TEMPLATE_CANDIDATES
        .iter()
        .map(|name| artifact_dir.join(name))
        .find(|path| path.is_file())
}

/// Set `value` at a nested key path, creating intermediate tables.
///
/// Any previous value at the final key is replaced. Fails when an
/// intermediate key already holds something other than a table.
pub fn set_nested(table: &mut Table, path: &[&str], value: Value) -> std::result::Result<(), String> {
    let Some((last, parents)) = path.split_last() else {
        return Err("empty key path".to_string());
    };

    let mut current = table;
    for (depth, key) in parents.iter().enumerate() {
        let entry = current
            .entry(key.to_string())
            .or_insert_with(|| Value::Table(Table::new()));
        current = match entry {
            Value::Table(inner) => inner,
            other => {
                return Err(format!(
                    "'{}' is a {}, not a table",
                    path[..=depth].join("."),
                    other.type_str()
                ))
            }
        };
    }
    current.insert(last.to_string(), value);
    Ok(())
}

/// Overwrite `script` (and `interval` when given) in every step.
///
/// Steps may be an array of tables (`[[steps]]`) or a table of tables
/// (`[steps.name]`). Returns the number of steps updated.
pub fn apply_step_overrides(doc: &mut Table, script: &str, interval: Option<&str>) -> usize {
    let apply = |step: &mut Table| {
        step.insert("script".to_string(), Value::String(script.to_string()));
        if let Some(interval) = interval {
            step.insert("interval".to_string(), Value::String(interval.to_string()));
        }
    };

    let mut updated = 0;
    match doc.get_mut("steps") {
        Some(Value::Array(steps)) => {
            for step in steps.iter_mut() {
                match step {
                    Value::Table(step) => {
                        apply(step);
                        updated += 1;
                    }
                    other => {
                        tracing::warn!(kind = other.type_str(), "Ignoring step that is not a table");
                    }
                }
            }
        }
        Some(Value::Table(steps)) => {
            for (name, step) in steps.iter_mut() {
                match step {
                    Value::Table(step) => {
                        apply(step);
                        updated += 1;
                    }
                    other => {
                        tracing::warn!(step = %name, kind = other.type_str(), "Ignoring step that is not a table");
                    }
                }
            }
        }
        Some(other) => {
            tracing::warn!(kind = other.type_str(), "Template 'steps' is neither an array nor a table");
        }
        None => {}
    }
    updated
}

/// Decode a template and apply the overrides to it.
pub fn merge_template(contents: &str, source: &Path, overrides: &Overrides) -> Result<Table> {
    let template_error = |message: String| OscarError::TemplateError {
        path: source.display().to_string(),
        message,
    };

    let mut doc: Table = toml::from_str(contents).map_err(|e| template_error(e.to_string()))?;
    apply_topics(&mut doc, &overrides.topics).map_err(template_error)?;
    let steps = apply_step_overrides(&mut doc, &overrides.script, overrides.interval.as_deref());

    tracing::debug!(template = %source.display(), steps, "Merged flow template");
    Ok(doc)
}

/// Build the document used when an artifact ships no template.
pub fn minimal_document(overrides: &Overrides) -> Result<Table> {
    let mut step = Table::new();
    step.insert("script".to_string(), Value::String(overrides.script.clone()));
    if let Some(ref interval) = overrides.interval {
        step.insert("interval".to_string(), Value::String(interval.clone()));
    }

    let mut doc = Table::new();
    doc.insert("steps".to_string(), Value::Array(vec![Value::Table(step)]));
    apply_topics(&mut doc, &overrides.topics).map_err(|message| OscarError::TemplateError {
        path: "<generated>".to_string(),
        message,
    })?;
    Ok(doc)
}

fn apply_topics(doc: &mut Table, topics: &[String]) -> std::result::Result<(), String> {
    if topics.is_empty() {
        return Ok(());
    }
    let value = Value::Array(topics.iter().cloned().map(Value::String).collect());
    set_nested(doc, &TOPICS_PATH, value)
}
