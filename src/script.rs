//! wrk Lua script generation.
//!
//! Scripts are a pure function of a definition's method, body and headers, so
//! regenerating them on every run is idempotent.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::BenchmarkDefinition;
use crate::prelude::*;

pub fn script_name(definition: &BenchmarkDefinition) -> String {
    format!(
        "{}_{}.lua",
        definition.name,
        definition.method.to_lowercase()
    )
}

pub fn render(definition: &BenchmarkDefinition) -> String {
    let mut lines = vec![format!("wrk.method = {}", lua_double_quoted(&definition.method))];

    if let Some(body) = definition.request_body() {
        lines.push(format!("wrk.body = {}", lua_single_quoted(&body.to_string())));
        lines.push(r#"wrk.headers["Content-Type"] = "application/json""#.to_string());
    }
    for (key, value) in &definition.headers {
        lines.push(format!(
            "wrk.headers[{}] = {}",
            lua_double_quoted(key),
            lua_double_quoted(value)
        ));
    }

    lines.join("\n")
}

/// Writes the script for `definition` into `dir`, replacing any previous one.
pub fn generate(definition: &BenchmarkDefinition, dir: &Path) -> Result<PathBuf> {
    let path = dir.join(script_name(definition));
    fs::write(&path, render(definition))?;
    Ok(path)
}

pub fn generate_all(
    definitions: &[BenchmarkDefinition],
    dir: &Path,
) -> Result<HashMap<String, PathBuf>> {
    fs::create_dir_all(dir)?;
    let mut scripts = HashMap::new();
    for definition in definitions {
        let path = generate(definition, dir)?;
        info!("Generated {:?} for {} test", path, definition.name);
        scripts.insert(definition.name.clone(), path);
    }
    Ok(scripts)
}

fn lua_escape(s: &str, quote: char) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out
}

fn lua_double_quoted(s: &str) -> String {
    format!("\"{}\"", lua_escape(s, '"'))
}

fn lua_single_quoted(s: &str) -> String {
    format!("'{}'", lua_escape(s, '\''))
}
