//! Indented text rendering of a parse report.

use std::fmt::Write;

use metascope_container::{Node, ParseReport, Value};

use crate::config::OutputConfig;

/// Render `report` as an indented `key: value` listing.
pub fn render_report(report: &ParseReport, output: &OutputConfig) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Container: {}", report.kind);
    let _ = writeln!(out, "Fields extracted: {}", report.fields_extracted);
    if let Some(error) = &report.error {
        let _ = writeln!(out, "Error: {}", error);
    }
    out.push('\n');
    render_node(&mut out, &report.tree, 0, output);
    out
}

fn render_node(out: &mut String, node: &Node, level: usize, output: &OutputConfig) {
    for (key, value) in node.iter() {
        if level == 0 && key == "error" {
            continue;
        }
        if key == "warnings" && !output.show_warnings {
            continue;
        }
        render_entry(out, key, value, level, output);
    }
}

fn render_entry(out: &mut String, key: &str, value: &Value, level: usize, output: &OutputConfig) {
    let pad = " ".repeat(level * output.indent);
    match value {
        Value::Map(child) => {
            let _ = writeln!(out, "{}{}:", pad, key);
            render_node(out, child, level + 1, output);
        }
        Value::List(items) if items.iter().any(|v| matches!(v, Value::Map(_))) => {
            let _ = writeln!(out, "{}{}:", pad, key);
            for (i, item) in items.iter().enumerate() {
                render_entry(out, &format!("[{}]", i), item, level + 1, output);
            }
        }
        other => {
            let _ = writeln!(out, "{}{}: {}", pad, key, scalar(other));
        }
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::Str(s) => s.clone(),
        Value::Int(i) => i.to_string(),
        Value::UInt(u) => u.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Bytes(r) => match &r.sha256 {
            Some(hash) => format!("<{} bytes at {}, sha256 {}>", r.size, r.offset, hash),
            None => format!("<{} bytes at {}>", r.size, r.offset),
        },
        Value::List(items) => {
            let parts: Vec<String> = items.iter().map(scalar).collect();
            format!("[{}]", parts.join(", "))
        }
        Value::Map(node) => format!("{{{} entries}}", node.len()),
    }
}
