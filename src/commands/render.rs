//! Human-readable output for CLI responses.

use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde_json::Value;

use crate::config::DisplayOptions;
use crate::service::{Response, Status};

pub fn print(action: &str, response: &Response, display: &DisplayOptions) {
    for line in render(action, response, display) {
        println!("{}", line);
    }
}

pub fn render(action: &str, response: &Response, display: &DisplayOptions) -> Vec<String> {
    if response.status == Status::Error && response.data.is_null() {
        let code = response.code.as_deref().unwrap_or("ERROR");
        return vec![format!("error [{}]: {}", code, response.message)];
    }

    let mut lines = match action {
        "list" => list_lines(&response.data, display),
        "tree" => {
            let mut lines = Vec::new();
            tree_lines(&response.data, 0, &mut lines);
            lines
        }
        "search" => array(&response.data)
            .iter()
            .filter_map(|hit| hit["path"].as_str().map(str::to_string))
            .collect(),
        "list_trash" => array(&response.data)
            .iter()
            .map(|entry| {
                let origin = entry["record"]["original_path"]
                    .as_str()
                    .unwrap_or("(no metadata)");
                format!("{}  <- {}", text(&entry["name"]), origin)
            })
            .collect(),
        "read_file" => vec![text(&response.data).to_string()],
        _ => vec![response.message.clone()],
    };

    for item in array(&response.data["items"]) {
        if !item["error"].is_null() {
            lines.push(format!(
                "  failed {}: [{}] {}",
                text(&item["name"]),
                text(&item["error"]["code"]),
                text(&item["error"]["message"])
            ));
        }
    }
    lines
}

fn array(value: &Value) -> &[Value] {
    value.as_array().map(Vec::as_slice).unwrap_or(&[])
}

fn text(value: &Value) -> &str {
    value.as_str().unwrap_or("")
}

fn list_lines(data: &Value, display: &DisplayOptions) -> Vec<String> {
    array(data)
        .iter()
        .map(|entry| {
            let is_dir = entry["type"] == "dir";
            let size = if is_dir {
                "-".to_string()
            } else {
                human_size(entry["size"].as_u64().unwrap_or(0))
            };
            format!(
                "{:o}  {:>9}  {}  {}{}",
                entry["permissions"].as_u64().unwrap_or(0),
                size,
                format_timestamp(entry["modified"].as_i64().unwrap_or(0), display),
                text(&entry["name"]),
                if is_dir { "/" } else { "" }
            )
        })
        .collect()
}

fn tree_lines(nodes: &Value, depth: usize, lines: &mut Vec<String>) {
    for node in array(nodes) {
        lines.push(format!("{}{}/", "  ".repeat(depth), text(&node["name"])));
        tree_lines(&node["children"], depth + 1, lines);
    }
}

/// Binary units with two decimals above bytes, e.g. `1.50 KB`.
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}

/// Render unix seconds with the configured format and offset.
pub fn format_timestamp(seconds: i64, display: &DisplayOptions) -> String {
    let offset = FixedOffset::east_opt(display.utc_offset_minutes * 60)
        .unwrap_or_else(|| Utc.fix());
    match DateTime::from_timestamp(seconds, 0) {
        Some(utc) => utc
            .with_timezone(&offset)
            .format(&display.date_format)
            .to_string(),
        None => "-".to_string(),
    }
}
