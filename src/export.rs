//! Export the current window for downstream consumers.
//!
//! Two stable payloads: a JSON dump of the live window (for report
//! renderers and other append-only readers) and an AI-context Markdown
//! file that groups records for direct use as model context — breaking
//! changes first, then by category.

use anyhow::Result;
use serde::Serialize;
use sqlx::SqlitePool;
use std::path::Path;

use crate::models::Record;
use crate::store;

#[derive(Serialize)]
struct WindowPayload<'a> {
    generated_at: String,
    total: usize,
    records: &'a [Record],
}

/// Human-facing names for the category groups in the Markdown export.
const CATEGORY_SECTIONS: &[(&str, &str)] = &[
    ("framework", "Framework updates"),
    ("llm", "Model releases and LLM news"),
    ("rag", "RAG techniques"),
    ("agent", "AI agents"),
    ("workflow", "Workflow tooling"),
    ("paper", "Papers"),
    ("other", "Other"),
];

/// Export the window as JSON.
///
/// If `output` is `Some`, writes to that file path. Otherwise writes to
/// stdout for piping.
pub async fn run_export_json(pool: &SqlitePool, output: Option<&Path>) -> Result<()> {
    let records = store::window(pool).await?;
    let payload = WindowPayload {
        generated_at: chrono::Utc::now().to_rfc3339(),
        total: records.len(),
        records: &records,
    };
    let json = serde_json::to_string_pretty(&payload)?;

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, &json)?;
            eprintln!("Exported {} records to {}", records.len(), path.display());
        }
        None => println!("{}", json),
    }

    Ok(())
}

/// Write the AI-context Markdown file and return its rendered content.
pub async fn run_export_context(pool: &SqlitePool, output: &Path) -> Result<String> {
    let records = store::window(pool).await?;
    let content = render_context(&records, &chrono::Utc::now().format("%Y-%m-%d %H:%M").to_string());

    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(output, &content)?;
    Ok(content)
}

/// Render the window as AI-friendly Markdown.
pub fn render_context(records: &[Record], generated_at: &str) -> String {
    let mut lines: Vec<String> = vec![
        "# AI trend data context".to_string(),
        format!("Generated: {generated_at}"),
        format!("Records: {} (filtered and scored)", records.len()),
        String::new(),
        "---".to_string(),
        String::new(),
    ];

    let breaking: Vec<&Record> = records.iter().filter(|r| r.is_breaking_change).collect();
    if !breaking.is_empty() {
        lines.push("## Breaking changes (attention required)".to_string());
        lines.push(String::new());
        for (idx, record) in breaking.iter().enumerate() {
            lines.extend(format_record(idx + 1, record));
        }
        lines.push(String::new());
    }

    let rest: Vec<&Record> = records.iter().filter(|r| !r.is_breaking_change).collect();
    for (category, section_name) in CATEGORY_SECTIONS {
        let section: Vec<&&Record> = rest
            .iter()
            .filter(|r| r.primary_category() == *category)
            .collect();
        if section.is_empty() {
            continue;
        }
        lines.push(format!("## {section_name}"));
        lines.push(String::new());
        for (idx, record) in section.iter().enumerate() {
            lines.extend(format_record(idx + 1, record));
        }
        lines.push(String::new());
    }

    lines.join("\n")
}

fn format_record(idx: usize, record: &Record) -> Vec<String> {
    let marker = if record.is_breaking_change {
        " **[BREAKING]**"
    } else {
        ""
    };
    let summary = if record.body_excerpt.is_empty() {
        "(no summary)".to_string()
    } else {
        record
            .body_excerpt
            .chars()
            .take(200)
            .collect::<String>()
            .replace('\n', " ")
    };
    vec![
        format!(
            "{idx}. **{}**{marker} — {} (score: {})",
            record.title, record.source_name, record.score
        ),
        format!("   - url: {}", record.url),
        format!("   - date: {}", record.published_at.format("%Y-%m-%d")),
        format!("   - summary: {summary}"),
        String::new(),
    ]
}
