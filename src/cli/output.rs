use std::fmt::Write as FmtWrite;

use crate::models::{OutputFormat, SearchResults};
use crate::services::OperationSummary;

pub trait Formatter {
    fn format_search_results(&self, results: &SearchResults) -> String;
    fn format_status(&self, status: &StatusInfo) -> String;
    fn format_index_stats(&self, stats: &IndexStats) -> String;
    fn format_message(&self, message: &str) -> String;
    fn format_error(&self, error: &str) -> String;
}

#[derive(Debug, Clone)]
pub struct StatusInfo {
    pub embedding_url: String,
    pub embedding_model: String,
    pub embedding_reachable: bool,
    /// Model id the server reports, when it reports one.
    pub served_model: Option<String>,
    pub store_backend: String,
    pub store_location: String,
    pub store_connected: bool,
    pub collection: String,
    pub chunk_count: u64,
    pub operations: Vec<OperationSummary>,
}

#[derive(Debug, Clone, Default)]
pub struct IndexStats {
    pub files_scanned: u64,
    pub files_indexed: u64,
    pub files_skipped: u64,
    pub files_failed: u64,
    pub chunks_created: u64,
    pub duration_ms: u64,
}

pub struct TextFormatter;

impl Formatter for TextFormatter {
    fn format_search_results(&self, results: &SearchResults) -> String {
        if results.is_empty() {
            if results.degraded {
                return format!(
                    "No results for: {} (a dependency was unavailable, try again)\n",
                    results.query
                );
            }
            return format!("No results found for: {}\n", results.query);
        }

        let mut output = String::new();
        writeln!(output, "Search results for: \"{}\"", results.query).unwrap();
        writeln!(
            output,
            "Found {} results in {}ms\n",
            results.len(),
            results.duration_ms
        )
        .unwrap();

        for (i, result) in results.results.iter().enumerate() {
            writeln!(output, "{}. [Score: {:.3}]", i + 1, result.score).unwrap();
            writeln!(
                output,
                "   Source: {} (chunk {})",
                result.chunk.source_name, result.chunk.chunk_index
            )
            .unwrap();
            writeln!(output, "   ---").unwrap();

            let preview: String = result.chunk.content.chars().take(200).collect();
            let preview = if result.chunk.content.chars().count() > 200 {
                format!("{}...", preview)
            } else {
                preview
            };
            for line in preview.lines() {
                writeln!(output, "   {}", line).unwrap();
            }
            writeln!(output).unwrap();
        }

        output
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let mut output = String::new();
        writeln!(output, "Status").unwrap();
        writeln!(output, "------").unwrap();

        let embedding_status = if status.embedding_reachable {
            "[REACHABLE]"
        } else {
            "[UNREACHABLE]"
        };
        writeln!(output, "Embedding:     {}", embedding_status).unwrap();
        writeln!(output, "  URL:         {}", status.embedding_url).unwrap();
        writeln!(output, "  Model:       {}", status.embedding_model).unwrap();
        if let Some(ref served) = status.served_model {
            writeln!(output, "  Serving:     {}", served).unwrap();
        }
        writeln!(output).unwrap();

        let store_status = if status.store_connected {
            "[CONNECTED]"
        } else {
            "[DISCONNECTED]"
        };
        writeln!(
            output,
            "Vector Store:  {} ({})",
            status.store_backend, store_status
        )
        .unwrap();
        writeln!(output, "  Location:    {}", status.store_location).unwrap();
        writeln!(output, "  Collection:  {}", status.collection).unwrap();
        if status.store_connected {
            writeln!(output, "  Chunks:      {}", status.chunk_count).unwrap();
        }

        if !status.operations.is_empty() {
            writeln!(output).unwrap();
            writeln!(output, "Recent operations:").unwrap();
            for op in &status.operations {
                write!(
                    output,
                    "  {:<8} {} runs, avg {}ms",
                    op.operation, op.total, op.avg_duration_ms
                )
                .unwrap();
                if op.error_rate > 0.0 {
                    write!(output, ", {:.1}% errors", op.error_rate).unwrap();
                }
                writeln!(output).unwrap();
            }
        }

        output
    }

    fn format_index_stats(&self, stats: &IndexStats) -> String {
        let mut output = String::new();
        writeln!(output, "Indexing Complete").unwrap();
        writeln!(output, "-----------------").unwrap();
        writeln!(output, "Files scanned: {}", stats.files_scanned).unwrap();
        writeln!(output, "Files indexed: {}", stats.files_indexed).unwrap();
        writeln!(output, "Files skipped: {}", stats.files_skipped).unwrap();
        if stats.files_failed > 0 {
            writeln!(output, "Files failed: {}", stats.files_failed).unwrap();
        }
        writeln!(output, "Chunks created: {}", stats.chunks_created).unwrap();
        writeln!(output, "Duration: {}ms", stats.duration_ms).unwrap();
        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("{}\n", message)
    }

    fn format_error(&self, error: &str) -> String {
        format!("Error: {}\n", error)
    }
}

pub struct JsonFormatter {
    pub pretty: bool,
}

impl JsonFormatter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }
}

impl Formatter for JsonFormatter {
    fn format_search_results(&self, results: &SearchResults) -> String {
        if self.pretty {
            serde_json::to_string_pretty(results)
                .unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
        } else {
            serde_json::to_string(results).unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
        }
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let json = serde_json::json!({
            "embedding": {
                "url": status.embedding_url,
                "model": status.embedding_model,
                "reachable": status.embedding_reachable,
                "served_model": status.served_model,
            },
            "vector_store": {
                "backend": status.store_backend,
                "location": status.store_location,
                "connected": status.store_connected,
                "collection": status.collection,
                "chunks": status.chunk_count,
            },
            "operations": status.operations,
        });

        if self.pretty {
            serde_json::to_string_pretty(&json).unwrap()
        } else {
            serde_json::to_string(&json).unwrap()
        }
    }

    fn format_index_stats(&self, stats: &IndexStats) -> String {
        let json = serde_json::json!({
            "files_scanned": stats.files_scanned,
            "files_indexed": stats.files_indexed,
            "files_skipped": stats.files_skipped,
            "files_failed": stats.files_failed,
            "chunks_created": stats.chunks_created,
            "duration_ms": stats.duration_ms,
        });

        if self.pretty {
            serde_json::to_string_pretty(&json).unwrap()
        } else {
            serde_json::to_string(&json).unwrap()
        }
    }

    fn format_message(&self, message: &str) -> String {
        serde_json::json!({"message": message}).to_string()
    }

    fn format_error(&self, error: &str) -> String {
        serde_json::json!({"error": error}).to_string()
    }
}

pub struct MarkdownFormatter;

impl Formatter for MarkdownFormatter {
    fn format_search_results(&self, results: &SearchResults) -> String {
        if results.is_empty() {
            if results.degraded {
                return format!(
                    "## No results\n\nQuery: `{}`\n\n*A dependency was unavailable; try again.*\n",
                    results.query
                );
            }
            return format!("## No results found\n\nQuery: `{}`\n", results.query);
        }

        let mut output = String::new();
        writeln!(output, "## Search Results\n").unwrap();
        writeln!(output, "**Query:** `{}`\n", results.query).unwrap();
        writeln!(
            output,
            "Found {} results in {}ms\n",
            results.len(),
            results.duration_ms
        )
        .unwrap();

        for (i, result) in results.results.iter().enumerate() {
            writeln!(output, "### {}. Score: {:.3}\n", i + 1, result.score).unwrap();
            writeln!(
                output,
                "**Source:** `{}` (chunk {})\n",
                result.chunk.source_name, result.chunk.chunk_index
            )
            .unwrap();
            writeln!(output, "```").unwrap();
            writeln!(output, "{}", result.chunk.content).unwrap();
            writeln!(output, "```\n").unwrap();
        }

        output
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let mut output = String::new();
        writeln!(output, "## Status\n").unwrap();

        let embedding_status = if status.embedding_reachable {
            "✅"
        } else {
            "❌"
        };
        writeln!(output, "### Embedding {}\n", embedding_status).unwrap();
        writeln!(output, "- **URL:** `{}`", status.embedding_url).unwrap();
        writeln!(output, "- **Model:** {}", status.embedding_model).unwrap();
        if let Some(ref served) = status.served_model {
            writeln!(output, "- **Serving:** {}", served).unwrap();
        }
        writeln!(output).unwrap();

        let store_status = if status.store_connected { "✅" } else { "❌" };
        writeln!(
            output,
            "### Vector Store ({}) {}\n",
            status.store_backend, store_status
        )
        .unwrap();
        writeln!(output, "- **Location:** `{}`", status.store_location).unwrap();
        writeln!(output, "- **Collection:** {}", status.collection).unwrap();
        writeln!(output, "- **Chunks:** {}", status.chunk_count).unwrap();

        if !status.operations.is_empty() {
            writeln!(output).unwrap();
            writeln!(output, "### Recent Operations\n").unwrap();
            writeln!(output, "| Operation | Runs | Avg | Errors |").unwrap();
            writeln!(output, "|-----------|------|-----|--------|").unwrap();
            for op in &status.operations {
                writeln!(
                    output,
                    "| {} | {} | {}ms | {:.1}% |",
                    op.operation, op.total, op.avg_duration_ms, op.error_rate
                )
                .unwrap();
            }
        }

        output
    }

    fn format_index_stats(&self, stats: &IndexStats) -> String {
        let mut output = String::new();
        writeln!(output, "## Indexing Complete\n").unwrap();
        writeln!(output, "| Metric | Value |").unwrap();
        writeln!(output, "|--------|-------|").unwrap();
        writeln!(output, "| Files scanned | {} |", stats.files_scanned).unwrap();
        writeln!(output, "| Files indexed | {} |", stats.files_indexed).unwrap();
        writeln!(output, "| Files skipped | {} |", stats.files_skipped).unwrap();
        writeln!(output, "| Files failed | {} |", stats.files_failed).unwrap();
        writeln!(output, "| Chunks created | {} |", stats.chunks_created).unwrap();
        writeln!(output, "| Duration | {}ms |", stats.duration_ms).unwrap();
        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("> {}\n", message)
    }

    fn format_error(&self, error: &str) -> String {
        format!("> ⚠️ **Error:** {}\n", error)
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter),
        OutputFormat::Json => Box::new(JsonFormatter::new(true)),
        OutputFormat::Markdown => Box::new(MarkdownFormatter),
    }
}
