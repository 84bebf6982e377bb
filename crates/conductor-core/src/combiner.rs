use tracing::{debug, info, warn};

use crate::mcp::ToolCallContextEntry;

/// Placeholder URL tool-call providers use for answers without a real source.
pub const SYNTHETIC_SOURCE_URL: &str = "mcp://llm_analysis";
/// Joins individual tool-call entries inside the tool-call section.
pub const ENTRY_SEPARATOR: &str = "\n\n---\n\n";
/// Joins the web section and the tool-call section.
pub const SECTION_SEPARATOR: &str = "\n\n";

/// Merge ranked web text with tool-call entries into one context string.
///
/// Web text comes first; each tool-call entry is followed by a citation line.
pub fn combine_context(
    tool_entries: &[ToolCallContextEntry],
    web_text: &str,
    sub_query: &str,
) -> String {
    let mut sections = Vec::with_capacity(2);

    let web_text = web_text.trim();
    if !web_text.is_empty() {
        debug!(chars = web_text.len(), "adding web context");
        sections.push(web_text.to_string());
    }

    let formatted: Vec<String> = tool_entries
        .iter()
        .enumerate()
        .filter(|(_, entry)| !entry.content.trim().is_empty())
        .map(|(idx, entry)| format_entry(idx, entry))
        .collect();
    if !formatted.is_empty() {
        debug!(entries = formatted.len(), "adding tool-call context");
        sections.push(formatted.join(ENTRY_SEPARATOR));
    }

    if sections.is_empty() {
        warn!(sub_query = %sub_query, "no context to combine");
        return String::new();
    }

    let combined = sections.join(SECTION_SEPARATOR);
    info!(sub_query = %sub_query, chars = combined.len(), "combined context");
    combined
}

fn format_entry(idx: usize, entry: &ToolCallContextEntry) -> String {
    let title = if entry.title.trim().is_empty() {
        format!("MCP Result {}", idx + 1)
    } else {
        entry.title.clone()
    };

    let citation = if entry.url.is_empty() || entry.url == SYNTHETIC_SOURCE_URL {
        format!("*Source: {title}*")
    } else {
        format!("*Source: {title} ({})*", entry.url)
    };

    format!("{}\n\n{citation}", entry.content.trim())
}
