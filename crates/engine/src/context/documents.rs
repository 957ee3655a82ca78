//! Formats ranked bundles into the documents block of the user prompt.

use std::fmt::Write;

use ragloom_core::knowledge::RankedNodeBundle;

/// Render every bundle as a `<document>` block, in bundle order.
///
/// Links point at `{base_url}/node/{node_id}` and are omitted when no base
/// URL is configured.
pub fn format_documents(bundles: &[RankedNodeBundle], base_url: &str) -> String {
    let base_url = base_url.trim_end_matches('/');
    let mut out = String::new();

    for (i, bundle) in bundles.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str("<document>\n");
        let _ = writeln!(out, "ID: {}", i + 1);
        if bundle.node_emoji.is_empty() {
            let _ = writeln!(out, "Title: {}", bundle.node_name);
        } else {
            let _ = writeln!(out, "Title: {} {}", bundle.node_emoji, bundle.node_name);
        }
        if !bundle.node_path_names.is_empty() {
            let _ = writeln!(out, "Path: {}", bundle.node_path_names.join(" / "));
        }
        if !base_url.is_empty() {
            let _ = writeln!(out, "URL: {}/node/{}", base_url, bundle.node_id);
        }
        if !bundle.node_summary.is_empty() {
            let _ = writeln!(out, "Summary: {}", bundle.node_summary);
        }
        out.push_str("Content:\n");
        for chunk in &bundle.chunks {
            out.push_str(&chunk.content);
            out.push('\n');
        }
        out.push_str("</document>");
    }
    out
}
