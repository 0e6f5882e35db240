//! HTML table export of a node selection.

use crate::forest::{Forest, NodeRef};
use std::fmt::Write;

/// Render the selected nodes as an HTML table: one name column plus one
/// column per public metric, values to two decimals. Aggregate rows are
/// labelled after what they summarize.
pub(crate) fn node_table_html(forest: &Forest, selection: &[NodeRef]) -> String {
    let metric_columns = forest.metric_columns();

    let mut out = String::from("<table><tr><td>name</td>");
    for metric in metric_columns {
        let _ = write!(out, "<td>{}</td>", html_escape::encode_text(metric));
    }
    out.push_str("</tr>");

    for reference in selection {
        let Some(tree) = forest.current_tree(reference.tree) else {
            continue;
        };
        if !tree.contains(reference.node) {
            continue;
        }
        let node = tree.node(reference.node);

        let label = match node.aggregate() {
            Some(data) if data.elided.len() == 1 => format!("{} Subtree", data.name),
            Some(_) => {
                let parent_name = node
                    .parent
                    .map(|p| tree.node(p).name().to_string())
                    .unwrap_or_default();
                format!("Children of: {}", parent_name)
            }
            None => node.name().to_string(),
        };

        out.push_str("<tr>");
        let _ = write!(out, "<td>{}</td>", html_escape::encode_text(&label));
        for metric in metric_columns {
            let _ = write!(out, "<td>{:.2}</td>", node.metric(metric));
        }
        out.push_str("</tr>");
    }

    out.push_str("</table>");
    out
}
