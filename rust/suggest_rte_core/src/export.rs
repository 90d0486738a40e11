//! HTML/Markdown export and the headless "discard suggestions" transform.

use tracing::debug;

use crate::doc::{BlockType, Document, ListType, Node, NodeKey, NodeKind, TextFormat};
use crate::error::Result;
use crate::resolve::reject_all;
use crate::suggestion::SuggestionMark;

/// Parse a serialized document, reject every suggestion in it, and serialize
/// it again. Leaves the document as it was before anyone suggested anything.
pub fn discard_suggestions(json: &str) -> Result<String> {
    let doc = discarded(json)?;
    Ok(doc.to_json())
}

/// Like [`discard_suggestions`], rendered as HTML.
pub fn discard_suggestions_html(json: &str) -> Result<String> {
    let doc = discarded(json)?;
    Ok(to_html(&doc))
}

fn discarded(json: &str) -> Result<Document> {
    let mut doc = Document::from_json(json)?;
    let rejected = reject_all(&mut doc)?;
    debug!(rejected, "discarded suggestions");
    Ok(doc)
}

// =============================================================================
// HTML
// =============================================================================

pub fn to_html(doc: &Document) -> String {
    let mut out = String::new();
    out.push_str("<div class=\"doc\">\n");
    for &child in doc.children(doc.root()) {
        out.push_str("  ");
        render_html(doc, child, &mut out);
        out.push('\n');
    }
    out.push_str("</div>");
    out
}

fn block_tag(block_type: BlockType) -> &'static str {
    match block_type {
        BlockType::H1 => "h1",
        BlockType::H2 => "h2",
        BlockType::H3 => "h3",
        BlockType::H4 => "h4",
        BlockType::H5 => "h5",
        BlockType::H6 => "h6",
        BlockType::Quote => "blockquote",
        BlockType::Code => "pre",
        _ => "p",
    }
}

fn block_style(node: &Node) -> String {
    let mut style_parts: Vec<String> = Vec::new();
    if node.align != Default::default() {
        style_parts.push(format!("text-align:{}", node.align));
    }
    if node.indent > 0 {
        style_parts.push(format!("padding-left:{}px", node.indent * 40));
    }
    if style_parts.is_empty() { String::new() } else { format!(" style=\"{}\"", style_parts.join(";")) }
}

fn suggestion_attrs(mark: &SuggestionMark) -> String {
    format!(
        " data-suggestion-id=\"{}\" data-suggestion-type=\"{}\"",
        html_escape::encode_double_quoted_attribute(mark.id.as_str()),
        mark.kind
    )
}

fn render_children_html(doc: &Document, key: NodeKey, out: &mut String) {
    for &child in doc.children(key) {
        render_html(doc, child, out);
    }
}

fn render_html(doc: &Document, key: NodeKey, out: &mut String) {
    let Some(node) = doc.get(key) else { return };
    match &node.kind {
        NodeKind::Root => render_children_html(doc, key, out),
        NodeKind::Block { block_type } => {
            let tag = block_tag(*block_type);
            out.push_str(&format!("<{tag}{}>", block_style(node)));
            render_children_html(doc, key, out);
            out.push_str(&format!("</{tag}>"));
        }
        NodeKind::List { list_type, start } => {
            let (tag, attrs) = match list_type {
                ListType::Number if *start != 1 => ("ol", format!(" start=\"{start}\"")),
                ListType::Number => ("ol", String::new()),
                ListType::Bullet => ("ul", String::new()),
                ListType::Check => ("ul", " data-checklist".to_string()),
            };
            out.push_str(&format!("<{tag}{attrs}>"));
            render_children_html(doc, key, out);
            out.push_str(&format!("</{tag}>"));
        }
        NodeKind::ListItem { checked } => {
            let mark = if *checked { " data-checked=\"true\"" } else { "" };
            out.push_str(&format!("<li{mark}{}>", block_style(node)));
            render_children_html(doc, key, out);
            out.push_str("</li>");
        }
        NodeKind::Table => {
            out.push_str("<table>");
            render_children_html(doc, key, out);
            out.push_str("</table>");
        }
        NodeKind::TableRow => {
            out.push_str("<tr>");
            render_children_html(doc, key, out);
            out.push_str("</tr>");
        }
        NodeKind::TableCell { header } => {
            let tag = if *header { "th" } else { "td" };
            out.push_str(&format!("<{tag}>"));
            render_children_html(doc, key, out);
            out.push_str(&format!("</{tag}>"));
        }
        NodeKind::Text { text, format, style } => out.push_str(&render_text_html(text, format, style)),
        NodeKind::LineBreak => out.push_str("<br/>"),
        NodeKind::Link { url } => {
            out.push_str(&format!("<a href=\"{}\">", html_escape::encode_double_quoted_attribute(url)));
            render_children_html(doc, key, out);
            out.push_str("</a>");
        }
        NodeKind::Image(props) => {
            let mut attrs = String::new();
            if let Some(w) = props.width {
                attrs.push_str(&format!(" width=\"{w}\""));
            }
            if let Some(h) = props.height {
                attrs.push_str(&format!(" height=\"{h}\""));
            }
            let img = format!(
                "<img src=\"{}\" alt=\"{}\"{attrs}/>",
                html_escape::encode_double_quoted_attribute(&props.src),
                html_escape::encode_double_quoted_attribute(&props.alt)
            );
            if props.show_caption {
                out.push_str(&format!(
                    "<figure>{img}<figcaption>{}</figcaption></figure>",
                    html_escape::encode_text(&props.alt)
                ));
            } else {
                out.push_str(&img);
            }
        }
        NodeKind::Divider => out.push_str("<hr/>"),
        NodeKind::Suggestion(mark) => {
            let tag = if mark.kind.is_removal() { "del" } else { "span" };
            out.push_str(&format!("<{tag}{}>", suggestion_attrs(mark)));
            render_children_html(doc, key, out);
            out.push_str(&format!("</{tag}>"));
        }
    }
}

fn render_text_html(text: &str, format: &TextFormat, style: &str) -> String {
    let mut inner = html_escape::encode_text(text).to_string();
    if format.code {
        inner = format!("<code>{}</code>", inner);
    }
    if format.strikethrough {
        inner = format!("<s>{}</s>", inner);
    }
    if format.underline {
        inner = format!("<u>{}</u>", inner);
    }
    if format.italic {
        inner = format!("<em>{}</em>", inner);
    }
    if format.bold {
        inner = format!("<strong>{}</strong>", inner);
    }
    if !style.is_empty() {
        inner = format!("<span style=\"{}\">{}</span>", html_escape::encode_double_quoted_attribute(style), inner);
    }
    inner
}

// =============================================================================
// Markdown
// =============================================================================

/// Markdown rendering. Pending deletions show as strikethrough; every other
/// suggestion renders as its current content.
pub fn to_markdown(doc: &Document) -> String {
    let mut out = String::new();
    for &child in doc.children(doc.root()) {
        let chunk = render_block_md(doc, child);
        if chunk.is_empty() {
            continue;
        }
        out.push_str(&chunk);
        out.push_str("\n\n");
    }
    while out.ends_with('\n') {
        out.pop();
    }
    out.push('\n');
    out
}

fn render_block_md(doc: &Document, key: NodeKey) -> String {
    let Some(node) = doc.get(key) else { return String::new() };
    match &node.kind {
        NodeKind::Block { block_type } => {
            let line = render_inline_md(doc, key);
            match block_type {
                BlockType::H1 => format!("# {line}"),
                BlockType::H2 => format!("## {line}"),
                BlockType::H3 => format!("### {line}"),
                BlockType::H4 => format!("#### {line}"),
                BlockType::H5 => format!("##### {line}"),
                BlockType::H6 => format!("###### {line}"),
                BlockType::Quote => format!("> {line}"),
                BlockType::Code => format!("```\n{}\n```", doc.text_content(key)),
                _ => line,
            }
        }
        NodeKind::List { list_type, start } => {
            let mut lines = Vec::new();
            let mut number = *start;
            for &item in doc.children(key) {
                let checked = matches!(doc.kind(item), Some(NodeKind::ListItem { checked: true }));
                let bullet = match list_type {
                    ListType::Bullet => "-".to_string(),
                    ListType::Number => format!("{number}."),
                    ListType::Check if checked => "- [x]".to_string(),
                    ListType::Check => "- [ ]".to_string(),
                };
                number += 1;
                let indent = "  ".repeat(doc.get(item).map(|n| n.indent as usize).unwrap_or(0));
                lines.push(format!("{indent}{bullet} {}", render_inline_md(doc, item)));
            }
            lines.join("\n")
        }
        NodeKind::Table => table_to_gfm(doc, key),
        NodeKind::Divider => "---".to_string(),
        NodeKind::Suggestion(mark) if mark.kind.is_removal() => {
            let inner: Vec<String> = doc.children(key).iter().map(|&c| render_block_md(doc, c)).collect();
            format!("~~{}~~", inner.join("\n\n"))
        }
        NodeKind::Suggestion(_) => {
            let inner: Vec<String> = doc.children(key).iter().map(|&c| render_block_md(doc, c)).collect();
            inner.join("\n\n")
        }
        _ => render_inline_md(doc, key),
    }
}

fn render_inline_md(doc: &Document, key: NodeKey) -> String {
    let mut out = String::new();
    for &child in doc.children(key) {
        let Some(node) = doc.get(child) else { continue };
        match &node.kind {
            NodeKind::Text { text, format, .. } => out.push_str(&render_text_md(text, format)),
            NodeKind::LineBreak => out.push_str("  \n"),
            NodeKind::Link { url } => out.push_str(&format!("[{}]({})", render_inline_md(doc, child), url)),
            NodeKind::Image(props) => out.push_str(&format!("![{}]({})", props.alt, props.src)),
            NodeKind::Suggestion(mark) if mark.kind.is_removal() => {
                let inner = render_inline_md(doc, child);
                if !inner.is_empty() {
                    out.push_str(&format!("~~{inner}~~"));
                }
            }
            _ => out.push_str(&render_inline_md(doc, child)),
        }
    }
    out
}

fn render_text_md(text: &str, format: &TextFormat) -> String {
    if text.is_empty() {
        return String::new();
    }
    let mut wrapped = if format.code { format!("`{text}`") } else { text.replace('*', "\\*").replace('_', "\\_") };
    if format.bold {
        wrapped = format!("**{}**", wrapped);
    }
    if format.italic {
        wrapped = format!("_{}_", wrapped);
    }
    if format.strikethrough {
        wrapped = format!("~~{}~~", wrapped);
    }
    wrapped
}

fn table_to_gfm(doc: &Document, table: NodeKey) -> String {
    let rows = doc.children(table);
    let Some(&header) = rows.first() else { return String::new() };
    let mut lines = vec![gfm_row(doc, header)];
    lines.push(gfm_separator_row(doc.children(header).len()));
    for &row in rows.iter().skip(1) {
        lines.push(gfm_row(doc, row));
    }
    lines.join("\n")
}

fn gfm_row(doc: &Document, row: NodeKey) -> String {
    let mut line = String::from("|");
    for &cell in doc.children(row) {
        let blocks: Vec<String> = doc.children(cell).iter().map(|&b| render_inline_md(doc, b)).collect();
        line.push(' ');
        line.push_str(&escape_md_cell_text(blocks.join(" ").trim()));
        line.push_str(" |");
    }
    line
}

fn gfm_separator_row(cols: usize) -> String {
    let mut line = String::from("|");
    for _ in 0..cols {
        line.push_str(" --- |");
    }
    line
}

fn escape_md_cell_text(s: &str) -> String {
    let mut out = String::new();
    for ch in s.chars() {
        match ch {
            '|' => out.push_str("\\|"),
            '\\' => out.push_str("\\\\"),
            _ => out.push(ch),
        }
    }
    out
}
