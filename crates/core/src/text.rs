//! Formatted Text
//!
//! The minimal rich-text subset the remote surface needs: plain runs, bold
//! runs and literal line breaks. Rendering targets Telegram's HTML parse mode,
//! which only requires `&`, `<` and `>` to be escaped.

use serde::{Deserialize, Serialize};

/// One run of formatted text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum TextSpan {
    Plain(String),
    Bold(String),
    LineBreak,
}

/// Message body made of styled spans.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattedText {
    spans: Vec<TextSpan>,
}

impl FormattedText {
    pub fn new() -> Self {
        Self::default()
    }

    /// Body consisting of a single plain run.
    pub fn plain(text: impl Into<String>) -> Self {
        Self::new().text(text)
    }

    /// Append a plain run.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.spans.push(TextSpan::Plain(text.into()));
        self
    }

    /// Append a bold run.
    pub fn bold(mut self, text: impl Into<String>) -> Self {
        self.spans.push(TextSpan::Bold(text.into()));
        self
    }

    /// Append a line break.
    pub fn newline(mut self) -> Self {
        self.spans.push(TextSpan::LineBreak);
        self
    }

    /// Append a plain run followed by a line break.
    pub fn line(self, text: impl Into<String>) -> Self {
        self.text(text).newline()
    }

    /// Append a `label: value` line with the label in bold.
    pub fn field(self, label: &str, value: impl std::fmt::Display) -> Self {
        self.bold(format!("{}:", label))
            .text(format!(" {}", value))
            .newline()
    }

    pub fn spans(&self) -> &[TextSpan] {
        &self.spans
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Render to Telegram HTML.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        for span in &self.spans {
            match span {
                TextSpan::Plain(text) => out.push_str(&escape_html(text)),
                TextSpan::Bold(text) => {
                    out.push_str("<b>");
                    out.push_str(&escape_html(text));
                    out.push_str("</b>");
                }
                TextSpan::LineBreak => out.push('\n'),
            }
        }
        out
    }

    /// Render without markup, used for logs and assertions.
    pub fn to_plain(&self) -> String {
        let mut out = String::new();
        for span in &self.spans {
            match span {
                TextSpan::Plain(text) | TextSpan::Bold(text) => out.push_str(text),
                TextSpan::LineBreak => out.push('\n'),
            }
        }
        out
    }
}

/// Escape the characters Telegram's HTML parse mode treats as markup.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}
