//! Indenting markup writer.
//!
//! The writer is the only place where strings become markup. Trusted markup
//! can only be written from `&'static str` literals; everything else goes
//! through [`MarkupWriter::escape`] (text content) or
//! [`MarkupWriter::quoted`] (attribute values).

#[derive(Debug, Default)]
pub struct MarkupWriter {
    out: String,
    indents: Vec<usize>,
}

impl MarkupWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a nesting level indented `indent` columns past the current one.
    pub fn begin(&mut self, indent: usize) {
        let next = self.indent() + indent;
        self.indents.push(next);
    }

    pub fn end(&mut self) {
        self.indents.pop();
    }

    pub fn depth(&self) -> usize {
        self.indents.len()
    }

    pub fn break_line(&mut self) {
        self.out.push('\n');
        for _ in 0..self.indent() {
            self.out.push(' ');
        }
    }

    pub fn literal(&mut self, markup: &'static str) {
        self.out.push_str(markup);
    }

    pub fn escape(&mut self, text: &str) {
        push_escaped(&mut self.out, text);
    }

    /// Writes `text` as a double-quoted attribute value.
    pub fn quoted(&mut self, text: &str) {
        self.out.push('"');
        push_escaped(&mut self.out, text);
        self.out.push('"');
    }

    pub fn finish(self) -> String {
        self.out
    }

    fn indent(&self) -> usize {
        self.indents.last().copied().unwrap_or(0)
    }
}

fn push_escaped(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    push_escaped(&mut out, s);
    out
}
