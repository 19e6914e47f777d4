use crate::markup::Node;
use crate::validate::ErrorMap;
use crate::writer::MarkupWriter;

#[derive(Debug, Clone, PartialEq)]
pub struct Head {
    pub title: String,
    pub stylesheet: Option<String>,
}

impl Head {
    fn write(&self, w: &mut MarkupWriter) {
        w.begin(2);
        w.literal("<head>");
        w.break_line();
        w.literal("<meta charset=\"utf-8\" />");
        w.break_line();
        w.literal("<title>");
        w.escape(&self.title);
        w.literal("</title>");
        if let Some(href) = &self.stylesheet {
            w.break_line();
            w.literal("<link rel=\"stylesheet\" type=\"text/css\" href=");
            w.quoted(href);
            w.literal(" />");
        }
        w.end();
        w.break_line();
        w.literal("</head>");
    }
}

/// A deliverable document: head metadata plus the body tree, along with the
/// error map the body was rendered with.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    head: Head,
    body: Node,
    errors: ErrorMap,
}

pub fn make_page(title: impl Into<String>, body: impl Into<Node>) -> Page {
    Page {
        head: Head {
            title: title.into(),
            stylesheet: None,
        },
        body: body.into(),
        errors: ErrorMap::new(),
    }
}

impl Page {
    pub fn with_stylesheet(mut self, href: impl Into<String>) -> Self {
        self.head.stylesheet = Some(href.into());
        self
    }

    pub fn with_errors(mut self, errors: ErrorMap) -> Self {
        self.errors = errors;
        self
    }

    pub fn title(&self) -> &str {
        &self.head.title
    }

    pub fn head(&self) -> &Head {
        &self.head
    }

    pub fn head_mut(&mut self) -> &mut Head {
        &mut self.head
    }

    pub fn body(&self) -> &Node {
        &self.body
    }

    pub fn errors(&self) -> &ErrorMap {
        &self.errors
    }

    pub fn write(&self, w: &mut MarkupWriter) {
        w.literal("<!DOCTYPE html>");
        w.break_line();
        w.literal("<html>");
        w.break_line();
        self.head.write(w);
        w.break_line();
        w.begin(2);
        w.literal("<body>");
        w.break_line();
        self.body.write(w);
        w.end();
        w.break_line();
        w.literal("</body>");
        w.break_line();
        w.literal("</html>");
    }

    pub fn render(&self) -> String {
        let mut w = MarkupWriter::new();
        self.write(&mut w);
        w.finish()
    }
}
