//! Markup node tree.
//!
//! Nodes are built fresh for every render and consumed once by a
//! [`MarkupWriter`]. They carry no identity of their own: the identifier of
//! an [`InputNode`] is assigned by the [`FieldSet`](crate::FieldSet) that
//! produced it.

use crate::fields::FieldId;
use crate::writer::MarkupWriter;

const VOID_ELEMENTS: &[&str] = &["br", "hr", "img", "input", "link", "meta"];
const BLOCK_ELEMENTS: &[&str] = &[
    "body", "div", "form", "h1", "h2", "head", "html", "p", "table", "tr", "ul",
];

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Node {
    #[default]
    Empty,
    Text(String),
    Tag(Tag),
    List(Vec<Node>),
    Input(InputNode),
}

impl Node {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text(content.into())
    }

    pub fn list(nodes: impl IntoIterator<Item = Node>) -> Self {
        Self::List(nodes.into_iter().collect())
    }

    /// Appends `other` after this node, flattening into one list.
    pub fn append(self, other: impl Into<Node>) -> Self {
        let other = other.into();
        match self {
            Self::Empty => other,
            Self::List(mut nodes) => {
                nodes.push(other);
                Self::List(nodes)
            }
            node => Self::List(vec![node, other]),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::List(nodes) => nodes.iter().all(Node::is_empty),
            _ => false,
        }
    }

    pub fn write(&self, w: &mut MarkupWriter) {
        match self {
            Self::Empty => {}
            Self::Text(content) => w.escape(content),
            Self::Tag(tag) => tag.write(w),
            Self::List(nodes) => {
                for node in nodes {
                    node.write(w);
                }
            }
            Self::Input(input) => input.write(w),
        }
    }

    pub fn render(&self) -> String {
        let mut w = MarkupWriter::new();
        self.write(&mut w);
        w.finish()
    }

    /// Every input node in document order.
    pub fn inputs(&self) -> Vec<&InputNode> {
        let mut out = Vec::new();
        self.collect_inputs(&mut out);
        out
    }

    fn collect_inputs<'a>(&'a self, out: &mut Vec<&'a InputNode>) {
        match self {
            Self::Input(input) => out.push(input),
            Self::Tag(tag) => {
                if let Some(child) = &tag.child {
                    child.collect_inputs(out);
                }
            }
            Self::List(nodes) => {
                for node in nodes {
                    node.collect_inputs(out);
                }
            }
            Self::Empty | Self::Text(_) => {}
        }
    }
}

impl From<&str> for Node {
    fn from(content: &str) -> Self {
        Self::Text(content.to_string())
    }
}

impl From<String> for Node {
    fn from(content: String) -> Self {
        Self::Text(content)
    }
}

impl From<Tag> for Node {
    fn from(tag: Tag) -> Self {
        Self::Tag(tag)
    }
}

impl From<InputNode> for Node {
    fn from(input: InputNode) -> Self {
        Self::Input(input)
    }
}

impl From<Vec<Node>> for Node {
    fn from(nodes: Vec<Node>) -> Self {
        Self::List(nodes)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    name: &'static str,
    attrs: Vec<(&'static str, String)>,
    class: Option<String>,
    child: Option<Box<Node>>,
}

impl Tag {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            attrs: Vec::new(),
            class: None,
            child: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn attr(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.attrs.push((name, value.into()));
        self
    }

    pub fn class(mut self, class: impl Into<String>) -> Self {
        self.set_class(class);
        self
    }

    pub fn set_class(&mut self, class: impl Into<String>) {
        let class = class.into();
        self.class = (!class.trim().is_empty()).then_some(class);
    }

    pub fn child(mut self, child: impl Into<Node>) -> Self {
        self.child = Some(Box::new(child.into()));
        self
    }

    fn is_void(&self) -> bool {
        VOID_ELEMENTS.contains(&self.name)
    }

    fn is_block(&self) -> bool {
        BLOCK_ELEMENTS.contains(&self.name)
    }

    fn write(&self, w: &mut MarkupWriter) {
        w.literal("<");
        w.literal(self.name);
        if let Some(class) = &self.class {
            w.literal(" class=");
            w.quoted(class);
        }
        for (name, value) in &self.attrs {
            w.literal(" ");
            w.literal(*name);
            w.literal("=");
            w.quoted(value);
        }
        if self.is_void() {
            w.literal(" />");
            return;
        }
        w.literal(">");

        let child = self.child.as_deref().filter(|c| !c.is_empty());
        if let Some(child) = child {
            if self.is_block() {
                w.begin(2);
                w.break_line();
                child.write(w);
                w.end();
                w.break_line();
            } else {
                child.write(w);
            }
        }

        w.literal("</");
        w.literal(self.name);
        w.literal(">");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputControl {
    TextInput { size: u16 },
    TextArea { rows: u16, cols: u16 },
    CheckBox,
    RadioButton { choice: &'static str },
    FileChooser,
}

/// An interactive field occurrence. Only a [`FieldSet`](crate::FieldSet) can
/// build one, so the wire name is always resolvable on submission.
#[derive(Debug, Clone, PartialEq)]
pub struct InputNode {
    id: FieldId,
    control: InputControl,
    value: String,
}

impl InputNode {
    pub(crate) fn new(id: FieldId, control: InputControl, value: impl Into<String>) -> Self {
        Self {
            id,
            control,
            value: value.into(),
        }
    }

    pub fn id(&self) -> &FieldId {
        &self.id
    }

    pub fn control(&self) -> &InputControl {
        &self.control
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn is_checked(&self) -> bool {
        match &self.control {
            InputControl::CheckBox => !self.value.is_empty(),
            InputControl::RadioButton { choice } => self.value == *choice,
            _ => false,
        }
    }

    fn write(&self, w: &mut MarkupWriter) {
        match &self.control {
            InputControl::TextInput { size } => {
                w.literal("<input type=\"text\" name=");
                w.quoted(self.id.as_str());
                w.literal(" size=");
                w.quoted(&size.to_string());
                w.literal(" value=");
                w.quoted(&self.value);
                w.literal(" />");
            }
            InputControl::TextArea { rows, cols } => {
                w.literal("<textarea name=");
                w.quoted(self.id.as_str());
                w.literal(" rows=");
                w.quoted(&rows.to_string());
                w.literal(" cols=");
                w.quoted(&cols.to_string());
                w.literal(">");
                w.escape(&self.value);
                w.literal("</textarea>");
            }
            InputControl::CheckBox => {
                w.literal("<input type=\"checkbox\" name=");
                w.quoted(self.id.as_str());
                w.literal(" value=\"on\"");
                if self.is_checked() {
                    w.literal(" checked=\"checked\"");
                }
                w.literal(" />");
            }
            InputControl::RadioButton { choice } => {
                w.literal("<input type=\"radio\" name=");
                w.quoted(self.id.as_str());
                w.literal(" value=");
                w.quoted(choice);
                if self.is_checked() {
                    w.literal(" checked=\"checked\"");
                }
                w.literal(" />");
            }
            InputControl::FileChooser => {
                w.literal("<input type=\"file\" name=");
                w.quoted(self.id.as_str());
                w.literal(" />");
            }
        }
    }
}

pub fn text(content: impl Into<String>) -> Node {
    Node::text(content)
}

/// Splits `content` on newlines into text separated by line breaks.
pub fn text_lines(content: &str) -> Node {
    Node::list(
        content
            .lines()
            .flat_map(|line| [Node::text(line), br()])
            .collect::<Vec<_>>(),
    )
}

pub fn br() -> Node {
    Tag::new("br").into()
}

pub fn hrule() -> Node {
    Tag::new("hr").into()
}

pub fn banner(title: impl Into<String>) -> Node {
    Tag::new("h1")
        .class("banner")
        .child(Node::text(title))
        .into()
}

pub fn paragraph(child: impl Into<Node>) -> Node {
    Tag::new("p").child(child).into()
}

pub fn span(class: &str, child: impl Into<Node>) -> Node {
    Tag::new("span").class(class).child(child).into()
}

pub fn hyperlink(href: impl Into<String>, child: impl Into<Node>) -> Node {
    Tag::new("a").attr("href", href).child(child).into()
}

pub fn table(class: Option<&str>, rows: impl Into<Node>) -> Node {
    let mut tag = Tag::new("table");
    if let Some(class) = class {
        tag.set_class(class);
    }
    tag.child(rows).into()
}

pub fn row(cells: impl Into<Node>) -> Node {
    Tag::new("tr").child(cells).into()
}

pub fn cell(child: impl Into<Node>) -> Node {
    Tag::new("td").child(child).into()
}

/// A label cell, styled with the `desc` class.
pub fn desc(child: impl Into<Node>) -> Node {
    Tag::new("td").class("desc").child(child).into()
}

pub fn error_cell(message: &str) -> Node {
    Tag::new("td")
        .class("error")
        .child(Node::text(message))
        .into()
}

pub fn submit_button(label: impl Into<String>) -> Node {
    Tag::new("input")
        .attr("type", "submit")
        .attr("value", label)
        .into()
}

/// Hidden bookkeeping parameter. Not a registry field.
pub fn hidden(name: &'static str, value: impl Into<String>) -> Node {
    Tag::new("input")
        .attr("type", "hidden")
        .attr("name", name)
        .attr("value", value)
        .into()
}

pub fn form(action: impl Into<String>, multipart: bool, body: impl Into<Node>) -> Node {
    let mut tag = Tag::new("form")
        .attr("method", "post")
        .attr("action", action);
    if multipart {
        tag = tag.attr("enctype", "multipart/form-data");
    }
    tag.child(body).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_text_escapes() {
        assert_eq!(text("a < b & c").render(), "a &lt; b &amp; c");
    }

    #[test]
    fn test_render_table_rows() {
        let html = table(
            Some("createForm"),
            row(Node::list([desc("Name:"), cell("x")])),
        )
        .render();
        assert_eq!(
            html,
            "<table class=\"createForm\">\n  <tr>\n    <td class=\"desc\">Name:</td><td>x</td>\n  </tr>\n</table>"
        );
    }

    #[test]
    fn test_void_elements_self_close() {
        assert_eq!(br().render(), "<br />");
        assert_eq!(
            hidden("_do", "submit").render(),
            "<input type=\"hidden\" name=\"_do\" value=\"submit\" />"
        );
    }

    #[test]
    fn test_hyperlink_escapes_href() {
        let html = hyperlink("/step/abc?_do=open:x&y=\"z\"", "go").render();
        assert_eq!(
            html,
            "<a href=\"/step/abc?_do=open:x&amp;y=&quot;z&quot;\">go</a>"
        );
    }

    #[test]
    fn test_append_flattens() {
        let node = Node::Empty.append("a").append("b").append(br());
        match &node {
            Node::List(items) => assert_eq!(items.len(), 3),
            other => panic!("expected list, got {other:?}"),
        }
        assert_eq!(node.render(), "ab<br />");
    }

    #[test]
    fn test_text_lines_breaks_each_line() {
        assert_eq!(text_lines("alice\nbob").render(), "alice<br />bob<br />");
        assert!(text_lines("").is_empty());
    }

    #[test]
    fn test_empty_class_is_dropped() {
        assert_eq!(span(" ", "x").render(), "<span>x</span>");
    }

    #[test]
    fn test_form_multipart() {
        let html = form("/step/t", true, Node::Empty).render();
        assert!(html.contains("enctype=\"multipart/form-data\""));
        assert!(html.starts_with("<form method=\"post\" action=\"/step/t\""));
    }
}
