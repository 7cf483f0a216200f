//! `LanguageData` documents: the files under `Languages/<Lang>/Keyed` and
//! `Languages/<Lang>/DefInjected`.
//!
//! ```xml
//! <?xml version="1.0" encoding="utf-8"?>
//! <LanguageData>
//!   <ButtonLabel>Start</ButtonLabel>
//!   <Gun.rulesStrings>
//!     <li>first</li>
//!   </Gun.rulesStrings>
//! </LanguageData>
//! ```
//!
//! Every leaf element becomes a [`Slot`] whose key is the element path below
//! the root, joined with `.`; `li` items are named by their index
//! (`Gun.rulesStrings.0`). A parsed [`Document`] keeps the original text and
//! the byte span of each value, so it can be patched without touching any
//! other byte of the file.

use std::{io::BufRead, ops::Range};

use quick_xml::{
    Reader, Writer,
    escape::partial_escape,
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
};

use super::{LineIndex, SyntaxError, element_name};
use crate::{error::Error, traits::Parser};

pub const ROOT: &str = "LanguageData";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub key: String,
    pub value: String,
    pub line: usize,
    tag: String,
    span: Range<usize>,
    self_closing: bool,
}

/// A direct child of the root element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element { tag: String, span: Range<usize> },
    Comment { text: String, span: Range<usize> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum InsertPoint {
    BeforeClose(usize),
    SelfClosingRoot(Range<usize>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    content: String,
    root: String,
    slots: Vec<Slot>,
    nodes: Vec<Node>,
    insert: InsertPoint,
    indent: String,
    newline: &'static str,
}

/// Whether `name` can be written as an element name: a letter or `_`
/// first, then letters, digits, `_`, `-` and `.`. Namespace prefixes are
/// not allowed.
pub fn is_element_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '\u{B7}'))
}

/// Something appended to a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    Entry { tag: String, value: String },
    Comment(String),
}

impl Item {
    pub fn entry(tag: impl Into<String>, value: impl Into<String>) -> Self {
        Item::Entry {
            tag: tag.into(),
            value: value.into(),
        }
    }

    pub(crate) fn render(&self) -> String {
        match self {
            Item::Entry { tag, value } => format!("<{tag}>{}</{tag}>", partial_escape(value)),
            Item::Comment(text) => format!("<!-- {} -->", text.replace("--", "- -")),
        }
    }
}

struct Frame {
    tag: String,
    segment: String,
    inner_start: usize,
    line: usize,
    text: String,
    has_children: bool,
    li_count: usize,
}

impl Frame {
    fn child_segment(&mut self, tag: &str) -> String {
        self.has_children = true;
        if tag == "li" {
            let index = self.li_count;
            self.li_count += 1;
            index.to_string()
        } else {
            tag.to_string()
        }
    }
}

fn slot_key(stack: &[Frame], segment: &str) -> String {
    // stack[0] is the root element and does not contribute to keys.
    let mut key = String::new();
    for frame in stack.iter().skip(1) {
        key.push_str(&frame.segment);
        key.push('.');
    }
    key.push_str(segment);
    key
}

impl Document {
    pub fn parse(content: impl Into<String>) -> Result<Self, SyntaxError> {
        let content = content.into();
        let lines = LineIndex::new(&content);
        let mut reader = Reader::from_str(&content);

        let mut stack: Vec<Frame> = Vec::new();
        let mut slots = Vec::new();
        let mut nodes = Vec::new();
        let mut root: Option<String> = None;
        let mut insert = None;
        let mut indent = None;

        loop {
            let start = reader.buffer_position() as usize;
            let event = match reader.read_event() {
                Ok(event) => event,
                Err(e) => {
                    let at = reader.error_position() as usize;
                    return Err(SyntaxError::new(Some(lines.line_of(at)), e.to_string()));
                }
            };
            let end = reader.buffer_position() as usize;

            match event {
                Event::Start(e) => {
                    let tag = element_name(e.name());
                    let line = lines.line_of(start);
                    let segment = match stack.last_mut() {
                        None => {
                            if root.is_some() {
                                return Err(SyntaxError::new(Some(line), "multiple root elements"));
                            }
                            root = Some(tag.clone());
                            String::new()
                        }
                        Some(parent) => parent.child_segment(&tag),
                    };
                    if stack.len() == 1 {
                        if indent.is_none() {
                            indent = Some(leading_indent(&content, start));
                        }
                        nodes.push(Node::Element {
                            tag: tag.clone(),
                            span: start..end,
                        });
                    }
                    stack.push(Frame {
                        tag,
                        segment,
                        inner_start: end,
                        line,
                        text: String::new(),
                        has_children: false,
                        li_count: 0,
                    });
                }
                Event::Empty(e) => {
                    let tag = element_name(e.name());
                    let line = lines.line_of(start);
                    match stack.last_mut() {
                        None => {
                            if root.is_some() {
                                return Err(SyntaxError::new(Some(line), "multiple root elements"));
                            }
                            root = Some(tag);
                            insert = Some(InsertPoint::SelfClosingRoot(start..end));
                        }
                        Some(parent) => {
                            let segment = parent.child_segment(&tag);
                            if stack.len() == 1 {
                                if indent.is_none() {
                                    indent = Some(leading_indent(&content, start));
                                }
                                nodes.push(Node::Element {
                                    tag: tag.clone(),
                                    span: start..end,
                                });
                            }
                            slots.push(Slot {
                                key: slot_key(&stack, &segment),
                                value: String::new(),
                                line,
                                tag,
                                span: start..end,
                                self_closing: true,
                            });
                        }
                    }
                }
                Event::Text(t) => {
                    if let Some(top) = stack.last_mut() {
                        let text = t
                            .unescape()
                            .map_err(|e| SyntaxError::new(Some(lines.line_of(start)), e.to_string()))?;
                        top.text.push_str(&text);
                    }
                }
                Event::CData(c) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                    }
                }
                Event::End(_) => {
                    let Some(frame) = stack.pop() else {
                        return Err(SyntaxError::new(Some(lines.line_of(start)), "unexpected closing tag"));
                    };
                    if stack.is_empty() {
                        insert = Some(InsertPoint::BeforeClose(start));
                    } else if !frame.has_children {
                        slots.push(Slot {
                            key: slot_key(&stack, &frame.segment),
                            value: frame.text,
                            line: frame.line,
                            tag: frame.tag,
                            span: frame.inner_start..start,
                            self_closing: false,
                        });
                    }
                }
                Event::Comment(c) if stack.len() == 1 => nodes.push(Node::Comment {
                    text: String::from_utf8_lossy(&c).into_owned(),
                    span: start..end,
                }),
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(SyntaxError::new(
                Some(open.line),
                format!("unclosed element <{}>", open.tag),
            ));
        }
        let (Some(root), Some(insert)) = (root, insert) else {
            return Err(SyntaxError::new(None, "document has no root element"));
        };

        let newline = if content.contains("\r\n") { "\r\n" } else { "\n" };
        Ok(Self {
            content,
            root,
            slots,
            nodes,
            insert,
            indent: indent.unwrap_or_else(|| "  ".to_string()),
            newline,
        })
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Elements and comments directly below the root, in file order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn indent(&self) -> &str {
        &self.indent
    }

    pub fn newline(&self) -> &'static str {
        self.newline
    }

    /// Widens `span` to its whole line, line break included, when nothing
    /// but whitespace shares the line with it.
    pub fn line_of(&self, span: &Range<usize>) -> Range<usize> {
        let start = self.content[..span.start].rfind('\n').map(|i| i + 1).unwrap_or(0);
        let end = self.content[span.end..]
            .find('\n')
            .map(|i| span.end + i + 1)
            .unwrap_or(self.content.len());
        let blank = |s: &str| s.chars().all(|c| c == ' ' || c == '\t' || c == '\r' || c == '\n');
        if blank(&self.content[start..span.start]) && blank(&self.content[span.end..end]) {
            start..end
        } else {
            span.clone()
        }
    }

    /// Returns the document text with each range replaced by its text.
    /// Ranges must not overlap.
    pub fn splice(&self, mut edits: Vec<(Range<usize>, String)>) -> String {
        edits.sort_by(|a, b| b.0.start.cmp(&a.0.start).then(b.0.end.cmp(&a.0.end)));
        let mut out = self.content.clone();
        for (range, text) in edits {
            out.replace_range(range, &text);
        }
        out
    }

    /// Value of the first slot named `key`.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.slots
            .iter()
            .find(|s| s.key == key)
            .map(|s| s.value.as_str())
    }

    /// Returns the document text with `replacements` applied in place and
    /// `appended` items added before the closing root tag. Keys without a
    /// slot in `replacements` are ignored.
    pub fn patch(&self, replacements: &[(String, String)], appended: &[Item]) -> String {
        let mut splices: Vec<(Range<usize>, String)> = Vec::new();

        for (key, value) in replacements {
            let Some(slot) = self.slots.iter().find(|s| &s.key == key) else {
                continue;
            };
            let text = if slot.self_closing {
                Item::entry(slot.tag.clone(), value.clone()).render()
            } else {
                partial_escape(value).into_owned()
            };
            splices.push((slot.span.clone(), text));
        }

        if !appended.is_empty() {
            splices.push(self.append_splice(appended));
        }
        self.splice(splices)
    }

    fn append_splice(&self, items: &[Item]) -> (Range<usize>, String) {
        let nl = self.newline;
        match &self.insert {
            InsertPoint::SelfClosingRoot(range) => {
                let mut text = format!("<{}>{nl}", self.root);
                for item in items {
                    text.push_str(&self.indent);
                    text.push_str(&item.render());
                    text.push_str(nl);
                }
                text.push_str(&format!("</{}>", self.root));
                (range.clone(), text)
            }
            InsertPoint::BeforeClose(pos) => {
                let line_start = self.content[..*pos]
                    .rfind('\n')
                    .map(|i| i + 1)
                    .unwrap_or(0);
                let at_line_start = self.content[line_start..*pos]
                    .chars()
                    .all(|c| c == ' ' || c == '\t');
                let mut text = String::new();
                if at_line_start && line_start > 0 {
                    for item in items {
                        text.push_str(&self.indent);
                        text.push_str(&item.render());
                        text.push_str(nl);
                    }
                    (line_start..line_start, text)
                } else {
                    for item in items {
                        text.push_str(nl);
                        text.push_str(&self.indent);
                        text.push_str(&item.render());
                    }
                    text.push_str(nl);
                    (*pos..*pos, text)
                }
            }
        }
    }
}

/// Whitespace between the start of the line and `offset`, if that is all
/// the line holds before it.
fn leading_indent(content: &str, offset: usize) -> String {
    let line_start = content[..offset].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let prefix = &content[line_start..offset];
    if !prefix.is_empty() && prefix.chars().all(|c| c == ' ' || c == '\t') {
        prefix.to_string()
    } else {
        "  ".to_string()
    }
}

/// Renders a fresh `LanguageData` document. Fails on an entry whose tag is
/// not a valid element name.
pub fn render(items: &[Item]) -> Result<String, Error> {
    if let Some(tag) = items.iter().find_map(|item| match item {
        Item::Entry { tag, .. } if !is_element_name(tag) => Some(tag),
        _ => None,
    }) {
        return Err(Error::invalid_request(format!("`{tag}` is not a valid element name")));
    }
    let mut buf = Vec::new();
    let mut writer = Writer::new_with_indent(&mut buf, b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
    writer.write_event(Event::Start(BytesStart::new(ROOT)))?;
    for item in items {
        match item {
            Item::Entry { tag, value } => {
                writer.write_event(Event::Start(BytesStart::new(tag.as_str())))?;
                writer.write_event(Event::Text(BytesText::from_escaped(partial_escape(value))))?;
                writer.write_event(Event::End(BytesEnd::new(tag.as_str())))?;
            }
            Item::Comment(text) => {
                let text = format!(" {} ", text.replace("--", "- -"));
                writer.write_event(Event::Comment(BytesText::from_escaped(text)))?;
            }
        }
    }
    writer.write_event(Event::End(BytesEnd::new(ROOT)))?;
    buf.push(b'\n');
    String::from_utf8(buf).map_err(|e| Error::malformed("<rendered>", None, e.to_string()))
}

impl Parser for Document {
    fn from_reader<R: BufRead>(mut reader: R) -> Result<Self, Error> {
        let mut content = String::new();
        reader.read_to_string(&mut content)?;
        Document::parse(content).map_err(|e| e.into_error("<input>"))
    }

    fn read_from<P: AsRef<std::path::Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let content = crate::fsutil::read_text(path)?;
        Document::parse(content).map_err(|e| e.into_error(path))
    }

    fn to_writer<W: std::io::Write>(&self, mut writer: W) -> Result<(), Error> {
        writer.write_all(self.content.as_bytes())?;
        Ok(())
    }
}
