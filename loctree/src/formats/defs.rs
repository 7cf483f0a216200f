//! Structural `Defs` files.
//!
//! Only the element tree is kept; attributes other than `Name`, `ParentName`
//! and `Abstract` on the def element itself carry no translatable content.

use quick_xml::{Reader, events::Event};

use super::{LineIndex, SyntaxError, element_name};

/// One element below a def.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub name: String,
    pub text: String,
    pub line: usize,
    pub children: Vec<Node>,
}

impl Node {
    pub fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// A direct child of `<Defs>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefNode {
    pub def_type: String,
    pub def_name: Option<String>,
    /// Value of the `Name` attribute, used as an inheritance anchor.
    pub name: Option<String>,
    pub parent: Option<String>,
    pub is_abstract: bool,
    pub line: usize,
    pub fields: Vec<Node>,
}

impl DefNode {
    /// Name used in diagnostics: `defName`, else `Name`, else the def type.
    pub fn label(&self) -> &str {
        self.def_name
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or(&self.def_type)
    }
}

struct Open {
    node: Node,
    name_attr: Option<String>,
    parent_attr: Option<String>,
    is_abstract: bool,
}

/// Parses a defs file. Documents whose root is not `<Defs>` yield no defs.
pub fn parse_defs(content: &str) -> Result<Vec<DefNode>, SyntaxError> {
    let lines = LineIndex::new(content);
    let mut reader = Reader::from_str(content);
    let mut stack: Vec<Open> = Vec::new();
    let mut root: Option<String> = None;
    let mut defs = Vec::new();

    loop {
        let start = reader.buffer_position() as usize;
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(e) => {
                let at = reader.error_position() as usize;
                return Err(SyntaxError::new(Some(lines.line_of(at)), e.to_string()));
            }
        };
        let line = lines.line_of(start);

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_empty = matches!(event, Event::Empty(_));
                let name = element_name(e.name());
                if stack.is_empty() && root.is_none() {
                    root = Some(name);
                    if !is_empty {
                        stack.push(open(Node::leaf(String::new(), line)));
                    }
                    continue;
                }
                let mut entry = open(Node::leaf(name, line));
                if stack.len() == 1 {
                    for attr in e.attributes().with_checks(false).flatten() {
                        let value = attr
                            .unescape_value()
                            .map_err(|err| SyntaxError::new(Some(line), err.to_string()))?
                            .into_owned();
                        match attr.key.as_ref() {
                            b"Name" => entry.name_attr = Some(value),
                            b"ParentName" => entry.parent_attr = Some(value),
                            b"Abstract" => entry.is_abstract = value.eq_ignore_ascii_case("true"),
                            _ => {}
                        }
                    }
                }
                if is_empty {
                    close(entry, &mut stack, &mut defs);
                } else {
                    stack.push(entry);
                }
            }
            Event::Text(t) => {
                if let Some(top) = stack.last_mut() {
                    let text = t
                        .unescape()
                        .map_err(|e| SyntaxError::new(Some(line), e.to_string()))?;
                    top.node.text.push_str(&text);
                }
            }
            Event::CData(c) => {
                if let Some(top) = stack.last_mut() {
                    top.node.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::End(_) => {
                if let Some(entry) = stack.pop() {
                    close(entry, &mut stack, &mut defs);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(SyntaxError::new(None, "unexpected end of document"));
    }
    if root.as_deref() != Some("Defs") {
        return Ok(Vec::new());
    }
    Ok(defs)
}

impl Node {
    fn leaf(name: String, line: usize) -> Self {
        Node {
            name,
            text: String::new(),
            line,
            children: Vec::new(),
        }
    }
}

fn open(node: Node) -> Open {
    Open {
        node,
        name_attr: None,
        parent_attr: None,
        is_abstract: false,
    }
}

fn close(entry: Open, stack: &mut [Open], defs: &mut Vec<DefNode>) {
    match stack.len() {
        // Closing the root itself.
        0 => {}
        // A def directly below the root.
        1 => {
            let def_name = entry
                .node
                .child("defName")
                .map(|n| n.text.trim().to_string())
                .filter(|n| !n.is_empty());
            defs.push(DefNode {
                def_type: entry.node.name,
                def_name,
                name: entry.name_attr,
                parent: entry.parent_attr,
                is_abstract: entry.is_abstract,
                line: entry.node.line,
                fields: entry.node.children,
            });
        }
        _ => {
            if let Some(parent) = stack.last_mut() {
                parent.node.children.push(entry.node);
            }
        }
    }
}
