use pulldown_cmark::{
    Alignment, CodeBlockKind, Event, HeadingLevel, LinkType, Options, Parser, Tag, TagEnd,
};

use crate::node::{Node, TableRow};

/// Strip YAML frontmatter from the beginning of markdown content
fn strip_frontmatter(markdown: &str) -> &str {
    if !markdown.starts_with("---") {
        return markdown;
    }
    // Find the closing ---
    if let Some(end) = markdown[3..].find("\n---") {
        // Skip past the closing --- and any trailing newline
        let after_frontmatter = &markdown[3 + end + 4..];
        after_frontmatter.trim_start_matches('\n')
    } else {
        markdown
    }
}

/// Parse markdown text into a document node
pub fn parse(markdown: &str) -> Node {
    let markdown = strip_frontmatter(markdown);
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    let parser = Parser::new_ext(markdown, options);
    let mut state = ParseState::default();

    for event in parser {
        process_event(event, &mut state);
    }

    state.finish()
}

struct ParseState {
    // Open containers; the document frame is always at the bottom
    frames: Vec<Frame>,
    // Table being built, if inside one
    table: Option<TableBuilder>,
}

impl Default for ParseState {
    fn default() -> Self {
        ParseState {
            frames: vec![Frame::new(FrameKind::Document)],
            table: None,
        }
    }
}

struct Frame {
    kind: FrameKind,
    children: Vec<Node>,
}

impl Frame {
    fn new(kind: FrameKind) -> Self {
        Frame {
            kind,
            children: Vec::new(),
        }
    }
}

enum FrameKind {
    Document,
    Paragraph,
    Heading(u8),
    Strong,
    Emphasis,
    Strikethrough,
    Link(String),
    AutoLink(String),
    Image(String),
    List(Option<u64>),
    Item,
    Quote,
    CodeBlock(Option<String>),
    TableCell,
    // Containers without a node of their own; children move to the parent
    Transparent,
}

#[derive(Default)]
struct TableBuilder {
    alignments: Vec<Option<i64>>,
    header: Option<TableRow>,
    rows: Vec<TableRow>,
    current_row: Vec<Vec<Node>>,
}

impl ParseState {
    fn append(&mut self, node: Node) {
        if let Some(frame) = self.frames.last_mut() {
            push_merged(&mut frame.children, node);
        }
    }

    fn open(&mut self, kind: FrameKind) {
        self.frames.push(Frame::new(kind));
    }

    fn close(&mut self) {
        // Never pop the document frame
        if self.frames.len() < 2 {
            return;
        }
        let Some(Frame { kind, children }) = self.frames.pop() else {
            return;
        };

        let node = match kind {
            FrameKind::Paragraph => Node::Paragraph(children),
            FrameKind::Heading(level) => Node::Heading { level, children },
            FrameKind::Strong => Node::Strong(children),
            FrameKind::Emphasis => Node::Emphasis(children),
            FrameKind::Strikethrough => Node::Strikethrough(children),
            FrameKind::Link(target) => Node::Link { target, children },
            FrameKind::AutoLink(target) => Node::AutoLink { target },
            FrameKind::Image(src) => Node::Image { src },
            FrameKind::List(start) => Node::List {
                ordered: start.is_some(),
                start,
                items: children,
            },
            FrameKind::Item => Node::ListItem(children),
            FrameKind::Quote => Node::Quote(children),
            FrameKind::CodeBlock(language) => Node::CodeBlock {
                language,
                raw_text: children.iter().map(Node::plain_text).collect(),
            },
            FrameKind::TableCell => {
                if let Some(table) = self.table.as_mut() {
                    table.current_row.push(children);
                }
                return;
            }
            FrameKind::Transparent | FrameKind::Document => {
                for child in children {
                    self.append(child);
                }
                return;
            }
        };
        self.append(node);
    }

    fn finish(mut self) -> Node {
        while self.frames.len() > 1 {
            self.close();
        }
        let children = self
            .frames
            .pop()
            .map(|frame| frame.children)
            .unwrap_or_default();
        Node::Document(children)
    }
}

/// Append, joining consecutive text runs into one node
fn push_merged(children: &mut Vec<Node>, node: Node) {
    if let (Some(Node::RawText(last)), Node::RawText(text)) = (children.last_mut(), &node) {
        last.push_str(text);
        return;
    }
    children.push(node);
}

fn process_event(event: Event, state: &mut ParseState) {
    match event {
        Event::Start(tag) => open_tag(tag, state),

        // Tables
        Event::End(TagEnd::Table) => {
            if let Some(table) = state.table.take() {
                state.append(Node::Table {
                    column_alignments: table.alignments,
                    header: table.header,
                    rows: table.rows,
                });
            }
        }
        Event::End(TagEnd::TableHead) => {
            if let Some(table) = state.table.as_mut() {
                let cells = std::mem::take(&mut table.current_row);
                table.header = Some(TableRow { cells });
            }
        }
        Event::End(TagEnd::TableRow) => {
            if let Some(table) = state.table.as_mut() {
                let cells = std::mem::take(&mut table.current_row);
                table.rows.push(TableRow { cells });
            }
        }

        Event::End(_) => state.close(),

        // Text content
        Event::Text(text) => state.append(Node::RawText(text.into_string())),
        Event::Html(html) | Event::InlineHtml(html) => {
            state.append(Node::RawText(html.into_string()))
        }

        // Inline code
        Event::Code(code) => {
            state.append(Node::InlineCode(vec![Node::RawText(code.into_string())]))
        }

        // Task list checkboxes become literal markers at the start of the item
        Event::TaskListMarker(checked) => {
            let marker = if checked { "[x] " } else { "[ ] " };
            state.append(Node::RawText(marker.to_string()));
        }

        // Horizontal rule
        Event::Rule => state.append(Node::ThematicBreak),

        // Soft/hard breaks
        Event::SoftBreak => state.append(Node::LineBreak { soft: true }),
        Event::HardBreak => state.append(Node::LineBreak { soft: false }),

        // Ignore other events
        _ => {}
    }
}

fn open_tag(tag: Tag, state: &mut ParseState) {
    let kind = match tag {
        Tag::Paragraph => FrameKind::Paragraph,
        Tag::Heading { level, .. } => FrameKind::Heading(heading_level_to_u8(level)),
        Tag::BlockQuote(_) => FrameKind::Quote,
        Tag::CodeBlock(kind) => FrameKind::CodeBlock(match kind {
            CodeBlockKind::Fenced(info) => info.split_whitespace().next().map(str::to_string),
            CodeBlockKind::Indented => None,
        }),
        Tag::List(start) => FrameKind::List(start),
        Tag::Item => FrameKind::Item,
        Tag::Emphasis => FrameKind::Emphasis,
        Tag::Strong => FrameKind::Strong,
        Tag::Strikethrough => FrameKind::Strikethrough,
        Tag::Link {
            link_type: LinkType::Autolink,
            dest_url,
            ..
        } => FrameKind::AutoLink(dest_url.into_string()),
        Tag::Link {
            link_type: LinkType::Email,
            dest_url,
            ..
        } => FrameKind::AutoLink(format!("mailto:{dest_url}")),
        Tag::Link { dest_url, .. } => FrameKind::Link(dest_url.into_string()),
        Tag::Image { dest_url, .. } => FrameKind::Image(dest_url.into_string()),
        Tag::Table(alignments) => {
            state.table = Some(TableBuilder {
                alignments: alignments.iter().map(alignment_code).collect(),
                ..TableBuilder::default()
            });
            return;
        }
        Tag::TableHead | Tag::TableRow => {
            if let Some(table) = state.table.as_mut() {
                table.current_row.clear();
            }
            return;
        }
        Tag::TableCell => FrameKind::TableCell,
        _ => FrameKind::Transparent,
    };
    state.open(kind);
}

fn alignment_code(alignment: &Alignment) -> Option<i64> {
    match alignment {
        Alignment::None | Alignment::Left => None,
        Alignment::Center => Some(0),
        Alignment::Right => Some(1),
    }
}

fn heading_level_to_u8(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}
