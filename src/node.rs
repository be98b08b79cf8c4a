/// A parsed Markdown document node. Built by the parser, only read by the
/// renderer.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Document(Vec<Node>),
    Heading {
        level: u8,
        children: Vec<Node>,
    },
    Paragraph(Vec<Node>),
    Strong(Vec<Node>),
    Emphasis(Vec<Node>),
    Strikethrough(Vec<Node>),
    InlineCode(Vec<Node>),
    LineBreak {
        /// A plain source newline rather than an explicit break.
        soft: bool,
    },
    Link {
        target: String,
        children: Vec<Node>,
    },
    AutoLink {
        target: String,
    },
    Image {
        src: String,
    },
    List {
        ordered: bool,
        /// Starting index. Present exactly for ordered lists.
        start: Option<u64>,
        items: Vec<Node>,
    },
    ListItem(Vec<Node>),
    Quote(Vec<Node>),
    CodeBlock {
        language: Option<String>,
        raw_text: String,
    },
    Table {
        /// Per column: `None` = unset (left), `0` = center, `1` = right.
        column_alignments: Vec<Option<i64>>,
        header: Option<TableRow>,
        rows: Vec<TableRow>,
    },
    ThematicBreak,
    RawText(String),
}

/// A table row; each cell is a list of inline nodes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableRow {
    pub cells: Vec<Vec<Node>>,
}

impl Node {
    /// Child nodes, for the variants that have them.
    pub fn children(&self) -> &[Node] {
        match self {
            Node::Document(children)
            | Node::Heading { children, .. }
            | Node::Paragraph(children)
            | Node::Strong(children)
            | Node::Emphasis(children)
            | Node::Strikethrough(children)
            | Node::InlineCode(children)
            | Node::Link { children, .. }
            | Node::ListItem(children)
            | Node::Quote(children) => children,
            Node::List { items, .. } => items,
            _ => &[],
        }
    }

    /// The literal text under this node, without any markup.
    pub fn plain_text(&self) -> String {
        match self {
            Node::RawText(text) => text.clone(),
            Node::CodeBlock { raw_text, .. } => raw_text.clone(),
            Node::AutoLink { target } => target.clone(),
            Node::LineBreak { .. } => " ".to_string(),
            Node::Table { header, rows, .. } => header
                .iter()
                .chain(rows)
                .flat_map(|row| &row.cells)
                .flatten()
                .map(Node::plain_text)
                .collect(),
            _ => self.children().iter().map(Node::plain_text).collect(),
        }
    }
}
