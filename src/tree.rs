//! The render tree: partially rendered output, assembled through a stack of
//! open containers.
//!
//! A [`Span`] lays its children out inline and can never hold a [`Block`].
//! A [`Block`] puts each child on its own line, one indent level deeper than
//! itself. Transforms attached to containers run over the fully rendered
//! content when the tree is serialized.

use crate::error::{Error, Result};
use crate::format::Transform;

/// A node of the render tree.
#[derive(Debug, Clone)]
pub enum RenderNode {
    Text(String),
    Span(Span),
    Block(Block),
}

impl RenderNode {
    /// Render this node at `depth`, using `unit` as one level of indentation.
    pub fn serialize(&self, unit: &str, depth: usize) -> String {
        match self {
            RenderNode::Text(value) if value.is_empty() => String::new(),
            RenderNode::Text(value) => format!("{}{}", unit.repeat(depth), value),
            RenderNode::Span(span) => format!("{}{}", unit.repeat(depth), span.render()),
            RenderNode::Block(block) => block.serialize(unit, depth),
        }
    }

    fn children_mut(&mut self) -> Option<&mut Vec<RenderNode>> {
        match self {
            RenderNode::Text(_) => None,
            RenderNode::Span(span) => Some(&mut span.elements),
            RenderNode::Block(block) => Some(&mut block.elements),
        }
    }
}

impl From<&str> for RenderNode {
    fn from(value: &str) -> Self {
        RenderNode::Text(value.to_string())
    }
}

impl From<String> for RenderNode {
    fn from(value: String) -> Self {
        RenderNode::Text(value)
    }
}

impl From<Span> for RenderNode {
    fn from(span: Span) -> Self {
        RenderNode::Span(span)
    }
}

impl From<Block> for RenderNode {
    fn from(block: Block) -> Self {
        RenderNode::Block(block)
    }
}

/// Inline container.
#[derive(Debug, Clone, Default)]
pub struct Span {
    elements: Vec<RenderNode>,
    transform: Option<Transform>,
}

impl Span {
    pub fn new(transform: Option<Transform>) -> Self {
        Span {
            elements: Vec::new(),
            transform,
        }
    }

    /// Append a child. Spans are strictly inline, so a block child is
    /// rejected.
    pub fn push(&mut self, element: impl Into<RenderNode>) -> Result<()> {
        let element = element.into();
        if matches!(element, RenderNode::Block(_)) {
            return Err(Error::StructuralViolation(
                "a span cannot contain a block".into(),
            ));
        }
        self.elements.push(element);
        Ok(())
    }

    pub fn elements(&self) -> &[RenderNode] {
        &self.elements
    }

    /// Concatenate the children and apply the transform. No indentation.
    pub fn render(&self) -> String {
        let rendered: String = self
            .elements
            .iter()
            .map(|element| element.serialize("", 0))
            .collect();
        match &self.transform {
            Some(transform) => transform.apply(&rendered),
            None => rendered,
        }
    }
}

/// Block-level container.
#[derive(Debug, Clone, Default)]
pub struct Block {
    elements: Vec<RenderNode>,
    prefix: Option<String>,
    suffix: Option<String>,
    transform: Option<Transform>,
    verbatim: bool,
}

impl Block {
    pub fn new() -> Self {
        Block::default()
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Children of a verbatim block are emitted without indentation.
    pub fn verbatim(mut self) -> Self {
        self.verbatim = true;
        self
    }

    pub fn push(&mut self, element: impl Into<RenderNode>) {
        self.elements.push(element.into());
    }

    pub fn elements(&self) -> &[RenderNode] {
        &self.elements
    }

    /// Children joined by newlines, each rendered at `depth`.
    pub fn serialize_body(&self, unit: &str, depth: usize) -> String {
        let depth = if self.verbatim { 0 } else { depth };
        self.elements
            .iter()
            .map(|element| element.serialize(unit, depth))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Prefix and suffix sit at `depth` around the body, which is rendered
    /// one level deeper. The transform sees only the body.
    pub fn serialize(&self, unit: &str, depth: usize) -> String {
        let indent = unit.repeat(depth);
        let mut lines = Vec::with_capacity(3);

        if let Some(prefix) = &self.prefix {
            lines.push(format!("{indent}{prefix}"));
        }
        if !self.elements.is_empty() {
            let body = self.serialize_body(unit, depth + 1);
            lines.push(match &self.transform {
                Some(transform) => transform.apply(&body),
                None => body,
            });
        }
        if let Some(suffix) = &self.suffix {
            lines.push(format!("{indent}{suffix}"));
        }

        lines.join("\n")
    }
}

/// Location of a node inside a [`RenderTree`], as child indices from the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeHandle(Vec<usize>);

/// Root block plus the stack of currently open containers.
///
/// Nodes are attached to their parent as soon as they are pushed or opened,
/// so document order is the order of the calls. The root block is always at
/// the bottom of the stack and can't be closed.
#[derive(Debug)]
pub struct RenderTree {
    root: RenderNode,
    stack: Vec<NodeHandle>,
}

impl Default for RenderTree {
    fn default() -> Self {
        RenderTree::new()
    }
}

impl RenderTree {
    pub fn new() -> Self {
        RenderTree {
            root: RenderNode::Block(Block::new()),
            stack: vec![NodeHandle(Vec::new())],
        }
    }

    /// Whether the active insertion point is a span.
    pub fn in_span(&self) -> bool {
        self.stack
            .last()
            .and_then(|top| self.node(top))
            .is_some_and(|node| matches!(node, RenderNode::Span(_)))
    }

    /// Number of containers open above the root.
    pub fn depth(&self) -> usize {
        self.stack.len() - 1
    }

    /// Append to the active container.
    pub fn push(&mut self, element: impl Into<RenderNode>) -> Result<NodeHandle> {
        let top = self.top()?.clone();
        self.attach(&top, element.into())
    }

    /// Open a span inside the active container and make it active.
    pub fn open_span(&mut self, transform: Option<Transform>) -> Result<NodeHandle> {
        let handle = self.push(Span::new(transform))?;
        self.stack.push(handle.clone());
        Ok(handle)
    }

    pub fn close_span(&mut self) -> Result<()> {
        if !self.in_span() {
            return Err(Error::StructuralViolation(
                "close_span without an open span".into(),
            ));
        }
        self.stack.pop();
        Ok(())
    }

    /// Open a block and make it active. Spans cannot own blocks, so the new
    /// block goes into the nearest open block below any spans on the stack.
    pub fn open_block(&mut self, block: Block) -> Result<NodeHandle> {
        let parent = self
            .stack
            .iter()
            .rev()
            .find(|handle| matches!(self.node(handle), Some(RenderNode::Block(_))))
            .cloned()
            .ok_or_else(|| Error::StructuralViolation("no open block".into()))?;
        let handle = self.attach(&parent, RenderNode::Block(block))?;
        self.stack.push(handle.clone());
        Ok(handle)
    }

    /// Close the active block, setting its suffix if one is given.
    pub fn close_block(&mut self, suffix: Option<String>) -> Result<()> {
        if self.stack.len() < 2 {
            return Err(Error::StructuralViolation(
                "close_block with nothing open".into(),
            ));
        }
        let top = self.top()?.clone();
        match self.node_mut(&top)? {
            RenderNode::Block(block) => {
                if suffix.is_some() {
                    block.suffix = suffix;
                }
            }
            _ => {
                return Err(Error::StructuralViolation(
                    "close_block while a span is open".into(),
                ));
            }
        }
        self.stack.pop();
        Ok(())
    }

    /// Replace the value of a text node pushed earlier.
    pub fn replace_text(&mut self, handle: &NodeHandle, value: String) -> Result<()> {
        match self.node_mut(handle)? {
            RenderNode::Text(text) => {
                *text = value;
                Ok(())
            }
            _ => Err(Error::StructuralViolation(
                "replace_text on a container".into(),
            )),
        }
    }

    /// Take the finished root block. Fails if anything is still open.
    pub fn into_root(self) -> Result<Block> {
        if self.stack.len() != 1 {
            return Err(Error::StructuralViolation(format!(
                "{} container(s) left open",
                self.stack.len() - 1
            )));
        }
        match self.root {
            RenderNode::Block(block) => Ok(block),
            _ => Err(Error::StructuralViolation("root is not a block".into())),
        }
    }

    fn top(&self) -> Result<&NodeHandle> {
        self.stack
            .last()
            .ok_or_else(|| Error::StructuralViolation("render stack is empty".into()))
    }

    fn attach(&mut self, parent: &NodeHandle, element: RenderNode) -> Result<NodeHandle> {
        let node = self.node_mut(parent)?;
        let index = match node {
            RenderNode::Span(span) => {
                span.push(element)?;
                span.elements.len() - 1
            }
            RenderNode::Block(block) => {
                block.push(element);
                block.elements.len() - 1
            }
            RenderNode::Text(_) => {
                return Err(Error::StructuralViolation(
                    "text nodes have no children".into(),
                ));
            }
        };
        let mut path = parent.0.clone();
        path.push(index);
        Ok(NodeHandle(path))
    }

    fn node(&self, handle: &NodeHandle) -> Option<&RenderNode> {
        let mut node = &self.root;
        for &index in &handle.0 {
            node = match node {
                RenderNode::Span(span) => span.elements.get(index)?,
                RenderNode::Block(block) => block.elements.get(index)?,
                RenderNode::Text(_) => return None,
            };
        }
        Some(node)
    }

    fn node_mut(&mut self, handle: &NodeHandle) -> Result<&mut RenderNode> {
        let mut node = &mut self.root;
        for &index in &handle.0 {
            node = node
                .children_mut()
                .and_then(|children| children.get_mut(index))
                .ok_or_else(|| Error::StructuralViolation("dangling node handle".into()))?;
        }
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{bold, italic};

    #[test]
    fn span_rejects_block_children() {
        let mut span = Span::new(None);
        assert!(span.push("text").is_ok());
        assert!(span.push(Span::new(None)).is_ok());
        assert!(matches!(
            span.push(Block::new()),
            Err(Error::StructuralViolation(_))
        ));
        assert_eq!(span.elements().len(), 2);
    }

    #[test]
    fn span_concatenates_and_transforms() {
        let mut inner = Span::new(Some(Transform::new(italic)));
        inner.push("world").unwrap();
        let mut span = Span::new(Some(Transform::new(bold)));
        span.push("Hello ").unwrap();
        span.push(inner).unwrap();

        assert_eq!(span.render(), r"\textbf{Hello \textit{world}}");
        assert_eq!(
            RenderNode::Span(span).serialize("  ", 2),
            r"    \textbf{Hello \textit{world}}"
        );
    }

    #[test]
    fn block_indents_children_and_wraps() {
        let mut block = Block::new()
            .with_prefix(r"\begin{itemize}")
            .with_suffix(r"\end{itemize}");
        block.push(r"\item one");
        block.push(r"\item two");

        assert_eq!(
            block.serialize("  ", 0),
            "\\begin{itemize}\n  \\item one\n  \\item two\n\\end{itemize}"
        );
        assert_eq!(
            block.serialize("  ", 1),
            "  \\begin{itemize}\n    \\item one\n    \\item two\n  \\end{itemize}"
        );
    }

    #[test]
    fn block_transform_skips_prefix_and_suffix() {
        let mut block = Block::new()
            .with_prefix("<")
            .with_suffix(">")
            .with_transform(Transform::new(|text: &str| text.to_uppercase()));
        block.push("body");
        assert_eq!(block.serialize("", 0), "<\nBODY\n>");
    }

    #[test]
    fn verbatim_block_keeps_content_flush() {
        let mut block = Block::new().with_prefix("begin").with_suffix("end").verbatim();
        block.push("fn main() {\n    body();\n}");
        assert_eq!(
            block.serialize("  ", 1),
            "  begin\nfn main() {\n    body();\n}\n  end"
        );
    }

    #[test]
    fn empty_text_lines_carry_no_indentation() {
        let mut block = Block::new();
        block.push("a");
        block.push("");
        block.push("b");
        assert_eq!(block.serialize("  ", 0), "  a\n\n  b");
    }

    #[test]
    fn tree_attaches_in_call_order() {
        let mut tree = RenderTree::new();
        tree.push("first").unwrap();
        tree.open_span(Some(Transform::new(bold))).unwrap();
        tree.push("strong").unwrap();
        tree.close_span().unwrap();
        tree.push("last").unwrap();

        let root = tree.into_root().unwrap();
        assert_eq!(root.serialize_body("  ", 0), "first\n\\textbf{strong}\nlast");
    }

    #[test]
    fn block_opened_inside_span_is_spliced_into_enclosing_block() {
        let mut tree = RenderTree::new();
        tree.open_block(Block::new().with_prefix("outer{")).unwrap();
        tree.open_span(None).unwrap();
        tree.push("item").unwrap();
        assert!(tree.in_span());

        tree.open_block(Block::new().with_prefix("inner{")).unwrap();
        assert!(!tree.in_span());
        tree.push("nested").unwrap();
        tree.close_block(Some("}".into())).unwrap();

        tree.push(" tail").unwrap();
        tree.close_span().unwrap();
        tree.close_block(Some("}".into())).unwrap();

        let root = tree.into_root().unwrap();
        assert_eq!(
            root.serialize_body("  ", 0),
            "outer{\n  item tail\n  inner{\n    nested\n  }\n}"
        );
    }

    #[test]
    fn pushing_block_onto_span_fails() {
        let mut tree = RenderTree::new();
        tree.open_span(None).unwrap();
        assert!(matches!(
            tree.push(Block::new()),
            Err(Error::StructuralViolation(_))
        ));
    }

    #[test]
    fn unbalanced_closes_fail() {
        let mut tree = RenderTree::new();
        assert!(matches!(tree.close_span(), Err(Error::StructuralViolation(_))));
        assert!(matches!(
            tree.close_block(None),
            Err(Error::StructuralViolation(_))
        ));

        tree.open_span(None).unwrap();
        assert!(matches!(
            tree.close_block(None),
            Err(Error::StructuralViolation(_))
        ));
        assert_eq!(tree.depth(), 1);
        assert!(matches!(tree.into_root(), Err(Error::StructuralViolation(_))));
    }

    #[test]
    fn replace_text_updates_placeholder() {
        let mut tree = RenderTree::new();
        let placeholder = tree.push("").unwrap();
        tree.push("body").unwrap();
        tree.replace_text(&placeholder, "head".into()).unwrap();

        let root = tree.into_root().unwrap();
        assert_eq!(root.serialize_body("", 0), "head\nbody");
    }
}
