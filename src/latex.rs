use std::collections::HashMap;

use tracing::trace;

use crate::assets::AssetResolver;
use crate::error::{Error, Result};
use crate::format::{
    Transform, bold, escape_special, escape_url, heading_wrapper, hyperlink, inline_code_box,
    italic, strikethrough,
};
use crate::node::{Node, TableRow};
use crate::packages::PackageSet;
use crate::tree::{Block, NodeHandle, RenderNode, RenderTree};

/// Explicit line break. The empty group stops a following `[` or `*` from
/// being read as an argument of `\\`.
pub const FORCED_BREAK: &str = r"\\{}";

/// Stands in for list items that would otherwise be empty.
pub const EMPTY_ITEM: &str = "---";

const ITEM_MARKER: &str = r"\item ";
const QUOTE_BEGIN: &str = r"\begin{leftbar}{\color{gray}";
const QUOTE_END: &str = r"}\end{leftbar}";
const CODE_BEGIN: &str = r"\begin{lstlisting}[backgroundcolor=\color{gray!10}]";
const CODE_END: &str = r"\end{lstlisting}";
const RULE: &str = r"\mbox{}\hrulefill\mbox{}";
const INCLUDE_OPTIONS: &str = r"width=\textwidth,height=\textheight,keepaspectratio";

/// Walks a node tree and builds the render tree for it.
///
/// One renderer serves one document: the package set and the image
/// lookups it collects are not shared with any other render.
pub struct Renderer<'a> {
    tree: RenderTree,
    packages: PackageSet,
    assets: &'a dyn AssetResolver,
    resolved: HashMap<String, String>,
}

impl<'a> Renderer<'a> {
    pub fn new(assets: &'a dyn AssetResolver) -> Self {
        Renderer {
            tree: RenderTree::new(),
            packages: PackageSet::new(),
            assets,
            resolved: HashMap::new(),
        }
    }

    pub fn push(&mut self, element: impl Into<RenderNode>) -> Result<NodeHandle> {
        self.tree.push(element)
    }

    /// Hand back the render tree and the packages it needs.
    pub fn finish(self) -> (RenderTree, PackageSet) {
        (self.tree, self.packages)
    }

    pub fn render_children(&mut self, nodes: &[Node]) -> Result<()> {
        for node in nodes {
            self.render(node)?;
        }
        Ok(())
    }

    pub fn render(&mut self, node: &Node) -> Result<()> {
        match node {
            Node::Document(children) => self.render_children(children),
            Node::RawText(text) => self.push(escape_special(text)).map(drop),

            // inline styles
            Node::Strong(children) => self.styled(bold, children),
            Node::Emphasis(children) => self.styled(italic, children),
            Node::Strikethrough(children) => self.styled(strikethrough, children),
            Node::InlineCode(children) => self.styled(inline_code_box, children),
            // A paragraph is one span, so a soft break has to keep the words apart.
            Node::LineBreak { soft: true } => self.push(" ").map(drop),
            Node::LineBreak { soft: false } => self.push(FORCED_BREAK).map(drop),
            Node::Link { target, children } => {
                self.packages.require("hyperref");
                self.with_span(Some(hyperlink(target)), |r| r.render_children(children))
            }
            Node::AutoLink { target } => {
                self.packages.require("hyperref");
                let link = match target.strip_prefix("mailto:") {
                    Some(address) => format!(
                        "\\href{{{}}}{{{}}}",
                        escape_url(target),
                        escape_special(address)
                    ),
                    None => format!("\\url{{{}}}", escape_url(target)),
                };
                self.push(link).map(drop)
            }
            Node::Image { src } => self.render_image(src),

            // blocks
            Node::Heading { level, children } => {
                self.with_span(Some(heading_wrapper(*level)), |r| r.render_children(children))
            }
            Node::Paragraph(children) => self.render_paragraph(children),
            Node::ThematicBreak => {
                self.with_block(Block::new().with_prefix(RULE), None, |_| Ok(()))?;
                self.push("").map(drop)
            }
            Node::Quote(children) => self.with_block(
                Block::new().with_prefix(QUOTE_BEGIN),
                Some(QUOTE_END),
                |r| r.render_children(children),
            ),
            Node::List { start, items, .. } => self.render_list(*start, items),
            Node::ListItem(children) => self.render_list_item(children),
            Node::CodeBlock { raw_text, .. } => self.render_code_block(raw_text),
            Node::Table {
                column_alignments,
                header,
                rows,
            } => self.render_table(column_alignments, header.as_ref(), rows),
        }
    }

    /// Run `f` inside a new span. The span is closed even when `f` fails.
    fn with_span<F>(&mut self, transform: Option<Transform>, f: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        self.tree.open_span(transform)?;
        let result = f(self);
        let closed = self.tree.close_span();
        result.and(closed)
    }

    /// Run `f` inside a new block. The block is closed even when `f` fails.
    fn with_block<F>(&mut self, block: Block, suffix: Option<&str>, f: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        self.tree.open_block(block)?;
        let result = f(self);
        let closed = self.tree.close_block(suffix.map(str::to_string));
        result.and(closed)
    }

    fn styled(&mut self, style: fn(&str) -> String, children: &[Node]) -> Result<()> {
        self.with_span(Some(Transform::new(style)), |r| r.render_children(children))
    }

    fn render_paragraph(&mut self, children: &[Node]) -> Result<()> {
        // Inside a list item the paragraphs share one line, so they need an
        // explicit break instead of the blank separator line.
        let separator = if self.tree.in_span() { r"\par " } else { "" };
        self.with_span(None, |r| r.render_children(children))?;
        self.push(separator).map(drop)
    }

    fn render_image(&mut self, src: &str) -> Result<()> {
        let path = match self.resolved.get(src) {
            Some(path) => path.clone(),
            None => {
                let path = self.assets.resolve(src)?;
                self.resolved.insert(src.to_string(), path.clone());
                path
            }
        };
        self.packages.require("graphicx");
        self.push(format!("\\includegraphics[{INCLUDE_OPTIONS}]{{{path}}}"))
            .map(drop)
    }

    fn render_list(&mut self, start: Option<u64>, items: &[Node]) -> Result<()> {
        self.packages.require("listings");
        let (prefix, suffix) = match start {
            Some(1) => (r"\begin{enumerate}".to_string(), r"\end{enumerate}"),
            Some(n) => (format!("\\begin{{enumerate}}[start={n}]"), r"\end{enumerate}"),
            None => (r"\begin{itemize}".to_string(), r"\end{itemize}"),
        };
        trace!(items = items.len(), ordered = start.is_some(), "list");

        self.push("")?;
        self.with_block(Block::new().with_prefix(prefix), Some(suffix), |r| {
            r.render_children(items)
        })?;
        self.push("").map(drop)
    }

    fn render_list_item(&mut self, children: &[Node]) -> Result<()> {
        let content = Transform::compose([
            Transform::new(placeholder_if_empty),
            Transform::new(replace_checkbox),
        ]);
        self.with_span(None, |r| {
            r.push(ITEM_MARKER)?;
            r.with_span(Some(content), |r| r.render_children(children))
        })
    }

    fn render_code_block(&mut self, raw_text: &str) -> Result<()> {
        self.packages.require("listings");
        let code = raw_text.trim_end_matches('\n').to_string();
        self.with_block(
            Block::new().with_prefix(CODE_BEGIN).verbatim(),
            Some(CODE_END),
            |r| r.push(code).map(drop),
        )?;
        self.push("").map(drop)
    }

    fn render_table(
        &mut self,
        alignments: &[Option<i64>],
        header: Option<&TableRow>,
        rows: &[TableRow],
    ) -> Result<()> {
        let columns = column_spec(alignments)?;
        self.packages.require("array");

        let mut inner = String::new();
        if let Some(header) = header {
            inner.push_str(&self.render_table_row(header)?);
            inner.push_str("\\hline\n");
        }
        for row in rows {
            inner.push_str(&self.render_table_row(row)?);
        }

        self.push(format!("\\begin{{tabular}}{columns}\n{inner}\\end{{tabular}}"))?;
        self.push("").map(drop)
    }

    fn render_table_row(&mut self, row: &TableRow) -> Result<String> {
        let cells = row
            .cells
            .iter()
            .map(|cell| self.render_inline(cell))
            .collect::<Result<Vec<_>>>()?;
        Ok(format!("{} \\\\\n", cells.join(" & ")))
    }

    /// Render inline nodes to a string on a scratch tree, keeping the
    /// package set and image lookups of this render.
    fn render_inline(&mut self, nodes: &[Node]) -> Result<String> {
        let outer = std::mem::take(&mut self.tree);
        let result = self.with_span(None, |r| r.render_children(nodes));
        let scratch = std::mem::replace(&mut self.tree, outer);
        result?;
        Ok(scratch.into_root()?.serialize_body("", 0))
    }
}

/// `tabular` column specifier: unset is left, 0 is center, 1 is right.
pub fn column_spec(alignments: &[Option<i64>]) -> Result<String> {
    let columns = alignments
        .iter()
        .map(|alignment| match alignment {
            None => Ok("l"),
            Some(0) => Ok("c"),
            Some(1) => Ok("r"),
            Some(other) => Err(Error::UnrecognizedAlignment(*other)),
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(format!("{{{}}}", columns.join(" ")))
}

fn placeholder_if_empty(text: &str) -> String {
    if text.trim().is_empty() {
        EMPTY_ITEM.to_string()
    } else {
        text.to_string()
    }
}

/// Swap a leading `[x]` / `[ ]` (after whitespace) for a box symbol.
fn replace_checkbox(text: &str) -> String {
    let rest = text.trim_start();
    let indent = &text[..text.len() - rest.len()];
    if let Some(tail) = rest.strip_prefix("[x]") {
        format!("{indent}\\checkedbox{{}}{tail}")
    } else if let Some(tail) = rest.strip_prefix("[ ]") {
        format!("{indent}\\uncheckedbox{{}}{tail}")
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::LocalAssets;
    use crate::{Config, markdown_to_latex, render_document};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const DOCUMENT_START: &str = "\\definecolor{code-background}{gray}{.95}\n";
    const DOCUMENT_END: &str = "\n\\end{document}";

    /// The rendered document between the preamble and `\end{document}`.
    fn body_of(latex: &str) -> String {
        let (_, rest) = latex.split_once(DOCUMENT_START).unwrap();
        let (body, _) = rest.rsplit_once(DOCUMENT_END).unwrap();
        body.trim_matches('\n').to_string()
    }

    fn body(markdown: &str) -> String {
        body_of(&markdown_to_latex(markdown).unwrap())
    }

    fn render_nodes(nodes: Vec<Node>) -> Result<String> {
        render_document(
            &Node::Document(nodes),
            &Config::compiled_default(),
            &LocalAssets,
        )
    }

    fn text(s: &str) -> Node {
        Node::RawText(s.to_string())
    }

    #[test]
    fn heading_and_paragraph() {
        assert_eq!(
            body("# Title\n\nHello *world*"),
            "{\\section*{Title}}\nHello \\textit{world}"
        );
    }

    #[test]
    fn heading_levels() {
        assert_eq!(body("## Two"), "{\\subsection*{\\underline{Two}}}");
        assert_eq!(body("#### Four"), "{\\subsubsection*{Four}}");
        assert_eq!(body("# 100% done"), "{\\section*{100\\% done}}");
    }

    #[test]
    fn paragraphs_are_separated_by_one_forced_break() {
        let out = body("one\n\n\n\ntwo");
        assert_eq!(out, "one\\mbox{}\\\\\n\ntwo");
        assert_eq!(out.matches("\\mbox{}\\\\").count(), 1);
    }

    #[test]
    fn paragraph_opening_with_markup_still_gets_a_forced_break() {
        for (second, rendered) in [
            ("**two**", "\\textbf{two}"),
            ("`two`", "\\colorbox{code-background}{\\texttt{two}}"),
            ("[two](https://x.io)", "\\href{https://x.io}{two}"),
            ("#1 two", "\\#1 two"),
            ("_two_", "\\textit{two}"),
        ] {
            let out = body(&format!("one\n\n\n\n{second}"));
            assert_eq!(out, format!("one\\mbox{{}}\\\\\n\n{rendered}"));
        }
    }

    #[test]
    fn escapes_prose() {
        assert_eq!(body("50% of $x & y_z"), "50\\% of \\$x \\& y\\_z");
        assert_eq!(body("a ~ b ^ c"), "a \\textasciitilde{} b \\textasciicircum{} c");
    }

    #[test]
    fn inline_styles() {
        assert_eq!(
            body("**b** ~~s~~ `c_d`"),
            "\\textbf{b} \\sout{s} \\colorbox{code-background}{\\texttt{c\\_d}}"
        );
        assert_eq!(body("***both***"), "\\textit{\\textbf{both}}");
    }

    #[test]
    fn inline_code_keeps_backslashes() {
        assert_eq!(
            body("`\\{x\\} a\\%b`"),
            "\\colorbox{code-background}{\\texttt{\\textbackslash{}\\{x\\textbackslash{}\\} a\\textbackslash{}\\%b}}"
        );
    }

    #[test]
    fn line_breaks() {
        assert_eq!(body("one\ntwo"), "one two");
        assert_eq!(body("one  \ntwo"), "one\\\\{}two");
    }

    #[test]
    fn links_declare_hyperref() {
        let out = markdown_to_latex("[docs](https://x.io/a%20b) <https://y.io/#top>").unwrap();
        assert_eq!(
            body_of(&out),
            "\\href{https://x.io/a\\%20b}{docs} \\url{https://y.io/\\#top}"
        );
        assert!(out.contains("\\usepackage{hyperref}"));
    }

    #[test]
    fn email_autolink_uses_mailto() {
        let out = markdown_to_latex("<first_last@x.io>").unwrap();
        assert_eq!(
            body_of(&out),
            "\\href{mailto:first_last@x.io}{first\\_last@x.io}"
        );
        assert!(out.contains("\\usepackage{hyperref}"));
    }

    #[test]
    fn unordered_list() {
        assert_eq!(
            body("- one\n- two"),
            "\\begin{itemize}\n  \\item one\n  \\item two\n\\end{itemize}"
        );
    }

    #[test]
    fn ordered_list() {
        assert_eq!(
            body("1. one\n2. two"),
            "\\begin{enumerate}\n  \\item one\n  \\item two\n\\end{enumerate}"
        );
        assert!(body("3. three\n4. four").starts_with("\\begin{enumerate}[start=3]\n"));
    }

    #[test]
    fn nested_list_follows_its_item() {
        assert_eq!(
            body("- a\n  - b\n- c"),
            "\\begin{itemize}\n  \\item a\n  \\begin{itemize}\n    \\item b\n  \\end{itemize}\n  \\item c\n\\end{itemize}"
        );
    }

    #[test]
    fn checkboxes() {
        assert_eq!(
            body("- [x] done\n- [ ] todo"),
            "\\begin{itemize}\n  \\item \\checkedbox{} done\n  \\item \\uncheckedbox{} todo\n\\end{itemize}"
        );
    }

    #[test]
    fn checkbox_after_leading_whitespace() {
        assert_eq!(replace_checkbox("  [x] rest [x]"), "  \\checkedbox{} rest [x]");
        assert_eq!(replace_checkbox("[ ]"), "\\uncheckedbox{}");
        assert_eq!(replace_checkbox("[X] upper"), "[X] upper");
        assert_eq!(replace_checkbox("text [x]"), "text [x]");
    }

    #[test]
    fn empty_item_gets_placeholder() {
        let out = render_nodes(vec![Node::List {
            ordered: false,
            start: None,
            items: vec![Node::ListItem(vec![]), Node::ListItem(vec![text("  ")])],
        }])
        .unwrap();
        assert_eq!(
            body_of(&out),
            "\\begin{itemize}\n  \\item ---\n  \\item ---\n\\end{itemize}"
        );
    }

    #[test]
    fn loose_list_items_keep_paragraphs_apart() {
        assert_eq!(
            body("- a\n\n  b\n\n- c"),
            "\\begin{itemize}\n  \\item a\\par b\\par \n  \\item c\\par \n\\end{itemize}"
        );
    }

    #[test]
    fn code_block_is_verbatim() {
        let out = markdown_to_latex("```rust\nlet a_b = \"50%\";\n\n\nlet c = {};\n```").unwrap();
        assert_eq!(
            body_of(&out),
            "\\begin{lstlisting}[backgroundcolor=\\color{gray!10}]\nlet a_b = \"50%\";\n\n\nlet c = {};\n\\end{lstlisting}"
        );
        assert!(out.contains("\\usepackage{listings}"));
        assert!(out.contains("\\lstset{"));
    }

    #[test]
    fn code_block_in_list_is_not_indented() {
        assert_eq!(
            body("- item\n\n  ```\n  x = 1\n  ```"),
            "\\begin{itemize}\n  \\item item\\par \n  \\begin{lstlisting}[backgroundcolor=\\color{gray!10}]\nx = 1\n  \\end{lstlisting}\n\\end{itemize}"
        );
    }

    #[test]
    fn quote() {
        assert_eq!(
            body("> quoted"),
            "\\begin{leftbar}{\\color{gray}\n  quoted\\mbox{}\\\\\n\n}\\end{leftbar}"
        );
    }

    #[test]
    fn thematic_break() {
        assert_eq!(
            body("a\n\n---\n\nb"),
            "a\n\n\\mbox{}\\hrulefill\\mbox{}\\mbox{}\\\\\n\nb"
        );
    }

    #[test]
    fn table() {
        let out = markdown_to_latex("| A | B | C |\n|---|:-:|--:|\n| 1 | **2** | 3 |").unwrap();
        assert_eq!(
            body_of(&out),
            "\\begin{tabular}{l c r}\nA & B & C \\\\\n\\hline\n1 & \\textbf{2} & 3 \\\\\n\\end{tabular}"
        );
        assert!(out.contains("\\usepackage{array}"));
    }

    #[test]
    fn column_specifiers() {
        assert_eq!(column_spec(&[None, Some(0), Some(1)]).unwrap(), "{l c r}");
        assert!(matches!(
            column_spec(&[None, Some(2)]),
            Err(Error::UnrecognizedAlignment(2))
        ));
    }

    #[test]
    fn bad_alignment_aborts_render() {
        let result = render_nodes(vec![
            Node::Paragraph(vec![text("before")]),
            Node::Table {
                column_alignments: vec![Some(-1)],
                header: None,
                rows: vec![TableRow {
                    cells: vec![vec![text("x")]],
                }],
            },
        ]);
        assert!(matches!(result, Err(Error::UnrecognizedAlignment(-1))));
    }

    #[test]
    fn images_resolve_through_assets() {
        let out = markdown_to_latex("![alt](img/plot.png)").unwrap();
        assert_eq!(
            body_of(&out),
            "\\includegraphics[width=\\textwidth,height=\\textheight,keepaspectratio]{img/plot.png}"
        );
        assert!(out.contains("\\usepackage{graphicx}"));

        assert!(matches!(
            markdown_to_latex("![alt](img/plot)"),
            Err(Error::MissingExtension(_))
        ));
    }

    struct CountingAssets(AtomicUsize);

    impl AssetResolver for CountingAssets {
        fn resolve(&self, url: &str) -> Result<String> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(format!("cache/{url}"))
        }
    }

    #[test]
    fn repeated_image_resolved_once_per_render() {
        let assets = CountingAssets(AtomicUsize::new(0));
        let root = crate::parse("![a](x.png) ![b](x.png) ![c](y.png)");
        let out = render_document(&root, &Config::compiled_default(), &assets).unwrap();

        assert_eq!(out.matches("{cache/x.png}").count(), 2);
        assert_eq!(assets.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn packages_are_only_declared_when_used() {
        let out = markdown_to_latex("plain text").unwrap();
        for package in ["listings", "hyperref", "graphicx", "array"] {
            assert!(!out.contains(&format!("\\usepackage{{{package}}}")));
        }
        assert!(!out.contains("\\lstset"));
    }
}
