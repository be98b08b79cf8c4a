//! Whole-document assembly: preamble, body, postamble, and the final
//! blank-line pass.

use tracing::{debug, info};

use crate::assets::AssetResolver;
use crate::config::Config;
use crate::error::Result;
use crate::latex::Renderer;
use crate::node::Node;
use crate::packages::PackageSet;

pub const POSTAMBLE: &str = r"\end{document}";

/// Appended to a line that is followed by blank lines, so the vertical
/// space survives typesetting.
pub const BLANK_LINE_MARKER: &str = r"\mbox{}\\";

const DOCUMENT_BEGIN: &str = r"\begin{document}";
const VERBATIM_BEGIN: &str = r"\begin{lstlisting}";
const VERBATIM_END: &str = r"\end{lstlisting}";

/// Lines that start a structural element. A blank run in front of one of
/// these already reads as a break and gets no marker.
const STRUCTURAL_PREFIXES: &[&str] = &[
    r"\begin{",
    r"\end{",
    r"\item",
    r"\includegraphics",
    r"\mbox{}\hrulefill",
    r"{\section*",
    r"{\subsection*",
    r"{\subsubsection*",
];

const STATIC_PACKAGES: &str = r"\usepackage{mdframed}
\usepackage[normalem]{ulem}
\usepackage{xcolor}
\usepackage{etoolbox}
\usepackage{fancyvrb}
\usepackage{xunicode}
\usepackage[english]{babel}
\usepackage[T1]{fontenc}
\usepackage{eurosym}
\usepackage{textcomp}
\usepackage{enumitem,amssymb}
\usepackage{cprotect}
\usepackage{framed}
";

const LISTINGS_SETUP: &str = r"\lstset{
  basicstyle=\ttfamily,
  columns=fullflexible,
  frame=single,
  breaklines=true,
  postbreak=\mbox{\textcolor{red}{$\hookrightarrow$}\space},
  backgroundcolor=\color{gray!10}
}
";

const DEFINITIONS: &str = r"\newcommand{\checkedbox}{\mbox{\ooalign{$\checkmark$\cr\hidewidth$\square$\hidewidth\cr}}}
\newcommand{\uncheckedbox}{$\square$}
\setlength{\parindent}{0pt}

\newlength{\leftbarwidth}
\setlength{\leftbarwidth}{2pt}
\newlength{\leftbarsep}
\setlength{\leftbarsep}{8pt}
\definecolor{light-gray}{gray}{0.85}
\newcommand*{\leftbarcolorcmd}{\color{leftbarcolor}}%
\colorlet{leftbarcolor}{light-gray}

\renewenvironment{leftbar}{%
  \def\FrameCommand{{\leftbarcolorcmd{\vrule width \leftbarwidth\relax\hspace {\leftbarsep}}}}%
  \MakeFramed {\advance \hsize -\width \FrameRestore }%
  }{%
  \endMakeFramed
}

\begin{document}
\definecolor{code-background}{gray}{.95}";

/// Render a parsed document to a complete LaTeX source file.
///
/// Nothing is returned unless the whole document renders: any error from
/// the walk or from image resolution aborts the render.
pub fn render_document(
    root: &Node,
    config: &Config,
    assets: &dyn AssetResolver,
) -> Result<String> {
    let mut renderer = Renderer::new(assets);

    // The preamble depends on the packages the body needs, so it is filled
    // in after the walk.
    let preamble = renderer.push("")?;
    renderer.render(root)?;
    renderer.push(POSTAMBLE)?;

    let (mut tree, packages) = renderer.finish();
    debug!(packages = packages.len(), "document walked");
    tree.replace_text(&preamble, build_preamble(config, &packages))?;

    let root = tree.into_root()?;
    let latex = normalize_blank_lines(&root.serialize_body(&config.document.indent, 0));
    info!(bytes = latex.len(), "document rendered");
    Ok(latex)
}

/// Document class, packages and definitions up to `\begin{document}`.
pub fn build_preamble(config: &Config, packages: &PackageSet) -> String {
    let mut out = String::new();

    out.push_str(&format!("\\documentclass{{{}}}\n\n", config.document.class));
    out.push_str(STATIC_PACKAGES);
    if !packages.is_empty() {
        out.push_str(&packages.directives());
        out.push('\n');
    }
    if packages.contains("listings") {
        out.push_str(LISTINGS_SETUP);
    }
    out.push('\n');

    out.push_str("\\usepackage{xltxtra}\n");
    out.push_str(&format!("\\setmainfont{{{}}}\n", config.fonts.main));
    out.push_str(&format!("\\setmonofont{{{}}}\n\n", config.fonts.mono));

    if !config.document.graphics_path.is_empty() {
        let dirs: String = config
            .document
            .graphics_path
            .iter()
            .map(|dir| format!("{{{dir}}}"))
            .collect();
        out.push_str(&format!("\\graphicspath{{ {dirs} }}\n"));
    }

    out.push_str(DEFINITIONS);
    out
}

/// Collapse each run of blank lines between two non-blank lines into one
/// blank line, marking the end of the preceding line with
/// [`BLANK_LINE_MARKER`].
///
/// Runs in front of a structural line (an environment boundary, a list item,
/// a heading, an image or a rule) are left alone. So is everything up to
/// `\begin{document}` and everything inside a `lstlisting` environment.
pub fn normalize_blank_lines(text: &str) -> String {
    let lines: Vec<&str> = text.split('\n').collect();
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    let mut preamble = lines
        .iter()
        .any(|line| line.trim_start().starts_with(DOCUMENT_BEGIN));
    let mut verbatim = false;
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        let trimmed = line.trim_start();
        out.push(line.to_string());
        i += 1;

        if preamble {
            preamble = !trimmed.starts_with(DOCUMENT_BEGIN);
            continue;
        }
        if verbatim {
            verbatim = !trimmed.starts_with(VERBATIM_END);
            if verbatim {
                continue;
            }
        } else if trimmed.starts_with(VERBATIM_BEGIN) {
            verbatim = true;
            continue;
        }
        if trimmed.is_empty() {
            continue;
        }

        let Some(offset) = lines[i..].iter().position(|l| !l.trim().is_empty()) else {
            continue;
        };
        if offset == 0 || is_structural(lines[i + offset]) {
            continue;
        }

        if let Some(last) = out.last_mut() {
            last.push_str(BLANK_LINE_MARKER);
        }
        out.push(String::new());
        i += offset;
    }

    out.join("\n")
}

fn is_structural(line: &str) -> bool {
    let line = line.trim_start();
    STRUCTURAL_PREFIXES
        .iter()
        .any(|prefix| line.starts_with(prefix))
}
