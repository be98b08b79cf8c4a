//! Escaping and inline formatting transforms.
//!
//! Every formatter here is a pure `&str -> String` function. The ones that
//! need an argument (links, headings) are built as [`Transform`] values so
//! they can be attached to a span.

use std::fmt;
use std::sync::Arc;

/// Characters escaped by prefixing a backslash.
const RESERVED: &[char] = &['#', '$', '%', '&', '_', '{', '}'];

/// Characters that have no backslash form and are replaced with a macro.
const REPLACEMENTS: &[(char, &str)] = &[
    ('~', r"\textasciitilde{}"),
    ('^', r"\textasciicircum{}"),
    ('\\', r"\textbackslash{}"),
];

/// A text transform attached to a span or block.
#[derive(Clone)]
pub struct Transform(Arc<dyn Fn(&str) -> String + Send + Sync>);

impl Transform {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Transform(Arc::new(f))
    }

    pub fn apply(&self, text: &str) -> String {
        (self.0)(text)
    }

    /// Build a single transform out of several. The last one is applied
    /// first, so `compose([f, g])` behaves like `f(g(text))`.
    pub fn compose<I>(transforms: I) -> Self
    where
        I: IntoIterator<Item = Transform>,
    {
        let transforms: Vec<Transform> = transforms.into_iter().collect();
        Transform::new(move |text| {
            transforms
                .iter()
                .rev()
                .fold(text.to_string(), |acc, transform| transform.apply(&acc))
        })
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Transform(..)")
    }
}

/// Escape the characters the typesetter reserves for itself.
///
/// Every occurrence is escaped, backslashes included. Only source text is
/// passed through here, never rendered markup, so nothing gets escaped twice.
/// Text without reserved characters comes back unchanged.
pub fn escape_special(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if RESERVED.contains(&ch) {
            out.push('\\');
            out.push(ch);
        } else if let Some((_, replacement)) = REPLACEMENTS.iter().find(|(c, _)| *c == ch) {
            out.push_str(replacement);
        } else {
            out.push(ch);
        }
    }
    out
}

/// Escape a link target for use inside `\href` and `\url`.
pub fn escape_url(target: &str) -> String {
    let mut out = String::with_capacity(target.len());
    for ch in target.chars() {
        if matches!(ch, '%' | '#') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

pub fn bold(text: &str) -> String {
    format!("\\textbf{{{text}}}")
}

pub fn italic(text: &str) -> String {
    format!("\\textit{{{text}}}")
}

pub fn strikethrough(text: &str) -> String {
    format!("\\sout{{{text}}}")
}

pub fn underline(text: &str) -> String {
    format!("\\underline{{{text}}}")
}

pub fn inline_code_box(text: &str) -> String {
    format!("\\colorbox{{code-background}}{{\\texttt{{{text}}}}}")
}

pub fn hyperlink(target: &str) -> Transform {
    let target = escape_url(target);
    Transform::new(move |text| format!("\\href{{{target}}}{{{text}}}"))
}

/// Sectioning command for a heading level. Level 2 is also underlined;
/// everything below level 3 shares the third-level command.
pub fn heading_wrapper(level: u8) -> Transform {
    match level {
        0 => Transform::new(underline),
        1 => Transform::new(|text| format!("{{\\section*{{{text}}}}}")),
        2 => Transform::new(|text| format!("{{\\subsection*{{{}}}}}", underline(text))),
        _ => Transform::new(|text| format!("{{\\subsubsection*{{{text}}}}}")),
    }
}
