mod assets;
mod config;
mod document;
mod error;
pub mod format;
mod latex;
mod node;
mod packages;
mod parser;
mod tree;

#[cfg(feature = "http")]
pub use assets::HttpFetcher;
pub use assets::{AssetResolver, CachingResolver, Fetch, LocalAssets, extension};
pub use config::{AssetsConfig, Config, DocumentConfig, FontConfig};
pub use document::{build_preamble, normalize_blank_lines, render_document};
pub use error::{Error, Result};
pub use latex::{Renderer, column_spec};
pub use node::{Node, TableRow};
pub use packages::{Package, PackageSet};
pub use tree::{Block, NodeHandle, RenderNode, RenderTree, Span};

/// Parse markdown text into a document node.
pub fn parse(markdown: &str) -> Node {
    parser::parse(markdown)
}

/// Convert markdown to LaTeX using the default config, with image
/// references used as local paths.
pub fn markdown_to_latex(markdown: &str) -> Result<String> {
    markdown_to_latex_with_config(markdown, &Config::compiled_default(), &LocalAssets)
}

/// Convert markdown to LaTeX with custom config and image resolution.
pub fn markdown_to_latex_with_config(
    markdown: &str,
    config: &Config,
    assets: &dyn AssetResolver,
) -> Result<String> {
    let root = parse(markdown);
    render_document(&root, config, assets)
}
