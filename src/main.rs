use std::fs;
use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use mdtex::{AssetResolver, Config, LocalAssets};

#[derive(Parser)]
#[command(name = "mdtex")]
#[command(about = "Convert Markdown files to LaTeX")]
struct Cli {
    /// Input Markdown file
    input: PathBuf,

    /// Output .tex file (defaults to input name with .tex extension)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Configuration file
    #[arg(short, long, default_value = "mdtex.toml")]
    config: PathBuf,

    /// Download remote images into the configured image directory
    #[arg(long)]
    fetch_images: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config);

    // Read input file
    let markdown = match fs::read_to_string(&cli.input) {
        Ok(content) => content,
        Err(e) => {
            eprintln!("Error reading {}: {}", cli.input.display(), e);
            std::process::exit(1);
        }
    };

    let assets = match asset_resolver(&cli, &config) {
        Ok(assets) => assets,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    // Convert markdown to LaTeX
    let latex = match mdtex::markdown_to_latex_with_config(&markdown, &config, assets.as_ref()) {
        Ok(latex) => latex,
        Err(e) => {
            eprintln!("Error rendering {}: {}", cli.input.display(), e);
            std::process::exit(1);
        }
    };

    // Determine output path
    let output = cli
        .output
        .unwrap_or_else(|| cli.input.with_extension("tex"));

    if let Err(e) = fs::write(&output, latex) {
        eprintln!("Error writing {}: {}", output.display(), e);
        std::process::exit(1);
    }

    println!("Created {}", output.display());
}

#[cfg(feature = "http")]
fn asset_resolver(cli: &Cli, config: &Config) -> mdtex::Result<Box<dyn AssetResolver>> {
    if cli.fetch_images {
        let fetcher = mdtex::HttpFetcher::new()?;
        Ok(Box::new(mdtex::CachingResolver::new(
            config.assets.image_dir.clone(),
            fetcher,
        )))
    } else {
        Ok(Box::new(LocalAssets))
    }
}

#[cfg(not(feature = "http"))]
fn asset_resolver(cli: &Cli, _config: &Config) -> mdtex::Result<Box<dyn AssetResolver>> {
    if cli.fetch_images {
        return Err(mdtex::Error::Fetch {
            url: String::new(),
            message: "built without the `http` feature".into(),
        });
    }
    Ok(Box::new(LocalAssets))
}
