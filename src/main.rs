use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use crxview::config::{DEFAULT_MAX_ENTRY_SIZE, DEFAULT_MAX_PACKAGE_SIZE, Limits};
use crxview::download::Downloader;
use crxview::download::chrome::ChromeDownloader;
use crxview::filter::FilterQuery;
use crxview::input::{InputSource, parse_input};
use crxview::models::FileCategory;
use crxview::output::terminal;
use crxview::search::SearchQuery;
use crxview::ExtensionPackage;
use std::io::Write;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "crxview")]
#[command(about = "Inspect, filter and search Chrome extension packages")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Largest package accepted, in bytes
    #[arg(long, global = true, env = "CRXVIEW_MAX_PACKAGE_SIZE", default_value_t = DEFAULT_MAX_PACKAGE_SIZE)]
    max_package_size: usize,

    /// Largest single file that will be decompressed, in bytes
    #[arg(long, global = true, env = "CRXVIEW_MAX_ENTRY_SIZE", default_value_t = DEFAULT_MAX_ENTRY_SIZE)]
    max_entry_size: u64,

    /// Log pipeline steps to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show header, id, manifest and permissions
    Info {
        /// Extension ID, Web Store URL, or file path
        input: String,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Print the file tree, optionally filtered
    Tree {
        /// Extension ID, Web Store URL, or file path
        input: String,

        #[command(flatten)]
        filter: FilterArgs,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Search file contents
    Search {
        /// Extension ID, Web Store URL, or file path
        input: String,

        /// Text or regex to look for
        pattern: String,

        /// Treat the pattern as a regular expression
        #[arg(short = 'e', long)]
        regex: bool,

        /// Match case exactly
        #[arg(short = 's', long)]
        case_sensitive: bool,

        /// Only match whole words
        #[arg(short, long)]
        word: bool,

        /// Lines of context around each match (0-10)
        #[arg(short = 'C', long, default_value_t = 2, value_parser = clap::value_parser!(u8).range(0..=10))]
        context: u8,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Print one file from the package
    Cat {
        /// Extension ID, Web Store URL, or file path
        input: String,

        /// Path inside the package
        path: String,
    },
}

#[derive(Args, Debug)]
struct FilterArgs {
    /// Glob (or regex with --regex) matched against file names
    #[arg(short, long)]
    name: Option<String>,

    /// Treat --name as a regular expression
    #[arg(short = 'e', long)]
    regex: bool,

    /// Match --name case exactly
    #[arg(short = 's', long)]
    case_sensitive: bool,

    /// Only include files of these categories
    #[arg(short, long, value_delimiter = ',')]
    category: Vec<FileCategory>,

    /// Minimum file size in bytes
    #[arg(long)]
    min_size: Option<u64>,

    /// Maximum file size in bytes
    #[arg(long)]
    max_size: Option<u64>,
}

impl FilterArgs {
    fn is_empty(&self) -> bool {
        self.name.is_none() && self.category.is_empty() && self.min_size.is_none() && self.max_size.is_none()
    }

    fn to_query(&self) -> FilterQuery {
        FilterQuery {
            name_pattern: self.name.clone(),
            use_regex: self.regex,
            case_sensitive: self.case_sensitive,
            categories: self.category.clone(),
            min_size: self.min_size,
            max_size: self.max_size,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let limits = Limits::default()
        .with_max_package_size(cli.max_package_size)
        .with_max_entry_size(cli.max_entry_size);

    match cli.command {
        Command::Info { input, json } => {
            let package = load_package(&input, &limits).await?;
            if json {
                print_json(&info_json(&package))?;
            } else {
                terminal::print_package_info(&package);
            }
        }
        Command::Tree { input, filter, json } => {
            let package = load_package(&input, &limits).await?;
            let tree = if filter.is_empty() {
                package.tree().clone()
            } else {
                package.filter(&filter.to_query())?
            };
            if json {
                print_json(&tree.nested())?;
            } else {
                terminal::print_tree(&tree);
            }
        }
        Command::Search {
            input,
            pattern,
            regex,
            case_sensitive,
            word,
            context,
            json,
        } => {
            let package = load_package(&input, &limits).await?;
            let query = SearchQuery {
                pattern,
                use_regex: regex,
                case_sensitive,
                whole_word: word,
                context_lines: usize::from(context),
            };
            run_search(&package, &query, json).await?;
        }
        Command::Cat { input, path } => {
            let package = load_package(&input, &limits).await?;
            let content = package
                .read_file(&path)
                .with_context(|| format!("Failed to read {} from package", path))?;
            std::io::stdout().write_all(&content)?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "crxview=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn load_package(input: &str, limits: &Limits) -> Result<ExtensionPackage> {
    let source = parse_input(input)?;
    let data = match &source {
        InputSource::LocalFile(path) => tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?,
        InputSource::WebStore(id) => download(id, limits).await?,
    };

    ExtensionPackage::from_bytes(data, limits)
        .with_context(|| format!("Failed to load {}", source.describe()))
}

async fn download(id: &str, limits: &Limits) -> Result<Vec<u8>> {
    let downloader = ChromeDownloader::new()?.with_max_size(limits.max_package_size);
    downloader.download(id).await
}

async fn run_search(package: &ExtensionPackage, query: &SearchQuery, json: bool) -> Result<()> {
    let mut session = package.search_session();
    let mut ticket = session.submit(query)?;
    let search_id = ticket.id;

    let token = ticket.cancellation_token();
    loop {
        tokio::select! {
            progress = ticket.progress.recv() => match progress {
                Some(p) if !json => {
                    eprint!("\rSearching {}/{} files, {} matches", p.files_processed, p.total_files, p.matches_found);
                }
                Some(_) => {}
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                token.cancel();
                break;
            }
        }
    }
    if !json {
        eprint!("\r\x1b[2K");
    }

    let outcome = ticket.outcome().await?;
    let Some(outcome) = session.accept(search_id, outcome) else {
        return Ok(());
    };

    if json {
        print_json(&outcome)?;
    } else {
        terminal::print_search_outcome(&outcome);
    }
    Ok(())
}

fn info_json(package: &ExtensionPackage) -> serde_json::Value {
    let tree = package.tree();
    serde_json::json!({
        "format": package.format(),
        "header": package.header(),
        "extension_id": package.extension_id(),
        "manifest": package.manifest().ok(),
        "manifest_error": package.manifest().err().map(|e| e.to_string()),
        "files": tree.file_count(),
        "total_size": tree.total_size(),
        "collisions": tree.collisions(),
        "skipped": tree.skipped(),
    })
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}
