use std::{
    collections::{BTreeSet, HashSet},
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use floatlog::config::ParserConfig;
use floatlog::core::{Entry, EntryStatus};
use floatlog::format::{OutlineOptions, render_outline};
use floatlog::parser::LogParser;
use floatlog::projectors::search_projector::{self, SearchQuery};
use floatlog::service;
use floatlog::storage::{FileSource, LogSource, SampleSource, load_entries};
use tracing::debug;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(
    name = "floatlog",
    about = "Turn floatlog markdown into a tree of entries",
    version
)]
struct Cli {
    /// Enable verbose logging for debugging.
    #[arg(long, global = true)]
    verbose: bool,
    /// TOML file overriding parser settings.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Parse log files and print their entry trees.
    Parse(ParseArgs),

    /// Print an indented outline of a log.
    Outline(OutlineArgs),

    /// List top-level entries matching a query.
    Search(SearchArgs),

    /// Replace the context of one entry and print the resulting tree as JSON.
    Update(UpdateArgs),

    /// Parse the built-in sample log.
    Sample(SampleArgs),
}

#[derive(Debug, Args)]
struct ParseArgs {
    /// Log files, or directories containing markdown logs.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
    /// Emit JSON instead of a debug representation.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct OutlineArgs {
    /// Log file to render.
    input: PathBuf,
    /// Show bodies and children of collapsed entries too.
    #[arg(long)]
    expand_all: bool,
}

#[derive(Debug, Args)]
struct SearchArgs {
    /// Log file to search.
    input: PathBuf,
    /// Case-insensitive text matched against title, context, tags and id.
    #[arg(long, short)]
    query: Option<String>,
    /// Only entries with this status.
    #[arg(long)]
    status: Option<EntryStatus>,
    /// Inclusive start date filter (YYYY-MM-DD).
    #[arg(long)]
    from: Option<NaiveDate>,
    /// Inclusive end date filter (YYYY-MM-DD).
    #[arg(long)]
    to: Option<NaiveDate>,
    /// Emit JSON instead of a human-readable list.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct UpdateArgs {
    /// Log file holding the entry.
    input: PathBuf,
    /// Id of the entry to edit (children use their `uid`).
    #[arg(long)]
    id: String,
    /// New context text.
    #[arg(long, conflicts_with = "content_file", required_unless_present = "content_file")]
    content: Option<String>,
    /// Read the new context from this file.
    #[arg(long)]
    content_file: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct SampleArgs {
    /// Emit JSON instead of an outline.
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => ParserConfig::load(path)?,
        None => ParserConfig::default(),
    };

    match cli.command {
        Commands::Parse(args) => handle_parse(args, &config),
        Commands::Outline(args) => handle_outline(args, &config),
        Commands::Search(args) => handle_search(args, &config),
        Commands::Update(args) => handle_update(args, &config),
        Commands::Sample(args) => handle_sample(args, &config),
    }
}

fn init_logging(verbose: bool) {
    let fallback = if verbose {
        "floatlog=debug"
    } else {
        "floatlog=warn"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn read_entries(source: &dyn LogSource, config: &ParserConfig) -> Result<Vec<Entry>> {
    let mut parser = LogParser::with_config(config.clone());
    load_entries(source, &mut parser).with_context(|| format!("loading {}", source.describe()))
}

fn handle_parse(args: ParseArgs, config: &ParserConfig) -> Result<()> {
    let ParseArgs { inputs, json } = args;
    let expanded = expand_inputs(&inputs)?;
    if expanded.is_empty() {
        anyhow::bail!("no log files found in the provided inputs");
    }

    let mut parsed = Vec::new();
    for path in expanded {
        debug!(?path, "parsing");
        let entries = read_entries(&FileSource::new(&path), config)?;
        parsed.push((path, entries));
    }

    if json {
        #[derive(serde::Serialize)]
        struct JsonOutput<'a> {
            path: String,
            entries: &'a [Entry],
        }

        let payload: Vec<JsonOutput<'_>> = parsed
            .iter()
            .map(|(path, entries)| JsonOutput {
                path: path.display().to_string(),
                entries,
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        for (idx, (path, entries)) in parsed.iter().enumerate() {
            if parsed.len() > 1 {
                println!("== {} ==", path.display());
            }
            println!("{:#?}", entries);
            if parsed.len() > 1 && idx + 1 < parsed.len() {
                println!();
            }
        }
    }
    Ok(())
}

fn handle_outline(args: OutlineArgs, config: &ParserConfig) -> Result<()> {
    let OutlineArgs { input, expand_all } = args;
    let entries = read_entries(&FileSource::new(input), config)?;
    if entries.is_empty() {
        eprintln!("No entries found; headers look like `## [ctx:...]`.");
        return Ok(());
    }
    print!("{}", render_outline(&entries, OutlineOptions { expand_all }));
    Ok(())
}

fn handle_search(args: SearchArgs, config: &ParserConfig) -> Result<()> {
    let SearchArgs {
        input,
        query,
        status,
        from,
        to,
        json,
    } = args;

    let entries = read_entries(&FileSource::new(input), config)?;
    let query = SearchQuery {
        text: query,
        status,
        from,
        to,
    };
    let found = search_projector::search(&entries, &query);

    if found.is_empty() {
        eprintln!("No entries matched.");
        return Ok(());
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&found)?);
    } else {
        for entry in found {
            let date = entry.date.as_deref().unwrap_or("—");
            let tags = if entry.tags.is_empty() {
                String::new()
            } else {
                format!("  {}", entry.tags.join(" "))
            };
            println!(
                "{:<10} {:<11} {} ({}){}",
                date, entry.status, entry.title, entry.timestamp, tags
            );
        }
    }
    Ok(())
}

fn handle_update(args: UpdateArgs, config: &ParserConfig) -> Result<()> {
    let UpdateArgs {
        input,
        id,
        content,
        content_file,
    } = args;

    let content = resolve_content(content, content_file.as_deref())?;
    let mut entries = read_entries(&FileSource::new(input), config)?;
    service::update_context(&mut entries, &id, &content)?;
    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(())
}

fn handle_sample(args: SampleArgs, config: &ParserConfig) -> Result<()> {
    let entries = read_entries(&SampleSource, config)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        print!("{}", render_outline(&entries, OutlineOptions::default()));
    }
    Ok(())
}

fn resolve_content(inline: Option<String>, file: Option<&Path>) -> Result<String> {
    match (inline, file) {
        (Some(text), None) => Ok(text),
        (None, Some(path)) => {
            fs::read_to_string(path).with_context(|| format!("reading content {:?}", path))
        }
        (Some(_), Some(_)) => anyhow::bail!("--content cannot be combined with --content-file"),
        (None, None) => anyhow::bail!("one of --content or --content-file is required"),
    }
}

fn is_markdown(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext == "md" || ext == "markdown")
        .unwrap_or(false)
}

fn collect_log_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let mut visited = HashSet::new();
    visit_dir(dir, &mut out, &mut visited)?;
    out.sort();
    out.dedup();
    Ok(out)
}

/// Files are taken as given; directories contribute their markdown files, recursively.
fn expand_inputs(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let mut visited = BTreeSet::new();
    for path in paths {
        let canonical =
            fs::canonicalize(path).with_context(|| format!("resolving path {:?}", path))?;
        let meta = fs::metadata(&canonical)
            .with_context(|| format!("reading metadata for {:?}", canonical))?;
        if meta.is_dir() {
            debug!(dir = ?canonical, "scanning directory");
            for file in collect_log_files(&canonical)? {
                if visited.insert(file.clone()) {
                    out.push(file);
                }
            }
        } else if meta.is_file() {
            if visited.insert(canonical.clone()) {
                out.push(canonical);
            }
        } else {
            anyhow::bail!("{:?} is neither a file nor a directory", canonical);
        }
    }
    Ok(out)
}

fn visit_dir(path: &Path, out: &mut Vec<PathBuf>, visited: &mut HashSet<PathBuf>) -> Result<()> {
    let canonical = fs::canonicalize(path)?;
    if !visited.insert(canonical.clone()) {
        return Ok(());
    }

    let metadata = fs::metadata(&canonical)?;
    if metadata.is_dir() {
        for entry in fs::read_dir(&canonical)? {
            let entry = entry?;
            if entry.file_type()?.is_symlink() {
                continue;
            }
            visit_dir(&entry.path(), out, visited)?;
        }
    } else if metadata.is_file() && is_markdown(&canonical) {
        debug!(file = ?canonical, "found log file");
        out.push(canonical);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn expand_inputs_recurses_for_markdown_only() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let root = tmp.path();
        let nested = root.join("2025").join("april");
        fs::create_dir_all(&nested).expect("mkdir nested");
        fs::write(root.join("a.md"), "## [ctx:a]").expect("write a");
        fs::write(nested.join("b.markdown"), "## [ctx:b]").expect("write b");
        fs::write(nested.join("notes.txt"), "skip me").expect("write txt");

        let found = expand_inputs(&[root.to_path_buf()]).expect("expand");
        let names: Vec<String> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"a.md".to_string()));
        assert!(names.contains(&"b.markdown".to_string()));
    }

    #[test]
    fn expand_inputs_keeps_explicit_files_and_dedups() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let log = tmp.path().join("session.log");
        fs::write(&log, "## [ctx:a]").expect("write log");

        let found = expand_inputs(&[log.clone(), log.clone()]).expect("expand");
        assert_eq!(found, vec![fs::canonicalize(&log).expect("canonical")]);
    }

    #[test]
    fn expand_inputs_reports_missing_paths() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let err = expand_inputs(&[tmp.path().join("gone.md")]).expect_err("missing");
        assert!(format!("{err:#}").contains("gone.md"));
    }

    #[test]
    fn resolve_content_prefers_exactly_one_source() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let file = tmp.path().join("body.md");
        fs::write(&file, "from file\n").expect("write body");

        assert_eq!(resolve_content(Some("inline".into()), None).expect("inline"), "inline");
        assert_eq!(
            resolve_content(None, Some(&file)).expect("file"),
            "from file\n"
        );
        assert!(resolve_content(None, None).is_err());
        assert!(resolve_content(Some("x".into()), Some(&file)).is_err());
    }

    #[test]
    fn update_flow_edits_child_context() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let log = tmp.path().join("log.md");
        fs::write(&log, "## [ctx:a]\n---\nuid: child::1\n---\n").expect("write log");

        let mut entries =
            read_entries(&FileSource::new(&log), &ParserConfig::default()).expect("read");
        service::update_context(&mut entries, "child::1", "edited").expect("update");
        assert_eq!(entries[0].children[0].context, "edited");
    }

    #[test]
    fn cli_accepts_status_labels() {
        let cli = Cli::try_parse_from([
            "floatlog", "search", "log.md", "--status", "in-progress", "--from", "2025-04-01",
        ])
        .expect("parse args");
        match cli.command {
            Commands::Search(args) => {
                assert_eq!(args.status, Some(EntryStatus::InProgress));
                assert_eq!(args.from, NaiveDate::from_ymd_opt(2025, 4, 1));
            }
            other => panic!("expected search, got {:?}", other),
        }
    }
}
