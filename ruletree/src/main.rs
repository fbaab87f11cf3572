use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use ruletree::{DataFile, NodeId, NodeKind, Structure};
use serde::Serialize;

#[derive(Debug, Parser)]
#[command(
    name = "ruletree",
    about = "Group flat records into a rule-driven tree",
    version
)]
struct Cli {
    /// Enable verbose logging for debugging.
    #[arg(long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Materialize the tree of a data file and print it.
    Show(ShowArgs),

    /// Validate a data file's configuration and records.
    Check(CheckArgs),

    /// List records whose values contain some text.
    Search(SearchArgs),

    /// Replace text in record values.
    Replace(ReplaceArgs),
}

#[derive(Debug, Args)]
struct ShowArgs {
    /// Data file holding a configuration and its records.
    input: PathBuf,
    /// Emit JSON instead of an indented outline.
    #[arg(long)]
    json: bool,
    /// Stop expanding below this many levels.
    #[arg(long)]
    depth: Option<usize>,
}

#[derive(Debug, Args)]
struct CheckArgs {
    /// Data files to validate.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
}

#[derive(Debug, Args)]
struct SearchArgs {
    input: PathBuf,
    /// Text to look for, ignoring case.
    text: String,
    /// Only search this field.
    #[arg(long)]
    field: Option<String>,
}

#[derive(Debug, Args)]
struct ReplaceArgs {
    input: PathBuf,
    find: String,
    replacement: String,
    /// Only replace in this field.
    #[arg(long)]
    field: Option<String>,
    /// Overwrite the file instead of printing to stdout.
    #[arg(long)]
    in_place: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(if cli.verbose { "debug" } else { "warn" })?;
    match cli.command {
        Commands::Show(args) => handle_show(args),
        Commands::Check(args) => handle_check(args),
        Commands::Search(args) => handle_search(args),
        Commands::Replace(args) => handle_replace(args),
    }
}

fn init_tracing(level: &str) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| anyhow::anyhow!("Invalid log level: {}", e))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    Ok(())
}

fn load(path: &Path) -> Result<(DataFile, Structure)> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {:?}", path))?;
    let data = DataFile::from_json_str(&text).with_context(|| format!("parsing {:?}", path))?;
    let structure = Structure::from_document(&data.config, &data.records, data.settings.clone())
        .with_context(|| format!("loading configuration from {:?}", path))?;
    Ok((data, structure))
}

#[derive(Debug, Serialize)]
struct ShownNode {
    title: String,
    kind: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    outputs: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    children: Vec<ShownNode>,
}

fn collect(structure: &mut Structure, id: NodeId, depth: usize, max: Option<usize>) -> Result<ShownNode> {
    let node = structure.node(id)?;
    let kind = match node.kind {
        NodeKind::Title { .. } => "title",
        NodeKind::Group(_) => "group",
        NodeKind::Leaf(_) => "leaf",
    };
    let outputs = if kind == "leaf" {
        structure.outputs(id)?
    } else {
        Vec::new()
    };
    let mut children = Vec::new();
    if max.is_none_or(|max| depth < max) {
        for child in structure.child_nodes(id, false)? {
            children.push(collect(structure, child, depth + 1, max)?);
        }
    }
    Ok(ShownNode {
        title: structure.title(id)?,
        kind,
        outputs,
        children,
    })
}

fn outline(node: &ShownNode, indent: usize, out: &mut Vec<String>) {
    let pad = "  ".repeat(indent);
    let title = if node.title.is_empty() && node.kind == "group" {
        "(none)"
    } else {
        node.title.as_str()
    };
    out.push(format!("{pad}{title}"));
    for line in node.outputs.iter().skip(1) {
        out.push(format!("{pad}  | {line}"));
    }
    for child in &node.children {
        outline(child, indent + 1, out);
    }
}

fn materialize(structure: &mut Structure, max: Option<usize>) -> Result<Vec<ShownNode>> {
    let roots = structure.root_nodes().to_vec();
    roots
        .into_iter()
        .map(|root| collect(structure, root, 0, max))
        .collect()
}

fn handle_show(args: ShowArgs) -> Result<()> {
    let ShowArgs { input, json, depth } = args;
    let (_, mut structure) = load(&input)?;
    let tree = materialize(&mut structure, depth)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&tree)?);
    } else {
        let mut lines = Vec::new();
        for node in &tree {
            outline(node, 0, &mut lines);
        }
        for line in lines {
            println!("{line}");
        }
    }
    Ok(())
}

fn handle_check(args: CheckArgs) -> Result<()> {
    let mut failures = 0;
    for input in &args.inputs {
        match load(input) {
            Ok((_, structure)) => {
                let bad_formats: Vec<String> = structure
                    .fields()
                    .iter()
                    .filter_map(|f| f.check_format().err())
                    .map(|e| e.to_string())
                    .collect();
                if bad_formats.is_empty() {
                    println!("{}: ok", input.display());
                } else {
                    for msg in bad_formats {
                        println!("{}: {}", input.display(), msg);
                    }
                }
            }
            Err(e) => {
                failures += 1;
                println!("{}: {:#}", input.display(), e);
            }
        }
    }
    if failures > 0 {
        anyhow::bail!("{failures} file(s) failed to load");
    }
    Ok(())
}

fn handle_search(args: SearchArgs) -> Result<()> {
    let SearchArgs { input, text, field } = args;
    let (_, structure) = load(&input)?;
    let found = structure.search(&text, field.as_deref())?;
    if found.is_empty() {
        eprintln!("No records match {:?}.", text);
        return Ok(());
    }
    for id in found {
        let record = structure.record(id)?;
        println!("{}", structure.title_line().render(record));
    }
    Ok(())
}

fn handle_replace(args: ReplaceArgs) -> Result<()> {
    let ReplaceArgs {
        input,
        find,
        replacement,
        field,
        in_place,
    } = args;
    let (data, mut structure) = load(&input)?;
    let count = structure.replace_all(&find, &replacement, field.as_deref())?;
    eprintln!("Replaced {count} value(s).");

    let updated = DataFile {
        config: structure.to_document(),
        records: structure.record_documents(),
        settings: data.settings,
    };
    let text = updated.to_json_string()?;
    if in_place {
        fs::write(&input, text).with_context(|| format!("writing {:?}", input))?;
    } else {
        println!("{text}");
    }
    Ok(())
}
