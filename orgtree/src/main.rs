use std::{
    collections::{BTreeSet, HashSet},
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use orgtree::core::plain_text;
use orgtree::{Configuration, Document, OrgWriter};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "orgtree", about = "Parse and inspect Org-mode documents", version)]
struct Cli {
    /// Enable verbose logging for debugging.
    #[arg(long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Parse Org files and print their node trees.
    Parse(ParseArgs),

    /// Re-print Org files from their parsed form.
    Format(FormatArgs),

    /// Print the numbered section outline.
    Outline(InputArgs),

    /// Print link abbreviations, named elements and resolved id links.
    Links(InputArgs),
}

#[derive(Debug, Args)]
struct InputArgs {
    /// Org files or directories containing Org files.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
}

#[derive(Debug, Args)]
struct ParseArgs {
    /// Org files or directories containing Org files to parse.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
    /// Emit JSON instead of a debug representation.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct FormatArgs {
    /// Org files or directories to format.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
    /// Overwrite the file instead of printing to stdout.
    #[arg(long)]
    in_place: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Configuration::new();
    match cli.command {
        Commands::Parse(args) => handle_parse(&config, args),
        Commands::Format(args) => handle_format(&config, args),
        Commands::Outline(args) => handle_outline(&config, args),
        Commands::Links(args) => handle_links(&config, args),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Parse every input, failing on the first document that could not be parsed.
fn parse_inputs<'c>(
    config: &'c Configuration,
    inputs: &[PathBuf],
) -> Result<Vec<(PathBuf, Document<'c>)>> {
    let expanded = expand_inputs(inputs)?;
    if expanded.is_empty() {
        anyhow::bail!("no Org files found in the provided inputs");
    }

    let mut parsed = Vec::new();
    for path in expanded {
        tracing::debug!(path = %path.display(), "parsing");
        let doc = config
            .parse_file(&path)
            .with_context(|| format!("reading {:?}", path))?;
        if let Some(err) = &doc.error {
            return Err(err.clone()).with_context(|| format!("parsing {:?}", path));
        }
        parsed.push((path, doc));
    }
    Ok(parsed)
}

fn print_header(parsed_len: usize, idx: usize, path: &Path) {
    if parsed_len > 1 {
        if idx > 0 {
            println!();
        }
        println!("== {} ==", path.display());
    }
}

fn handle_parse(config: &Configuration, args: ParseArgs) -> Result<()> {
    let ParseArgs { inputs, json } = args;
    let parsed = parse_inputs(config, &inputs)?;

    if json {
        #[derive(serde::Serialize)]
        struct JsonOutput<'a> {
            path: String,
            org: &'a Document<'a>,
        }

        let payload: Vec<JsonOutput<'_>> = parsed
            .iter()
            .map(|(path, doc)| JsonOutput {
                path: path.display().to_string(),
                org: doc,
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        for (idx, (path, doc)) in parsed.iter().enumerate() {
            print_header(parsed.len(), idx, path);
            println!("{:#?}", doc.nodes);
        }
    }
    Ok(())
}

fn handle_format(config: &Configuration, args: FormatArgs) -> Result<()> {
    let FormatArgs { inputs, in_place } = args;
    let parsed = parse_inputs(config, &inputs)?;

    for (idx, (path, doc)) in parsed.iter().enumerate() {
        tracing::debug!(path = %path.display(), "formatting");
        let formatted = doc
            .write(OrgWriter::new())
            .with_context(|| format!("formatting {:?}", path))?;

        if in_place {
            fs::write(path, formatted.as_bytes())
                .with_context(|| format!("writing {:?}", path))?;
        } else {
            print_header(parsed.len(), idx, path);
            print!("{formatted}");
            if !formatted.ends_with('\n') {
                println!();
            }
        }
    }
    Ok(())
}

fn handle_outline(config: &Configuration, args: InputArgs) -> Result<()> {
    let parsed = parse_inputs(config, &args.inputs)?;
    for (idx, (path, doc)) in parsed.iter().enumerate() {
        print_header(parsed.len(), idx, path);
        print!("{}", render_outline(doc));
    }
    Ok(())
}

/// One indented line per section: `2.1 DONE Title :tag:`.
fn render_outline(doc: &Document<'_>) -> String {
    let mut out = String::new();
    for (_, section) in doc.outline.walk() {
        let Some(h) = &section.headline else {
            continue;
        };
        let indent = "  ".repeat(h.level.saturating_sub(1));
        let mut line = format!("{indent}{}", h.number);
        if let Some(status) = &h.status {
            line.push(' ');
            line.push_str(status);
        }
        line.push(' ');
        line.push_str(&plain_text(&h.title));
        if !h.tags.is_empty() {
            line.push_str(&format!(" :{}:", h.tags.join(":")));
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

fn handle_links(config: &Configuration, args: InputArgs) -> Result<()> {
    let parsed = parse_inputs(config, &args.inputs)?;
    for (idx, (path, doc)) in parsed.iter().enumerate() {
        print_header(parsed.len(), idx, path);
        print!("{}", render_links(doc));
    }
    Ok(())
}

fn render_links(doc: &Document<'_>) -> String {
    let mut out = String::new();
    for (name, target) in &doc.links {
        out.push_str(&format!("link  {name} -> {target}\n"));
    }
    for (name, link) in &doc.inner_links {
        out.push_str(&format!("inner {name} -> {} ({})\n", link.link(), link.description()));
    }
    for (id, file) in &doc.id_links {
        let file = if file.is_empty() { "<unresolved>" } else { file };
        out.push_str(&format!("id    {id} -> {file}\n"));
    }
    out
}

fn collect_org_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let mut visited = HashSet::new();
    visit_dir(dir, &mut out, &mut visited)?;
    out.sort();
    out.dedup();
    Ok(out)
}

fn expand_inputs(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let mut visited = BTreeSet::new();
    for path in paths {
        let canonical =
            fs::canonicalize(path).with_context(|| format!("resolving path {:?}", path))?;
        let meta = fs::metadata(&canonical)
            .with_context(|| format!("reading metadata for {:?}", canonical))?;
        if meta.is_dir() {
            tracing::debug!(path = %canonical.display(), "scanning directory");
            for file in collect_org_files(&canonical)? {
                if visited.insert(file.clone()) {
                    out.push(file);
                }
            }
        } else if meta.is_file() {
            if !is_org_file(&canonical) {
                anyhow::bail!("{:?} is not an .org file", canonical);
            }
            if visited.insert(canonical.clone()) {
                out.push(canonical);
            }
        }
    }
    Ok(out)
}

fn is_org_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "org")
}

fn visit_dir(
    path: &Path,
    out: &mut Vec<PathBuf>,
    visited: &mut HashSet<PathBuf>,
) -> Result<()> {
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
    } else if metadata.is_file() && is_org_file(&canonical) {
        tracing::debug!(path = %canonical.display(), "found org file");
        out.push(canonical);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn expand_inputs_scans_directories_and_skips_duplicates() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let root = tmp.path();
        fs::create_dir_all(root.join("nested")).expect("mkdir nested");
        fs::write(root.join("a.org"), "* A").expect("write a");
        fs::write(root.join("nested/b.org"), "* B").expect("write b");
        fs::write(root.join("notes.txt"), "skip").expect("write txt");

        let expanded =
            expand_inputs(&[root.to_path_buf(), root.join("a.org")]).expect("expand");
        let names: Vec<_> = expanded
            .iter()
            .map(|p| p.file_name().expect("name").to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a.org", "b.org"]);
    }

    #[derive(Clone, Default)]
    struct Captured(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().expect("lock").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn directory_scan_logs_at_debug_level() {
        let tmp = tempfile::tempdir().expect("tempdir");
        fs::write(tmp.path().join("a.org"), "* A").expect("write a");

        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("debug"))
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            expand_inputs(&[tmp.path().to_path_buf()]).expect("expand");
        });

        let logged = String::from_utf8(captured.0.lock().expect("lock").clone()).expect("utf8");
        assert!(logged.contains("scanning directory"), "{logged}");
        assert!(logged.contains("found org file"), "{logged}");
        assert!(logged.contains("a.org"), "{logged}");
    }

    #[test]
    fn expand_inputs_rejects_other_files() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let txt = tmp.path().join("notes.txt");
        fs::write(&txt, "x").expect("write");
        assert!(expand_inputs(&[txt]).is_err());
    }

    #[test]
    fn outline_lists_numbered_sections() {
        let config = Configuration::new();
        let doc = config.parse("* TODO One :a:\n** Sub\n* Two", "./");
        assert_eq!(render_outline(&doc), "1 TODO One :a:\n  1.1 Sub\n2 Two\n");
    }

    #[test]
    fn links_report_registries() {
        let config = Configuration::new();
        let doc = config.parse(
            "#+LINK: gh https://github.com/%s\n#+NAME: tbl\n| a |",
            "./",
        );
        assert_eq!(
            render_links(&doc),
            "link  gh -> https://github.com/%s\ninner tbl -> #table--tbl (Table 1)\n"
        );
    }

    #[test]
    fn format_in_place_rewrites_file() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let file = tmp.path().join("doc.org");
        fs::write(&file, "|a|b|\n* Head").expect("write");

        let config = Configuration::new();
        let args = FormatArgs {
            inputs: vec![file.clone()],
            in_place: true,
        };
        handle_format(&config, args).expect("format");
        assert_eq!(
            fs::read_to_string(&file).expect("read"),
            "| a | b |\n* Head\n"
        );
    }
}
