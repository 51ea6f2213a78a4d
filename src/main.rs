use clap::Parser;
use snipkit::cli::{Commands, Snipkit};
use snipkit::config::{self, AppConfig};
use snipkit::inserter::{copy_to_clipboard, TextInserter};
use snipkit::models::{Library, Snippet};
use snipkit::ui::{pick_snippet, summary_line, TerminalPalette};
use snipkit::{App, LibraryManager, Result, SnipError};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::FmtSubscriber;

const LOG_ENV: &str = "SNIPKIT_LOG";
const RUN_LOG_FILENAME: &str = "snipkit.log";

fn main() {
    let cli = Snipkit::parse();

    // The palette owns the terminal while running, so logs go to a file.
    let log_file = match (&cli.log_file, &cli.command) {
        (Some(path), _) => Some(path.clone()),
        (None, Commands::Run) => Some(config::config_dir().join(RUN_LOG_FILENAME)),
        (None, _) => None,
    };
    if let Err(e) = init_logging(log_file.as_deref()) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }

    let config_path = cli.config.clone().unwrap_or_else(config::default_config_path);
    if let Err(e) = execute(cli.command, &config_path) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let level = match std::env::var(LOG_ENV)
        .unwrap_or_else(|_| "info".to_string())
        .to_lowercase()
        .as_str()
    {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let (writer, ansi) = match log_file {
        Some(path) => {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            (BoxMakeWriter::new(Mutex::new(file)), false)
        }
        None => (BoxMakeWriter::new(std::io::stderr), true),
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(writer)
        .with_ansi(ansi)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| SnipError::Other(format!("cannot install logger: {}", e)))
}

fn execute(command: Commands, config_path: &Path) -> Result<()> {
    let config = AppConfig::load(config_path);

    match command {
        Commands::Run => run(config, config_path.to_path_buf()),
        Commands::List { library } => {
            let manager = load_libraries(&config);
            let snapshot = manager.snapshot();
            let libraries: Vec<&Library> = match &library {
                Some(name) => vec![snapshot
                    .library(name)
                    .ok_or_else(|| SnipError::LibraryNotFound(name.clone()))?],
                None => snapshot.libraries.iter().collect(),
            };
            for library in libraries {
                println!("{} ({} snippets)", library.name, library.snippets.len());
                for snippet in &library.snippets {
                    println!("  {}", summary_line(snippet));
                }
            }
            Ok(())
        }
        Commands::Search { query } => {
            let manager = load_libraries(&config);
            let results = manager.search(&query);
            if results.is_empty() {
                println!("No snippets match '{}'", query);
            }
            for snippet in &results {
                println!("{}", summary_line(snippet));
            }
            Ok(())
        }
        Commands::Show { library, id } => {
            let snippet = find(&load_libraries(&config), &library, &id)?;
            println!("{}", snippet.content);
            Ok(())
        }
        Commands::Insert {
            library,
            id,
            delay_ms,
        } => {
            let snippet = find(&load_libraries(&config), &library, &id)?;
            thread::sleep(Duration::from_millis(delay_ms));
            let mut inserter = TextInserter::new(&config.clipboard)?;
            inserter.insert(&snippet.content)?.wait();
            Ok(())
        }
        Commands::Pick { query } => {
            let manager = load_libraries(&config);
            let snippets = manager.get_all_snippets();
            if snippets.is_empty() {
                println!("No snippets found. Create a library with: snipkit new-library <name> --id <id> -n <name> -c <content>");
                return Ok(());
            }
            if let Some(snippet) = pick_snippet(
                &snippets,
                query.as_deref().unwrap_or_default(),
                config.palette.show_preview,
            )? {
                copy_to_clipboard(&snippet.content)?;
                println!("Copied '{}' to the clipboard", snippet.name);
            }
            Ok(())
        }
        Commands::Check => check(&config),
        Commands::Add {
            library,
            id,
            name,
            content,
            description,
            category,
            tags,
        } => {
            let manager = load_libraries(&config);
            let mut snippet = Snippet::new(id, name, unescape(&content));
            snippet.description = description.unwrap_or_default();
            snippet.category = category.unwrap_or_default();
            snippet.tags = tags;
            let id = snippet.id.clone();
            manager.save_snippet(snippet, &library)?;
            println!("Saved '{}' in {}", id, library);
            Ok(())
        }
        Commands::Delete { library, id } => {
            load_libraries(&config).delete_snippet(&id, &library)?;
            println!("Deleted '{}' from {}", id, library);
            Ok(())
        }
        Commands::NewLibrary {
            name,
            description,
            id,
            snippet_name,
            content,
        } => {
            let manager = load_libraries(&config);
            let first = Snippet::new(id, snippet_name, unescape(&content));
            let path = manager.create_library(&name, description.as_deref().unwrap_or_default(), first)?;
            println!("Created {}", path.display());
            Ok(())
        }
        Commands::Config { path, init } => {
            if path {
                println!("{}", config_path.display());
                return Ok(());
            }
            if init {
                config.save(config_path)?;
                println!("Wrote {}", config_path.display());
                return Ok(());
            }
            println!("# {}", config_path.display());
            println!("{}", serde_json::to_string_pretty(&config)?);
            for root in config.library_roots() {
                println!("# library root: {}", root.display());
            }
            Ok(())
        }
    }
}

fn run(config: AppConfig, config_path: PathBuf) -> Result<()> {
    let palette = TerminalPalette::new(config.palette.show_preview);
    let app = App::from_config(config, Some(config_path), Box::new(palette))?;

    println!("snipkit running. Press the summon hotkey to pick a snippet, Ctrl+C to quit.");
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(app.run())
}

fn load_libraries(config: &AppConfig) -> LibraryManager {
    let manager = LibraryManager::new(config.library_roots());
    for failure in manager.load_all() {
        eprintln!("warning: {}", failure);
    }
    manager
}

fn find(manager: &LibraryManager, library: &str, id: &str) -> Result<Snippet> {
    if manager.snapshot().library(library).is_none() {
        return Err(SnipError::LibraryNotFound(library.to_string()));
    }
    manager
        .find_snippet(library, id)
        .ok_or_else(|| SnipError::SnippetNotFound {
            library: library.to_string(),
            id: id.to_string(),
        })
}

fn check(config: &AppConfig) -> Result<()> {
    let report = snipkit::loader::load_all(&config.library_roots());
    for library in &report.libraries {
        let source = library
            .source_path
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        println!("ok    {} ({} snippets) {}", library.name, library.snippets.len(), source);
    }
    for failure in &report.failures {
        println!("FAIL  {}", failure);
    }
    println!(
        "{} libraries, {} snippets, {} failures",
        report.libraries.len(),
        report.snippet_count(),
        report.failures.len()
    );
    if report.failures.is_empty() {
        Ok(())
    } else {
        Err(SnipError::LibrariesFailed(report.failures.len()))
    }
}

/// Shell arguments cannot carry real newlines comfortably; accept `\n` and
/// `\t` escapes in content given on the command line.
fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
