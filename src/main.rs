//! # Book RAG CLI (`bookrag`)
//!
//! Ingest books, then ask grounded questions about them and generate
//! summaries.
//!
//! ## Usage
//!
//! ```bash
//! bookrag --config ./config/bookrag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `bookrag init` | Create the SQLite database and schema |
//! | `bookrag ingest <path>` | Extract, chunk, embed and index a document |
//! | `bookrag list [--search TERM] [--sort recent\|name\|size\|date]` | List books |
//! | `bookrag show <id>` | Book details and latest summary |
//! | `bookrag ask <id> "<question>"` | Answer a question from the book's text |
//! | `bookrag summarize <id>` | Generate and store a new summary |
//! | `bookrag history <id>` | Past questions and answers |
//! | `bookrag search <id> "<query>"` | Raw retrieval with scores |
//! | `bookrag delete <id>` | Remove a book and everything derived from it |
//! | `bookrag stats` | Library totals |
//!
//! Add `--json` to any command for machine-readable output.
//!
//! Log verbosity follows `RUST_LOG` (default `warn`); logs go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use book_rag::catalog::{BookQuery, BookSort};
use book_rag::config;
use book_rag::error::RagError;
use book_rag::library::Library;
use book_rag::stats::{format_ts_iso, format_ts_relative, print_stats, truncate};

/// Book RAG: question answering and summaries over your own books.
#[derive(Parser)]
#[command(name = "bookrag", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/bookrag.toml")]
    config: PathBuf,

    /// Print results as JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Ingest a PDF, text or Markdown file.
    Ingest {
        path: PathBuf,

        /// Title to record instead of one derived from the file name.
        #[arg(long)]
        title: Option<String>,

        /// Skip the automatic summary after indexing.
        #[arg(long)]
        no_summary: bool,
    },

    /// List books, most recently accessed first unless --sort says otherwise.
    List {
        /// Only books whose title or file name contains this text.
        #[arg(long)]
        search: Option<String>,

        /// recent, name, size or date.
        #[arg(long, default_value = "recent")]
        sort: BookSort,
    },

    /// Show a book and its latest summary.
    Show { id: i64 },

    /// Ask a question about a book.
    Ask { id: i64, question: String },

    /// Generate and store a new summary for a book.
    Summarize { id: i64 },

    /// Show the conversation history for a book, oldest first.
    History {
        id: i64,

        #[arg(long, default_value = "50")]
        limit: usize,
    },

    /// Retrieve the chunks closest to a query, with scores.
    Search {
        id: i64,
        query: String,

        #[arg(long, default_value = "5")]
        k: usize,
    },

    /// Delete a book, its history, its index and its stored file.
    Delete { id: i64 },

    /// Show library totals.
    Stats,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<RagError>() {
                Some(rag) => eprintln!("Error: {}", rag.user_message()),
                None => eprintln!("Error: {:#}", e),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let cfg = config::load_config(&cli.config)?;
    let library = Library::open(&cfg).await?;

    match cli.command {
        Commands::Init => {
            println!("Database initialized at {}.", cfg.db.path.display());
        }
        Commands::Ingest {
            path,
            title,
            no_summary,
        } => {
            let auto_summary = cfg.library.auto_summary && !no_summary;
            let outcome = library
                .ingest_file(&path, title.as_deref(), auto_summary)
                .await?;
            if cli.json {
                return print_json(&json!({
                    "book": outcome.book,
                    "records": outcome.report.records,
                    "summary": outcome.summary,
                }));
            }
            println!(
                "Ingested \"{}\" as book {}: {} pages, {} chunks.",
                outcome.book.title, outcome.book.id, outcome.report.pages, outcome.report.records
            );
            match outcome.summary {
                Some(summary) => {
                    println!();
                    println!("Summary:");
                    println!("{}", summary);
                }
                None if auto_summary => {
                    println!(
                        "Automatic summary unavailable; run `bookrag summarize {}` later.",
                        outcome.book.id
                    );
                }
                None => {}
            }
        }
        Commands::List { search, sort } => {
            let query = BookQuery { search, sort };
            if cli.json {
                return print_json(&library.list(&query).await?);
            }
            print_books(&library, &query).await?
        }
        Commands::Show { id } => {
            let (book, summary) = library.show(id).await?;
            if cli.json {
                return print_json(&json!({ "book": book, "summary": summary }));
            }
            println!("Book {}: {}", book.id, book.title);
            println!("  File:        {}", book.filename);
            println!("  Stored at:   {}", book.file_path);
            println!("  Pages:       {}", book.pages);
            println!("  Characters:  {}", book.total_chars);
            println!("  Added:       {}", format_ts_iso(book.created_at));
            println!("  Collection:  {}", book.collection_name);
            println!();
            match summary {
                Some(s) => {
                    println!("Summary ({}):", format_ts_iso(s.generated_at));
                    println!("{}", s.text);
                }
                None => println!("No summary yet. Run `bookrag summarize {}`.", book.id),
            }
        }
        Commands::Ask { id, question } => {
            let answer = library.ask(id, &question).await?;
            if cli.json {
                return print_json(&answer);
            }
            println!("{}", answer.text);
            if !answer.sources.is_empty() {
                println!();
                println!("Sources: {}", format_pages(&answer.sources));
            }
        }
        Commands::Summarize { id } => {
            let summary = library.summarize(id).await?;
            if cli.json {
                return print_json(&summary);
            }
            println!("{}", summary.text);
        }
        Commands::History { id, limit } => {
            let turns = library.history(id, limit).await?;
            if cli.json {
                return print_json(&turns);
            }
            if turns.is_empty() {
                println!("No questions asked yet.");
            }
            for turn in turns {
                println!("[{}] Q: {}", format_ts_iso(turn.asked_at), turn.question);
                println!("A: {}", turn.answer);
                if !turn.sources.is_empty() {
                    println!("Sources: {}", format_pages(&turn.sources));
                }
                println!();
            }
        }
        Commands::Search { id, query, k } => {
            let hits = library.search(id, &query, k).await?;
            if cli.json {
                return print_json(&hits);
            }
            if hits.is_empty() {
                println!("No results.");
            }
            for (i, hit) in hits.iter().enumerate() {
                println!(
                    "{}. [score: {:.3}] page {}: {}",
                    i + 1,
                    hit.score,
                    hit.page,
                    truncate(&hit.text.replace('\n', " "), 160)
                );
            }
        }
        Commands::Delete { id } => {
            let book = library.delete_book(id).await?;
            if cli.json {
                return print_json(&book);
            }
            println!("Deleted book {} (\"{}\").", book.id, book.title);
        }
        Commands::Stats => {
            let stats = library.stats(5).await?;
            if cli.json {
                return print_json(&stats);
            }
            print_stats(&stats, &cfg.db.path);
        }
    }

    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn print_books(library: &Library, query: &BookQuery) -> anyhow::Result<()> {
    let books = library.list(query).await?;
    if books.is_empty() {
        if library.count_books().await? == 0 {
            println!("No books yet. Add one with `bookrag ingest <path>`.");
        } else {
            println!(
                "No books match \"{}\".",
                query.search.as_deref().unwrap_or_default().trim()
            );
        }
        return Ok(());
    }
    println!(
        "{:>5}  {:<40} {:>6} {:>10}   {}",
        "ID", "TITLE", "PAGES", "CHARS", "LAST ACCESS"
    );
    for b in books {
        println!(
            "{:>5}  {:<40} {:>6} {:>10}   {}",
            b.id,
            truncate(&b.title, 40),
            b.pages,
            b.total_chars,
            format_ts_relative(b.last_accessed)
        );
    }
    Ok(())
}

/// Distinct pages in first-seen order, e.g. "p. 4, 2, 9".
fn format_pages(pages: &[u32]) -> String {
    let mut seen = Vec::new();
    for p in pages {
        if !seen.contains(p) {
            seen.push(*p);
        }
    }
    let list: Vec<String> = seen.iter().map(|p| p.to_string()).collect();
    format!("p. {}", list.join(", "))
}
