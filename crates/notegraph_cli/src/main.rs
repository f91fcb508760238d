//! Command-line front end for the notegraph index.
//!
//! # Responsibility
//! - Open one SQLite index file and run a single index operation per call.
//! - Print results as plain, line-oriented text.

use clap::{Parser, Subcommand};
use log::info;
use notegraph_core::repo::NoteStore;
use notegraph_core::{
    init_logging, ConfigError, IndexConfig, IndexCoordinator, IndexStatus, LinkRef,
    LoggingError, NewNote, Note, NoteId, NoteServiceError, QueryError, RepoError,
    SqliteIndexStore, TagServiceError,
};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "notegraph", version, about = "Wiki-link and tag index for notes")]
struct Cli {
    /// SQLite index file; created when missing.
    #[arg(long, global = true, default_value = "notegraph.db")]
    db: PathBuf,

    /// JSON config with validation limits and log settings.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Absolute directory for rolling log files.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create a note and index its content.
    Add {
        title: String,
        content: String,
        #[arg(long)]
        folder: Option<String>,
    },
    /// Soft-delete the note with this title.
    Delete { title: String },
    /// Rebuild memberships and edges for every live note.
    Reindex,
    /// Remove stored edges that point at deleted notes.
    Prune,
    /// Notes linking to the note with this title.
    Backlinks { title: String },
    /// Notes the note with this title links to.
    Outgoing { title: String },
    /// Every link in the note's content, resolved or not.
    Links { title: String },
    /// All tags with their note counts.
    Tags,
    /// Notes carrying any (or, with --all, every) of the named tags.
    Filter {
        #[arg(long)]
        all: bool,
        #[arg(required = true)]
        tags: Vec<String>,
    },
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Self::Add { .. } => "add",
            Self::Delete { .. } => "delete",
            Self::Reindex => "reindex",
            Self::Prune => "prune",
            Self::Backlinks { .. } => "backlinks",
            Self::Outgoing { .. } => "outgoing",
            Self::Links { .. } => "links",
            Self::Tags => "tags",
            Self::Filter { .. } => "filter",
        }
    }
}

#[derive(Debug)]
enum CliError {
    Config(ConfigError),
    Logging(LoggingError),
    Repo(RepoError),
    Note(NoteServiceError),
    Query(QueryError),
    Tag(TagServiceError),
    UnknownTitle(String),
}

impl Display for CliError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(err) => write!(f, "{err}"),
            Self::Logging(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::Note(err) => write!(f, "{err}"),
            Self::Query(err) => write!(f, "{err}"),
            Self::Tag(err) => write!(f, "{err}"),
            Self::UnknownTitle(title) => write!(f, "no live note titled `{title}`"),
        }
    }
}

impl Error for CliError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Logging(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::Note(err) => Some(err),
            Self::Query(err) => Some(err),
            Self::Tag(err) => Some(err),
            Self::UnknownTitle(_) => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<LoggingError> for CliError {
    fn from(value: LoggingError) -> Self {
        Self::Logging(value)
    }
}

impl From<RepoError> for CliError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<NoteServiceError> for CliError {
    fn from(value: NoteServiceError) -> Self {
        Self::Note(value)
    }
}

impl From<QueryError> for CliError {
    fn from(value: QueryError) -> Self {
        Self::Query(value)
    }
}

impl From<TagServiceError> for CliError {
    fn from(value: TagServiceError) -> Self {
        Self::Tag(value)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let mut config = match cli.config.as_deref() {
        Some(path) => IndexConfig::load(path)?,
        None => IndexConfig::default(),
    };
    if cli.log_dir.is_some() {
        config.logging.dir = cli.log_dir;
    }
    init_logging(&config.logging)?;

    let store = SqliteIndexStore::open(&cli.db)?;
    info!(
        "event=cli_command module=cli status=start command={}",
        cli.command.name()
    );
    let mut index = IndexCoordinator::with_config(store, config);

    match cli.command {
        Command::Add {
            title,
            content,
            folder,
        } => {
            let draft = match folder {
                Some(folder) => NewNote::new(title, content).in_folder(folder),
                None => NewNote::new(title, content),
            };
            let saved = index.create_note(draft)?;
            println!("{}", saved.value.id);
            print_index_status(&saved.index);
        }
        Command::Delete { title } => {
            let id = note_id_for_title(&index, &title)?;
            let deleted = index.delete_note(id)?;
            print_index_status(&deleted.index);
        }
        Command::Reindex => {
            let processed = index.reindex_all()?;
            println!("reindexed {processed} notes");
        }
        Command::Prune => {
            let pruned = index.prune_dangling_edges()?;
            println!("pruned {pruned} edges");
        }
        Command::Backlinks { title } => {
            let id = note_id_for_title(&index, &title)?;
            print_notes(&index.queries().get_backlinks(id)?);
        }
        Command::Outgoing { title } => {
            let id = note_id_for_title(&index, &title)?;
            print_notes(&index.queries().get_outgoing_links(id)?);
        }
        Command::Links { title } => {
            let id = note_id_for_title(&index, &title)?;
            for link in index.queries().link_refs(id)? {
                match link {
                    LinkRef::Resolved {
                        title,
                        target_id,
                        ambiguous,
                        ..
                    } => {
                        let marker = if ambiguous { " (ambiguous)" } else { "" };
                        println!("[[{title}]] -> {target_id}{marker}");
                    }
                    LinkRef::Unresolved { title, .. } => println!("[[{title}]] -> unresolved"),
                }
            }
        }
        Command::Tags => {
            for usage in index.tags().get_all()? {
                println!(
                    "#{}\t{}\t{}",
                    usage.tag.name, usage.note_count, usage.tag.color
                );
            }
        }
        Command::Filter { all, tags } => {
            let mut tag_ids = Vec::with_capacity(tags.len());
            for name in &tags {
                match index.tags().find_by_name(name)? {
                    Some(tag) => tag_ids.push(tag.id),
                    // An unknown tag has no notes: AND is empty, OR ignores it.
                    None if all => return Ok(()),
                    None => {}
                }
            }
            if tag_ids.is_empty() {
                return Ok(());
            }
            print_notes(&index.queries().filter_notes_by_tags(&tag_ids, all)?);
        }
    }
    Ok(())
}

fn note_id_for_title(
    index: &IndexCoordinator<SqliteIndexStore>,
    title: &str,
) -> Result<NoteId, CliError> {
    index
        .store()
        .find_notes_by_title(title)?
        .first()
        .copied()
        .ok_or_else(|| CliError::UnknownTitle(title.to_string()))
}

fn print_notes(notes: &[Note]) {
    for note in notes {
        println!("{}\t{}\t{}", note.id, note.folder, note.title);
    }
}

fn print_index_status(status: &IndexStatus) {
    match status {
        IndexStatus::Reconciled(report) => println!(
            "indexed: +{} -{} tags, +{} -{} links, {} unresolved",
            report.tags.added.len(),
            report.tags.removed.len(),
            report.links.added.len(),
            report.links.removed.len(),
            report.links.unresolved().count()
        ),
        IndexStatus::Cleared { memberships, edges } => {
            println!("cleared: {memberships} tags, {edges} links")
        }
        IndexStatus::Skipped => println!("index unchanged"),
        IndexStatus::Failed(failure) => eprintln!("warning: {failure}"),
    }
}
