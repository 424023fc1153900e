//! Command-line front end for gitbatch.
//!
//! Every subcommand that changes a branch lands exactly one commit and
//! prints the outcome as JSON on stdout.

use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use gitbatch::{
    tools, BatchOutcome, Edit, Engine, EngineOptions, Error, GitStore, ObjectStore, OpenOptions,
    Result, MODE_BLOB, MODE_BLOB_EXEC,
};

/// Apply atomic multi-file commits to a bare git repository
#[derive(Parser, Debug)]
#[command(name = "gitbatch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the bare repository
    #[arg(long, short = 'r', env = "GITBATCH_REPO", global = true)]
    repo: Option<PathBuf>,

    /// Branch to read from and commit to
    #[arg(long, short = 'b', env = "GITBATCH_BRANCH", default_value = "main", global = true)]
    branch: String,

    /// Commit author name
    #[arg(long, env = "GITBATCH_AUTHOR", global = true)]
    author: Option<String>,

    /// Commit author email
    #[arg(long, env = "GITBATCH_EMAIL", global = true)]
    email: Option<String>,

    /// Give up on a batch after this many seconds
    #[arg(long, env = "GITBATCH_TIMEOUT_SECS", global = true)]
    timeout_secs: Option<u64>,

    /// Commit message (a default is generated when omitted)
    #[arg(long, short = 'm', global = true)]
    message: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a bare repository with an initial empty commit on the branch
    Init,
    /// List every file on the branch
    Ls,
    /// Print the contents of a file
    Cat { path: String },
    /// Apply a JSON batch from a file ("-" for stdin)
    Apply { file: String },
    /// Create or overwrite a file
    Write {
        path: String,
        /// Literal content; read from stdin when omitted
        content: Option<String>,
        /// Mark the file executable
        #[arg(long)]
        executable: bool,
    },
    /// Replace the single occurrence of OLD with NEW in a file
    Edit { path: String, old: String, new: String },
    /// Delete files
    Rm {
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// Delete a folder and everything in it
    Rmdir { path: String },
    /// Create a folder with a placeholder file
    Mkdir { path: String },
    /// Move a file or folder
    Mv { from: String, to: String },
    /// Rename a file within its folder
    Rename { path: String, new_name: String },
}

/// One edit in a JSON batch file.
#[derive(Deserialize, Debug)]
#[serde(tag = "op", rename_all = "snake_case")]
enum EditRecord {
    Write {
        path: String,
        content: String,
        #[serde(default)]
        executable: bool,
    },
    Replace {
        path: String,
        find: String,
        replace: String,
    },
    Delete {
        path: String,
    },
    Move {
        from: String,
        to: String,
    },
}

impl From<EditRecord> for Edit {
    fn from(record: EditRecord) -> Self {
        match record {
            EditRecord::Write {
                path,
                content,
                executable,
            } => {
                let mode = if executable { MODE_BLOB_EXEC } else { MODE_BLOB };
                Edit::write_with_mode(path, content, mode)
            }
            EditRecord::Replace {
                path,
                find,
                replace,
            } => Edit::replace(path, find, replace),
            EditRecord::Delete { path } => Edit::delete(path),
            EditRecord::Move { from, to } => Edit::move_to(from, to),
        }
    }
}

#[derive(Deserialize, Debug)]
struct BatchFile {
    #[serde(default)]
    message: Option<String>,
    edits: Vec<EditRecord>,
}

#[derive(Serialize, Debug)]
struct OutcomeJson {
    branch: String,
    commit: String,
    previous: String,
    tree: String,
    message: String,
    committed: bool,
    added: Vec<String>,
    updated: Vec<String>,
    deleted: Vec<String>,
}

impl From<BatchOutcome> for OutcomeJson {
    fn from(o: BatchOutcome) -> Self {
        Self {
            branch: o.branch,
            commit: o.commit.to_string(),
            previous: o.previous.to_string(),
            tree: o.tree.to_string(),
            message: o.message,
            committed: o.committed,
            added: o.changes.add,
            updated: o.changes.update,
            deleted: o.changes.delete,
        }
    }
}

#[derive(Serialize, Debug)]
struct ErrorJson {
    error: String,
    validation: bool,
    conflict: bool,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let report = ErrorJson {
                error: err.to_string(),
                validation: err.is_validation(),
                conflict: err.is_conflict(),
            };
            match serde_json::to_string(&report) {
                Ok(json) => eprintln!("{}", json),
                Err(_) => eprintln!("error: {}", err),
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let repo = cli
        .repo
        .clone()
        .ok_or_else(|| Error::invalid_path("no repository given (use --repo or GITBATCH_REPO)"))?;

    let open = OpenOptions {
        create: matches!(cli.command, Command::Init),
        branch: Some(cli.branch.clone()),
        author: cli.author.clone(),
        email: cli.email.clone(),
    };
    if matches!(cli.command, Command::Init) && repo.exists() {
        return Err(Error::destination_exists(repo.display().to_string()));
    }
    let store = GitStore::open(&repo, open)?;
    let engine = Engine::with_options(
        store,
        EngineOptions {
            timeout: cli.timeout_secs.map(Duration::from_secs),
        },
    );

    let branch = cli.branch.as_str();
    let message = cli.message.as_deref();

    let outcome = match cli.command {
        Command::Init => {
            let tip = engine.store().branch_tip(branch)?;
            println!("{}", to_json(&serde_json::json!({
                "branch": branch,
                "commit": tip.commit.to_string(),
                "path": repo.display().to_string(),
            }))?);
            return Ok(());
        }
        Command::Ls => {
            let snapshot = engine.snapshot(branch)?;
            for path in snapshot.paths() {
                println!("{}", path);
            }
            return Ok(());
        }
        Command::Cat { path } => {
            let data = engine.read_file(branch, &path)?;
            print!("{}", String::from_utf8_lossy(&data));
            return Ok(());
        }
        Command::Apply { file } => {
            let text = read_input(&file)?;
            let batch: BatchFile = serde_json::from_str(&text)
                .map_err(|e| Error::invalid_edit(format!("bad batch file {}: {}", file, e)))?;
            let edits: Vec<Edit> = batch.edits.into_iter().map(Edit::from).collect();
            let message = message.or(batch.message.as_deref());
            tools::batch(&engine, branch, &edits, message)?
        }
        Command::Write {
            path,
            content,
            executable,
        } => {
            let content = match content {
                Some(c) => c,
                None => read_input("-")?,
            };
            if executable {
                let edits = [Edit::write_with_mode(path.as_str(), content, MODE_BLOB_EXEC)];
                let fallback = format!("Update {}", path);
                engine.apply_batch(
                    branch,
                    &edits,
                    &gitbatch::paths::format_commit_message(&fallback, message),
                )?
            } else {
                tools::write_file(&engine, branch, &path, content, message)?
            }
        }
        Command::Edit { path, old, new } => {
            tools::edit_file(&engine, branch, &path, &old, &new, message)?
        }
        Command::Rm { paths } => {
            if paths.len() == 1 {
                tools::delete_file(&engine, branch, &paths[0], message)?
            } else {
                tools::delete_files(&engine, branch, &paths, message)?
            }
        }
        Command::Rmdir { path } => tools::delete_folder(&engine, branch, &path, message)?,
        Command::Mkdir { path } => tools::create_folder(&engine, branch, &path, message)?,
        Command::Mv { from, to } => tools::move_file(&engine, branch, &from, &to, message)?,
        Command::Rename { path, new_name } => {
            tools::rename_file(&engine, branch, &path, &new_name, message)?
        }
    };

    println!("{}", to_json(&OutcomeJson::from(outcome))?);
    Ok(())
}

fn read_input(file: &str) -> Result<String> {
    if file == "-" {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        Ok(text)
    } else {
        std::fs::read_to_string(file).map_err(|e| Error::io(file, e))
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| Error::Io(e.into()))
}
