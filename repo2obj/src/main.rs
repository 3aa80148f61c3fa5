//! repo2obj: convert a repository ticket to an ELF object file.

use std::io::Write;
use std::path::{Path, PathBuf};

use clap::Parser;
use tempfile::NamedTempFile;

use repo2obj::{materialize, LinkError};
use prepo_store::ticket::read_ticket_file;
use prepo_store::Repository;

#[derive(Parser, Debug)]
#[command(name = "repo2obj", about = "Convert a repository ticket to an ELF object file")]
struct Args {
    /// Ticket path.
    ticket: PathBuf,

    /// Program repository path.
    #[arg(long)]
    repo: Option<PathBuf>,

    /// Output filename.
    #[arg(short = 'o', value_name = "filename", default_value = "./a.out")]
    output: PathBuf,
}

/// `--repo` wins; otherwise the REPOFILE environment variable, matching the
/// compiler's behavior, then the default database name.
fn repo_path(args: &Args) -> PathBuf {
    if let Some(path) = &args.repo {
        return path.clone();
    }
    if let Some(path) = std::env::var_os("REPOFILE") {
        return PathBuf::from(path);
    }
    PathBuf::from("./clang.db")
}

/// Commit the finished image: written next to the target and renamed into
/// place, so a failed run never leaves a partial output behind.
fn commit_output(path: &Path, image: &[u8]) -> Result<(), LinkError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)
        .map_err(|err| LinkError::Output(path.to_path_buf(), err))?;
    tmp.write_all(image)
        .map_err(|err| LinkError::Output(path.to_path_buf(), err))?;
    tmp.persist(path)
        .map_err(|err| LinkError::Output(path.to_path_buf(), err.error))?;
    Ok(())
}

fn run(args: &Args) -> Result<(), LinkError> {
    let uuid = read_ticket_file(&args.ticket)?;
    let repo = Repository::open(&repo_path(args))?;
    let ticket = repo.ticket(&uuid)?;
    let image = materialize(&repo, &ticket)?;
    commit_output(&args.output, &image)
}

fn main() {
    let args = Args::parse();
    if let Err(err) = run(&args) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
