//! Maintenance subcommands that run without opening a window.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, SecondsFormat, Utc};
use spr_experiment::ExperimentConfig;
use spr_experiment::stimuli::{load_items, write_lists};
use spr_export::DirectoryTransport;
use tracing::info;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Run a session in a fullscreen window.
    Run,
    /// Build the counterbalanced lists from a master stimulus file.
    MakeLists { master: PathBuf, out_dir: PathBuf },
    /// List saved session documents, newest first.
    ListData { dir: Option<PathBuf> },
}

/// Parses the arguments after the program name.
pub fn parse<I>(args: I) -> Result<Command>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let Some(command) = args.next() else {
        return Ok(Command::Run);
    };
    let parsed = match command.as_str() {
        "make-lists" => {
            let master = args
                .next()
                .ok_or_else(|| anyhow!("make-lists requires <master.json> <out_dir>"))?;
            let out_dir = args
                .next()
                .ok_or_else(|| anyhow!("make-lists requires an output directory"))?;
            Command::MakeLists {
                master: master.into(),
                out_dir: out_dir.into(),
            }
        }
        "list-data" => Command::ListData {
            dir: args.next().map(PathBuf::from),
        },
        other => bail!("Unknown command '{other}'. Use make-lists or list-data"),
    };
    if let Some(extra) = args.next() {
        bail!("Unexpected argument '{extra}' after '{command}'");
    }
    Ok(parsed)
}

pub fn make_lists(master: &Path, out_dir: &Path) -> Result<()> {
    let config = ExperimentConfig::load().context("loading experiment config")?;
    let items = load_items(master)?;
    info!(path = %master.display(), count = items.len(), "loaded master stimulus file");
    for path in write_lists(&items, out_dir, config.list_count)? {
        println!("{}", path.display());
    }
    Ok(())
}

pub fn list_data(dir: Option<PathBuf>) -> Result<()> {
    let dir = match dir {
        Some(dir) => dir,
        None => {
            ExperimentConfig::load()
                .context("loading experiment config")?
                .export
                .data_dir
        }
    };
    let files = DirectoryTransport::new(&dir).saved_files()?;
    info!(dir = %dir.display(), count = files.len(), "saved sessions");
    for file in files {
        let modified: DateTime<Utc> = file.modified.into();
        println!(
            "{}\t{}\t{}",
            modified.to_rfc3339_opts(SecondsFormat::Secs, true),
            file.size,
            file.filename
        );
    }
    Ok(())
}
