//! fplibrary - Song library administration
//!
//! Usage:
//!   fplibrary count
//!   fplibrary list
//!   fplibrary lookup --id 42
//!   fplibrary lookup --title "so what" --artist "miles davis"
//!   fplibrary delete 42
//!   fplibrary --config <path> clear --yes

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use serde::Serialize;
use songprint_cli::load_config;
use songprint_cli::output::print_json;
use songprint_core::{Library, SongId, SongLookup};

#[derive(Parser, Debug)]
#[command(name = "fplibrary")]
#[command(about = "Inspect and maintain the song library", long_about = None)]
struct Args {
    /// Path to configuration file (TOML). If not provided, uses config.toml
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Number of songs and stored fingerprints
    Count,
    /// All songs ordered by title
    List,
    /// Find one song
    Lookup(LookupArgs),
    /// Delete a song and its fingerprints
    Delete {
        song_id: u32,
    },
    /// Delete every song and fingerprint
    Clear {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}

#[derive(ClapArgs, Debug)]
struct LookupArgs {
    #[arg(long, conflicts_with_all = ["external_id", "title"])]
    id: Option<u32>,

    #[arg(long, conflicts_with = "title")]
    external_id: Option<String>,

    /// Title; matched exactly with --artist, as a substring without it
    #[arg(long)]
    title: Option<String>,

    #[arg(long, requires = "title")]
    artist: Option<String>,
}

impl LookupArgs {
    fn to_lookup(&self) -> Result<SongLookup> {
        if let Some(id) = self.id {
            return Ok(SongLookup::Id(SongId(id)));
        }
        if let Some(external_id) = &self.external_id {
            return Ok(SongLookup::ExternalId(external_id.clone()));
        }
        match (&self.title, &self.artist) {
            (Some(title), Some(artist)) => Ok(SongLookup::by_title_and_artist(title, artist)),
            (Some(title), None) => Ok(SongLookup::TitleContains(title.clone())),
            _ => anyhow::bail!("lookup needs --id, --external-id or --title"),
        }
    }
}

#[derive(Serialize)]
struct CountOutput {
    songs: u64,
    fingerprints: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    songprint_cli::init_logger(args.verbose);

    let config = load_config(args.config.as_deref())?;
    let library = Library::open(&config)
        .await
        .context("Failed to open song library")?;

    match &args.command {
        Command::Count => {
            print_json(&CountOutput {
                songs: library.count().await?,
                fingerprints: library.fingerprint_count().await?,
            });
        }
        Command::List => {
            print_json(&library.list_songs().await?);
        }
        Command::Lookup(lookup) => {
            let by = lookup.to_lookup()?;
            match library.lookup(&by).await? {
                Some(song) => print_json(&song),
                None => anyhow::bail!("No song matches {:?}", by),
            }
        }
        Command::Delete { song_id } => {
            if !library.delete_song(SongId(*song_id)).await? {
                anyhow::bail!("Song {} not found", song_id);
            }
            log::info!("Deleted song {}", song_id);
        }
        Command::Clear { yes } => {
            if !yes {
                anyhow::bail!("Refusing to clear the library without --yes");
            }
            library.clear().await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parsing() {
        let args = Args::parse_from(["fplibrary", "count"]);
        assert!(matches!(args.command, Command::Count));

        let args = Args::parse_from(["fplibrary", "delete", "42", "--config", "pg.toml"]);
        assert!(matches!(args.command, Command::Delete { song_id: 42 }));
        assert_eq!(args.config.as_deref(), Some("pg.toml"));

        let args = Args::parse_from(["fplibrary", "clear"]);
        assert!(matches!(args.command, Command::Clear { yes: false }));
    }

    fn lookup_of(argv: &[&str]) -> Result<SongLookup> {
        match Args::try_parse_from(argv)?.command {
            Command::Lookup(lookup) => lookup.to_lookup(),
            other => anyhow::bail!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_lookup_modes() {
        assert_eq!(
            lookup_of(&["fplibrary", "lookup", "--id", "7"]).unwrap(),
            SongLookup::Id(SongId(7))
        );
        assert_eq!(
            lookup_of(&["fplibrary", "lookup", "--external-id", "KOB-01"]).unwrap(),
            SongLookup::ExternalId("KOB-01".to_string())
        );
        assert_eq!(
            lookup_of(&["fplibrary", "lookup", "--title", "So What", "--artist", "Miles Davis"]).unwrap(),
            SongLookup::NaturalKey("so what---miles davis".to_string())
        );
        assert_eq!(
            lookup_of(&["fplibrary", "lookup", "--title", "blue"]).unwrap(),
            SongLookup::TitleContains("blue".to_string())
        );
        assert!(lookup_of(&["fplibrary", "lookup"]).is_err());
        assert!(lookup_of(&["fplibrary", "lookup", "--id", "1", "--title", "x"]).is_err());
        assert!(lookup_of(&["fplibrary", "lookup", "--artist", "Miles Davis"]).is_err());
    }
}
