use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser, Clone)]
#[command(name = "spacer", version, about = "Spaced-repetition study from the command line")]
pub struct Cli {
    /// Collection file (defaults to the app data dir)
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,

    /// Backup directory (defaults to `backups/` next to the collection)
    #[arg(long, global = true)]
    pub backups: Option<PathBuf>,

    /// Number of backups to keep
    #[arg(long, global = true, default_value_t = 10)]
    pub max_backups: usize,

    /// Act as the sync server: use the stored client offset and server usn
    #[arg(long, global = true)]
    pub server: bool,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Per-deck new/learning/review counts and review history totals
    Stats,
    /// Show the next card without answering it
    Next,
    /// Answer a card by id
    Answer(AnswerCmd),
    /// Interactive study loop
    Study(StudyCmd),
    /// Suspend cards
    Suspend(CardIds),
    /// Return suspended cards to their queues
    Unsuspend(CardIds),
    /// Bury cards until tomorrow
    Bury(CardIds),
    /// Return buried cards to their queues
    Unbury(CardIds),
    /// Write the review log as CSV
    ExportRevlog(ExportCmd),
}

#[derive(Debug, Args, Clone)]
pub struct AnswerCmd {
    pub card_id: i64,
    /// 1 = again, 2 = hard, 3 = good, 4 = easy
    #[arg(value_parser = clap::value_parser!(u8).range(1..=4))]
    pub ease: u8,
}

#[derive(Debug, Args, Clone)]
pub struct StudyCmd {
    #[arg(long, default_value_t = 50)]
    pub max: usize,
}

#[derive(Debug, Args, Clone)]
pub struct CardIds {
    #[arg(required = true)]
    pub ids: Vec<i64>,
}

#[derive(Debug, Args, Clone)]
pub struct ExportCmd {
    pub path: PathBuf,
}
