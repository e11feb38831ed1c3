use crate::cli::opts::*;

use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use spacer_core::{
    daily_streak, summarize_reviews, Card, CardConfig, Clock, DeckId, Ease, SchedulerSession, Storage, SystemClock,
};
use spacer_json::paths::default_store_file;
use spacer_json::JsonStore;
use std::collections::HashMap;
use std::io::{stdin, stdout, Write};
use std::sync::Arc;

pub async fn run_cli(args: Cli) -> Result<()> {
    let store = open_store(&args).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let mut session = SchedulerSession::new(store.clone(), clock.clone()).server_mode(args.server);

    match args.cmd {
        Command::Stats => stats_cmd(&mut session, clock.as_ref()).await,
        Command::Next => next_cmd(&mut session).await,
        Command::Answer(cmd) => answer_cmd(&mut session, cmd).await,
        Command::Study(cmd) => study_cmd(&mut session, cmd).await,
        Command::Suspend(cmd) => {
            session.suspend_cards(&cmd.ids).await?;
            println!("suspended {}", cmd.ids.len());
            Ok(())
        }
        Command::Unsuspend(cmd) => {
            session.unsuspend_cards(&cmd.ids).await?;
            println!("unsuspended {}", cmd.ids.len());
            Ok(())
        }
        Command::Bury(cmd) => {
            session.bury_cards(&cmd.ids).await?;
            println!("buried {}", cmd.ids.len());
            Ok(())
        }
        Command::Unbury(cmd) => {
            session.unbury_cards(&cmd.ids).await?;
            println!("unburied {}", cmd.ids.len());
            Ok(())
        }
        Command::ExportRevlog(cmd) => export_cmd(store.as_ref(), cmd).await,
    }
}

async fn open_store(args: &Cli) -> Result<Arc<dyn Storage>> {
    let (default_file, default_backups) = default_store_file();
    let file = args.store.clone().unwrap_or(default_file);
    let backups = match (&args.backups, &args.store) {
        (Some(dir), _) => dir.clone(),
        (None, Some(path)) => path.with_file_name("backups"),
        (None, None) => default_backups,
    };
    let store = JsonStore::open_with(file.clone(), backups, args.max_backups)
        .await
        .with_context(|| format!("opening collection {}", file.display()))?
        .server_mode(args.server);
    Ok(Arc::new(store))
}

async fn stats_cmd(session: &mut SchedulerSession, clock: &dyn Clock) -> Result<()> {
    let stats = session.deck_study_stats().await?;
    let decks = session.store().all_decks().await?;
    let mut rows: Vec<_> = decks.values().collect();
    rows.sort_by(|a, b| a.name.cmp(&b.name));

    println!("{:<40} {:>6} {:>6} {:>6}", "deck", "new", "learn", "due");
    for deck in rows {
        let Some(s) = stats.get(&deck.id) else {
            continue;
        };
        println!("{:<40} {:>6} {:>6} {:>6}", deck.name, s.new, s.learning, s.review);
    }

    let reviews = session.store().all_reviews().await?;
    let summary = summarize_reviews(&reviews);
    let today = clock.now().date_naive();
    println!(
        "\nreviews: {}  again: {}  hard: {}  good: {}  easy: {}  retention: {:.0}%  streak: {} day(s)",
        summary.totals.total,
        summary.totals.wrong,
        summary.totals.hard,
        summary.totals.good,
        summary.totals.easy,
        summary.totals.retention() * 100.0,
        daily_streak(&reviews, today)
    );
    Ok(())
}

async fn next_cmd(session: &mut SchedulerSession) -> Result<()> {
    let counts = session.counts().await?;
    println!("new {}  learning {}  review {}", counts.new, counts.learning, counts.review);
    let Some(card) = session.get_card().await? else {
        println!("nothing due");
        return Ok(());
    };
    let config = session.card_config(&card).await?;
    println!(
        "card {}  deck {}  type {:?}  queue {:?}",
        card.id, card.deck_id, card.ctype, card.queue
    );
    println!("{}", button_line(session, &card, &config).await?);
    Ok(())
}

async fn answer_cmd(session: &mut SchedulerSession, cmd: AnswerCmd) -> Result<()> {
    let mut card = session.store().card(cmd.card_id).await?;
    let ease = Ease::from_button(cmd.ease).ok_or_else(|| anyhow!("invalid ease {}", cmd.ease))?;
    let buttons = session.answer_buttons(&card).await?;
    if cmd.ease > buttons {
        bail!("card {} only offers {} buttons", card.id, buttons);
    }
    let outcome = session.answer_card(&mut card, ease).await?;
    print_outcome(&card, outcome.leech, &outcome.buried_siblings);
    Ok(())
}

async fn study_cmd(session: &mut SchedulerSession, cmd: StudyCmd) -> Result<()> {
    let mut studied = 0usize;
    while studied < cmd.max {
        let Some(mut card) = session.get_card().await? else {
            println!("nothing due");
            break;
        };
        let counts = session.counts().await?;
        studied += 1;
        println!(
            "\n[{}/{}] new {}  learning {}  review {}",
            studied, cmd.max, counts.new, counts.learning, counts.review
        );

        let note = session.store().note(card.note_id).await?;
        let mut fields = note.fields.iter();
        println!("Q: {}", fields.next().map(String::as_str).unwrap_or("(empty)"));
        read_line("[enter=show] ")?;
        for field in fields {
            println!("A: {field}");
        }

        let config = session.card_config(&card).await?;
        let buttons = session.answer_buttons(&card).await?;
        println!("{}", button_line(session, &card, &config).await?);
        let ease = loop {
            let line = read_line("ease> ")?;
            match line.trim() {
                "q" | "quit" => return Ok(()),
                other => match other.parse::<u8>().ok().filter(|b| (1..=buttons).contains(b)) {
                    Some(b) => break Ease::from_button(b),
                    None => println!("enter 1-{buttons} or q"),
                },
            }
        };
        let Some(ease) = ease else {
            continue;
        };
        let outcome = session.answer_card(&mut card, ease).await?;
        print_outcome(&card, outcome.leech, &outcome.buried_siblings);
    }
    println!("\nstudied {studied}");
    Ok(())
}

async fn button_line(session: &SchedulerSession, card: &Card, config: &CardConfig) -> Result<String> {
    let buttons = session.answer_buttons(card).await?;
    let labels: &[&str] = if buttons == 2 {
        &["again", "good"]
    } else {
        &["again", "hard", "good", "easy"]
    };
    let parts: Vec<String> = labels
        .iter()
        .zip(1u8..)
        .filter_map(|(label, b)| {
            let ease = Ease::from_button(b)?;
            Some(format!("{b}={label} ({})", session.next_interval_string(card, ease, config)))
        })
        .collect();
    Ok(parts.join("  "))
}

fn print_outcome(card: &Card, leech: bool, buried: &[i64]) {
    println!("card {} -> {:?}, due {}, interval {}d", card.id, card.queue, card.due, card.interval);
    if leech {
        println!("card {} is a leech", card.id);
    }
    if !buried.is_empty() {
        println!("buried siblings: {buried:?}");
    }
}

#[derive(Serialize)]
struct RevlogRow {
    id: i64,
    card_id: i64,
    deck_id: Option<DeckId>,
    ease: u8,
    interval: i64,
    last_interval: i64,
    factor: u32,
    taken_ms: u32,
    kind: String,
}

async fn export_cmd(store: &dyn Storage, cmd: ExportCmd) -> Result<()> {
    let reviews = store.all_reviews().await?;
    let mut card_decks: HashMap<i64, DeckId> = HashMap::new();
    let mut wtr = csv::Writer::from_path(&cmd.path)?;
    for r in &reviews {
        let deck_id = match card_decks.get(&r.card_id) {
            Some(id) => Some(*id),
            None => match store.card(r.card_id).await {
                Ok(card) => {
                    card_decks.insert(card.id, card.deck_id);
                    Some(card.deck_id)
                }
                Err(_) => None,
            },
        };
        wtr.serialize(RevlogRow {
            id: r.id,
            card_id: r.card_id,
            deck_id,
            ease: r.ease.as_button(),
            interval: r.interval.into(),
            last_interval: r.last_interval.into(),
            factor: r.factor,
            taken_ms: r.taken_ms,
            kind: format!("{:?}", r.kind).to_lowercase(),
        })?;
    }
    wtr.flush()?;
    println!("wrote {} entries to {}", reviews.len(), cmd.path.display());
    Ok(())
}

fn read_line(prompt: &str) -> Result<String> {
    print!("{prompt}");
    stdout().flush().ok();
    let mut s = String::new();
    stdin().read_line(&mut s)?;
    Ok(s)
}
