use crate::api::server as api_server;
use crate::cli::opts::*;
use crate::cli::settings::Settings;

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use lexicards_core::{
    daily_streak, due_cards, due_count, filter_by_stage, filter_by_text, per_folder_totals,
    resolve_folder, stage_counts, summarize, Card, CardContent, CardId, CoreError, Folder,
    FolderId, Rating, Repository, Review, ReviewService, ReviewSession, Scheduler, Selection,
};
use lexicards_json::paths::default_sqlite_file;
use lexicards_json::JsonStore;
use lexicards_sqlite::SqliteRepo;
use std::collections::{HashMap, HashSet};
use std::io::{stdin, stdout, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub async fn run_cli(args: Cli) -> Result<()> {
    let settings = Settings::load(args.settings.as_deref())?;
    let repo = open_repo(&args.store, args.db_path.clone()).await?;
    let scheduler = Scheduler::new(settings.scheduler.clone())?;
    let service = Arc::new(
        ReviewService::new(repo.clone(), scheduler).with_max_attempts(settings.review_max_attempts),
    );

    match args.cmd {
        Command::Folder(cmd) => folder_cmd(&*repo, cmd).await,
        Command::Card(cmd) => card_cmd(&service, cmd).await,
        Command::Due(cmd) => due_cmd(&*repo, cmd).await,
        Command::Review(cmd) => review_cmd(&service, cmd).await,
        Command::Stats(cmd) => stats_cmd(&*repo, cmd).await,
        Command::Export(cmd) => export_cmd(&*repo, cmd).await,
        Command::Import(cmd) => import_cmd(&*repo, cmd).await,
        Command::Api(api) => {
            let addr: std::net::SocketAddr = api
                .addr
                .parse()
                .with_context(|| format!("invalid bind address {}", api.addr))?;
            api_server::run(service, addr).await
        }
    }
}

pub async fn open_repo(store: &StoreKind, db_path: Option<PathBuf>) -> Result<Arc<dyn Repository>> {
    match store {
        StoreKind::Json => {
            let s = JsonStore::open_default().await?;
            info!(path = %s.path().display(), "using json store");
            Ok(Arc::new(s))
        }
        StoreKind::Sqlite => {
            let p = db_path.unwrap_or_else(default_sqlite_file);
            if let Some(parent) = p.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            let s = SqliteRepo::open_file(&p).await?;
            info!(path = %p.display(), "using sqlite store");
            Ok(Arc::new(s))
        }
    }
}

async fn folder_cmd(repo: &dyn Repository, cmd: FolderCmd) -> Result<()> {
    match cmd {
        FolderCmd::Add { name } => {
            let f = repo.create_folder(&name).await?;
            println!("{}", f.id);
        }
        FolderCmd::List => {
            let now = Utc::now();
            for f in repo.list_folders().await? {
                let cards = repo.list_cards(Some(f.id)).await?;
                println!(
                    "{}\t{}\tcards={}\tdue={}",
                    f.id,
                    f.name,
                    cards.len(),
                    due_count(&cards, now)
                );
            }
        }
        FolderCmd::Rm { folder } => {
            let f = resolve_folder(repo, &folder).await?;
            repo.delete_folder(f.id).await?;
            println!("ok");
        }
    }
    Ok(())
}

async fn card_cmd(service: &ReviewService, cmd: CardCmd) -> Result<()> {
    let repo = service.repo().as_ref();
    match cmd {
        CardCmd::Add(a) => {
            let folder = resolve_folder(repo, &a.folder).await?;
            let content = CardContent {
                word: a.word,
                pronunciation: a.pronunciation,
                meaning: a.meaning,
                synonyms: a.synonyms,
                examples: a.examples,
            };
            let c = repo.add_card(folder.id, &content).await?;
            println!("{}", c.id);
        }
        CardCmd::List(l) => {
            let folder_id = folder_filter(repo, l.folder.as_deref()).await?;
            let mut cards = repo.list_cards(folder_id).await?;
            if let Some(q) = &l.query {
                cards = filter_by_text(&cards, q);
            }
            if let Some(stage) = l.stage {
                cards = filter_by_stage(&cards, stage.into());
            }
            for c in cards {
                println!(
                    "{}\t{}\t{}\tstage={:?}\tnext={}",
                    c.id,
                    c.content.word,
                    c.content.meaning,
                    c.stage(),
                    c.schedule.next_review.format("%Y-%m-%d")
                );
            }
        }
        CardCmd::Show { card_id } => {
            let card = repo.get_card(parse_uuid(&card_id)?).await?;
            print_card(&card);
            let s = &card.schedule;
            println!(
                "stage: {:?}\trepetitions: {}\tease: {:.2}\tinterval: {}d\tnext review: {}",
                card.stage(),
                s.repetitions,
                s.ease,
                s.interval_days,
                s.next_review.to_rfc3339()
            );
            let preview = service.scheduler().preview(s, Utc::now())?;
            println!("{}", rating_menu(&preview));
            for r in repo.list_reviews_for_card(card.id).await? {
                println!(
                    "  {}\t{}\t-> {}d\tease {:.2}",
                    r.reviewed_at.format("%Y-%m-%d %H:%M"),
                    r.rating,
                    r.interval_days,
                    r.ease_after
                );
            }
        }
        CardCmd::Edit(e) => {
            let id = parse_uuid(&e.card_id)?;
            let mut content = repo.get_card(id).await?.content;

            if let Some(w) = e.word { content.word = w; }
            if let Some(p) = e.pronunciation { content.pronunciation = p; }
            if let Some(m) = e.meaning { content.meaning = m; }
            if let Some(s) = e.synonyms { content.synonyms = s; }
            if e.clear_examples { content.examples.clear(); }
            content.examples.extend(e.add_examples);

            repo.update_content(id, &content).await?;
            println!("ok");
        }
        CardCmd::Rm { card_id } => {
            repo.delete_card(parse_uuid(&card_id)?).await?;
            println!("ok");
        }
    }
    Ok(())
}

async fn due_cmd(repo: &dyn Repository, cmd: DueCmd) -> Result<()> {
    let folder_id = folder_filter(repo, cmd.folder.as_deref()).await?;
    let cards = repo.list_cards(folder_id).await?;
    let now = Utc::now();
    if cmd.count {
        println!("{}", due_count(&cards, now));
        return Ok(());
    }
    let due = due_cards(&cards, now);
    println!("{} due", due.len());
    for c in due {
        println!(
            "{}\t{}\tdue since {}",
            c.id,
            c.content.word,
            c.schedule.next_review.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

enum ReviewInput {
    Rate(Rating),
    Skip,
    Quit,
}

fn parse_review_input(s: &str) -> Option<ReviewInput> {
    match s.trim().to_lowercase().as_str() {
        "1" | "a" | "again" => Some(ReviewInput::Rate(Rating::Again)),
        "2" | "h" | "hard" => Some(ReviewInput::Rate(Rating::Hard)),
        "3" | "g" | "good" => Some(ReviewInput::Rate(Rating::Good)),
        "4" | "e" | "easy" => Some(ReviewInput::Rate(Rating::Easy)),
        "s" | "skip" => Some(ReviewInput::Skip),
        "q" | "quit" => Some(ReviewInput::Quit),
        _ => None,
    }
}

fn rating_menu(preview: &[u32; 4]) -> String {
    let choices: Vec<String> = Rating::ALL
        .iter()
        .zip(preview)
        .enumerate()
        .map(|(i, (r, days))| format!("{}={} ({}d)", i + 1, r, days))
        .collect();
    format!("[{}, s=skip, q=quit]", choices.join(", "))
}

async fn review_cmd(service: &ReviewService, cmd: ReviewCmd) -> Result<()> {
    let repo = service.repo().as_ref();
    let folder_id = folder_filter(repo, cmd.folder.as_deref()).await?;

    let mut session = ReviewSession::new(service.scheduler().clone());
    let mut skipped: HashSet<CardId> = HashSet::new();
    let mut reviewed = 0usize;

    while reviewed < cmd.max {
        // fresh snapshot every round so edits from elsewhere are picked up
        let mut cards = repo.list_cards(folder_id).await?;
        cards.retain(|c| !skipped.contains(&c.id));
        let now = Utc::now();
        let remaining = due_count(&cards, now);

        let card = match session.present_next(&cards, now)? {
            Selection::Due(card) => card,
            Selection::EmptyDueQueue => {
                println!("no cards due");
                break;
            }
        };

        println!("\n[{} due] {}", remaining, card.content.word);
        if read_line(&mut stdin().lock(), "[enter=show]")?.is_none() {
            session.abandon();
            break;
        }
        print_card(&card);
        let preview = service.scheduler().preview(&card.schedule, now)?;
        println!("{}", rating_menu(&preview));

        let input = read_review_input(&mut stdin().lock())?;

        match input {
            ReviewInput::Rate(rating) => {
                let outcome = session.submit(rating, Utc::now())?;
                let stored = service.commit(card.version, outcome).await?;
                reviewed += 1;
                println!(
                    "→ next due in {} day(s)",
                    stored.updated_card.schedule.interval_days
                );
            }
            ReviewInput::Skip => {
                session.abandon();
                skipped.insert(card.id);
            }
            ReviewInput::Quit => {
                session.abandon();
                break;
            }
        }
    }

    println!("\nreviewed {}", reviewed);
    Ok(())
}

async fn stats_cmd(repo: &dyn Repository, cmd: StatsCmd) -> Result<()> {
    let folder_id = folder_filter(repo, cmd.folder.as_deref()).await?;
    let cards = repo.list_cards(folder_id).await?;
    let ids: HashSet<CardId> = cards.iter().map(|c| c.id).collect();
    let reviews: Vec<Review> = repo
        .list_reviews()
        .await?
        .into_iter()
        .filter(|r| ids.contains(&r.card_id))
        .collect();

    let now = Utc::now();
    let summary = summarize(&reviews);
    let stages = stage_counts(&cards);
    let t = &summary.totals;
    println!("cards: {} ({} due)", cards.len(), due_count(&cards, now));
    println!(
        "stages: new={} learning={} young={} mature={}",
        stages.new, stages.learning, stages.young, stages.mature
    );
    println!(
        "reviews: {} (again={} hard={} good={} easy={})  accuracy {:.0}%",
        t.total,
        t.again,
        t.hard,
        t.good,
        t.easy,
        t.accuracy() * 100.0
    );
    println!("streak: {} day(s)", daily_streak(&reviews, now.date_naive()));

    if folder_id.is_none() {
        let card_to_folder: HashMap<CardId, FolderId> =
            cards.iter().map(|c| (c.id, c.folder_id)).collect();
        let per_folder = per_folder_totals(&reviews, &card_to_folder);
        for f in repo.list_folders().await? {
            if let Some(t) = per_folder.get(&f.id) {
                println!("  {}: {} reviews, accuracy {:.0}%", f.name, t.total, t.accuracy() * 100.0);
            }
        }
    }
    Ok(())
}

#[derive(serde::Serialize, serde::Deserialize)]
struct ExportBundle {
    version: u32,
    folders: Vec<Folder>,
    cards: Vec<Card>,
    #[serde(default)]
    reviews: Vec<Review>,
}

/// CSV rows carry card content only; scheduling progress travels in the
/// JSON export. Examples are stored as a JSON array inside their cell.
const CSV_HEADER: [&str; 6] = ["folder", "word", "pronunciation", "meaning", "synonyms", "examples"];

fn examples_to_cell(examples: &[String]) -> Result<String> {
    Ok(serde_json::to_string(examples)?)
}

/// Accepts a JSON array, or a plain non-empty cell as a single example.
fn examples_from_cell(cell: &str) -> Result<Vec<String>> {
    let cell = cell.trim();
    if cell.is_empty() {
        Ok(Vec::new())
    } else if cell.starts_with('[') {
        serde_json::from_str(cell).with_context(|| format!("bad examples cell: {cell}"))
    } else {
        Ok(vec![cell.to_string()])
    }
}

async fn export_cmd(repo: &dyn Repository, cmd: ExportCmd) -> Result<()> {
    match cmd {
        ExportCmd::Json { path } => {
            let bundle = ExportBundle {
                version: 1,
                folders: repo.list_folders().await?,
                cards: repo.list_cards(None).await?,
                reviews: repo.list_reviews().await?,
            };
            let s = serde_json::to_string_pretty(&bundle)?;
            std::fs::write(&path, s).with_context(|| format!("writing {}", path.display()))?;
            println!("wrote {}", path.display());
        }
        ExportCmd::Csv { path, folder } => {
            let folder_id = folder_filter(repo, folder.as_deref()).await?;
            let cards = repo.list_cards(folder_id).await?;
            let folder_name: HashMap<FolderId, String> = repo
                .list_folders()
                .await?
                .into_iter()
                .map(|f| (f.id, f.name))
                .collect();

            let mut wtr = csv::Writer::from_path(&path)?;
            wtr.write_record(CSV_HEADER)?;
            for c in cards {
                let name = folder_name
                    .get(&c.folder_id)
                    .cloned()
                    .unwrap_or_else(|| c.folder_id.to_string());
                wtr.write_record([
                    name,
                    c.content.word,
                    c.content.pronunciation,
                    c.content.meaning,
                    c.content.synonyms,
                    examples_to_cell(&c.content.examples)?,
                ])?;
            }
            wtr.flush()?;
            println!("wrote {}", path.display());
        }
    }
    Ok(())
}

async fn import_cmd(repo: &dyn Repository, cmd: ImportCmd) -> Result<()> {
    match cmd {
        ImportCmd::Json { path } => {
            let data = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let bundle: ExportBundle = serde_json::from_str(&data)?;
            let n = import_bundle(repo, bundle).await?;
            println!("imported {n} card(s)");
        }
        ImportCmd::Csv { path, folder } => {
            let mut rdr = csv::Reader::from_path(&path)?;
            let target = match folder {
                Some(sel) => Some(resolve_folder(repo, &sel).await?),
                None => None,
            };
            let mut n = 0usize;
            for rec in rdr.records() {
                let rec = rec?;
                let field = |i: usize| rec.get(i).unwrap_or("").trim().to_string();
                let content = CardContent {
                    word: field(1),
                    pronunciation: field(2),
                    meaning: field(3),
                    synonyms: field(4),
                    examples: examples_from_cell(&field(5))?,
                };
                let folder = match &target {
                    Some(f) => f.clone(),
                    None => ensure_folder_by_name(repo, &field(0)).await?,
                };
                repo.add_card(folder.id, &content).await?;
                n += 1;
            }
            println!("imported {n} card(s)");
        }
    }
    Ok(())
}

/// Recreates folders by name and cards with fresh ids, keeping their
/// scheduling progress and review history.
async fn import_bundle(repo: &dyn Repository, bundle: ExportBundle) -> Result<usize> {
    let names: HashMap<FolderId, String> = bundle
        .folders
        .into_iter()
        .map(|f| (f.id, f.name))
        .collect();
    let mut folders: HashMap<FolderId, Folder> = HashMap::new();
    let mut new_ids: HashMap<CardId, CardId> = HashMap::new();

    for c in bundle.cards {
        let folder = match folders.get(&c.folder_id) {
            Some(f) => f.clone(),
            None => {
                let name = names
                    .get(&c.folder_id)
                    .ok_or_else(|| anyhow!("card {} refers to unknown folder", c.id))?;
                let f = ensure_folder_by_name(repo, name).await?;
                folders.insert(c.folder_id, f.clone());
                f
            }
        };
        let added = repo.add_card(folder.id, &c.content).await?;
        if !c.is_new() {
            match c.schedule.validate() {
                Ok(()) => {
                    repo.update_schedule(added.id, added.version, &c.schedule).await?;
                }
                Err(e) => warn!(card = %c.id, error = %e, "keeping default schedule"),
            }
        }
        new_ids.insert(c.id, added.id);
    }

    for r in bundle.reviews {
        if let Some(card_id) = new_ids.get(&r.card_id) {
            let review = Review {
                id: Uuid::new_v4(),
                card_id: *card_id,
                ..r
            };
            repo.insert_review(&review).await?;
        }
    }
    Ok(new_ids.len())
}

// ===== Helpers =====
fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|_| anyhow!("invalid uuid: {s}"))
}

async fn folder_filter(repo: &dyn Repository, sel: Option<&str>) -> Result<Option<FolderId>> {
    match sel {
        Some(sel) => {
            let f = resolve_folder(repo, sel)
                .await
                .with_context(|| format!("folder {sel}"))?;
            Ok(Some(f.id))
        }
        None => Ok(None),
    }
}

async fn ensure_folder_by_name(repo: &dyn Repository, name: &str) -> Result<Folder> {
    if name.trim().is_empty() {
        bail!("missing folder name");
    }
    match resolve_folder(repo, name).await {
        Ok(f) => Ok(f),
        Err(CoreError::NotFound(_)) => Ok(repo.create_folder(name).await?),
        Err(e) => Err(e.into()),
    }
}

fn print_card(card: &Card) {
    let c = &card.content;
    println!("{}", c.word);
    if !c.pronunciation.is_empty() { println!("  pronunciation: {}", c.pronunciation); }
    if !c.meaning.is_empty() { println!("  meaning: {}", c.meaning); }
    if !c.synonyms.is_empty() { println!("  synonyms: {}", c.synonyms); }
    for ex in &c.examples {
        println!("  e.g. {}", ex);
    }
}

/// `None` once the input is exhausted.
fn read_line<R: BufRead>(input: &mut R, prompt: &str) -> Result<Option<String>> {
    print!("{prompt}");
    stdout().flush().ok();
    let mut s = String::new();
    if input.read_line(&mut s)? == 0 {
        return Ok(None);
    }
    Ok(Some(s))
}

/// Prompts until a valid answer arrives. End of input counts as quit.
fn read_review_input<R: BufRead>(input: &mut R) -> Result<ReviewInput> {
    loop {
        let Some(line) = read_line(input, "rating> ")? else {
            println!();
            return Ok(ReviewInput::Quit);
        };
        match parse_review_input(&line) {
            Some(answer) => return Ok(answer),
            None => println!("enter 1-4 (again/hard/good/easy), s, or q"),
        }
    }
}
