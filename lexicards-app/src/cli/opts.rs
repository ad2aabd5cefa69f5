use clap::{Args, Parser, Subcommand, ValueEnum};
use lexicards_core::Stage;
use std::path::PathBuf;

#[derive(Debug, Clone, ValueEnum)]
pub enum StoreKind {
    Json,
    Sqlite,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StageArg {
    New,
    Learning,
    Young,
    Mature,
}

impl From<StageArg> for Stage {
    fn from(s: StageArg) -> Self {
        match s {
            StageArg::New => Stage::New,
            StageArg::Learning => Stage::Learning,
            StageArg::Young => Stage::Young,
            StageArg::Mature => Stage::Mature,
        }
    }
}

#[derive(Debug, Parser, Clone)]
#[command(name = "lexicards", version, about = "Lexicards vocabulary flashcards: CLI and HTTP API")]
pub struct Cli {
    /// Storage backend
    #[arg(long, value_enum, default_value_t = StoreKind::Json)]
    pub store: StoreKind,

    /// SQLite DB path when --store sqlite (defaults to app data dir)
    #[arg(long)]
    pub db_path: Option<PathBuf>,

    /// Settings file (defaults to settings.json in the app data dir, if present)
    #[arg(long)]
    pub settings: Option<PathBuf>,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Folder operations
    #[command(subcommand)]
    Folder(FolderCmd),
    /// Card operations
    #[command(subcommand)]
    Card(CardCmd),
    /// Show how many cards are due, and which
    Due(DueCmd),
    /// Interactive review loop
    Review(ReviewCmd),
    /// Review statistics
    Stats(StatsCmd),
    /// Export data
    #[command(subcommand)]
    Export(ExportCmd),
    /// Import data
    #[command(subcommand)]
    Import(ImportCmd),
    /// Launch the HTTP API
    Api(ApiCmd),
}

#[derive(Debug, Subcommand, Clone)]
pub enum FolderCmd {
    Add { name: String },
    List,
    Rm { folder: String },
}

#[derive(Debug, Subcommand, Clone)]
pub enum CardCmd {
    Add(CardAdd),
    List(CardList),
    Show { card_id: String },
    Edit(CardEdit),
    Rm { card_id: String },
}

#[derive(Debug, Args, Clone)]
pub struct CardAdd {
    #[arg(long)]
    pub folder: String,
    #[arg(long)]
    pub word: String,
    #[arg(long, default_value = "")]
    pub pronunciation: String,
    #[arg(long, default_value = "")]
    pub meaning: String,
    #[arg(long, default_value = "")]
    pub synonyms: String,
    #[arg(long = "example")]
    pub examples: Vec<String>,
}

#[derive(Debug, Args, Clone)]
pub struct CardList {
    #[arg(long)]
    pub folder: Option<String>,
    /// Case-insensitive text search
    #[arg(long)]
    pub query: Option<String>,
    #[arg(long, value_enum)]
    pub stage: Option<StageArg>,
}

#[derive(Debug, Args, Clone)]
pub struct CardEdit {
    pub card_id: String,
    #[arg(long)]
    pub word: Option<String>,
    #[arg(long)]
    pub pronunciation: Option<String>,
    #[arg(long)]
    pub meaning: Option<String>,
    #[arg(long)]
    pub synonyms: Option<String>,
    #[arg(long = "add-example")]
    pub add_examples: Vec<String>,
    /// Drop all existing examples before adding new ones
    #[arg(long)]
    pub clear_examples: bool,
}

#[derive(Debug, Args, Clone)]
pub struct DueCmd {
    #[arg(long)]
    pub folder: Option<String>,
    /// Only print the count
    #[arg(long)]
    pub count: bool,
}

#[derive(Debug, Args, Clone)]
pub struct ReviewCmd {
    #[arg(long)]
    pub folder: Option<String>,
    #[arg(long, default_value_t = 50)]
    pub max: usize,
}

#[derive(Debug, Args, Clone)]
pub struct StatsCmd {
    #[arg(long)]
    pub folder: Option<String>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum ExportCmd {
    Json { path: PathBuf },
    Csv { path: PathBuf, #[arg(long)] folder: Option<String> },
}

#[derive(Debug, Subcommand, Clone)]
pub enum ImportCmd {
    Json { path: PathBuf },
    Csv { path: PathBuf, #[arg(long)] folder: Option<String> },
}

#[derive(Debug, Args, Clone)]
pub struct ApiCmd {
    /// Bind address (host:port)
    #[arg(long, default_value = "127.0.0.1:8080")]
    pub addr: String,
}
