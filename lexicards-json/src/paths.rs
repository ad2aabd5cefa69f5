use directories::ProjectDirs;
use std::path::PathBuf;

pub fn data_root() -> PathBuf {
    if let Some(pd) = ProjectDirs::from("com", "lexicards", "Lexicards") {
        pd.data_dir().to_path_buf()
    } else {
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    }
}

pub fn default_store_file() -> (PathBuf, PathBuf) {
    let root = data_root();
    let file = root.join("lexicards.json");
    let backups = root.join("backups");
    (file, backups)
}

pub fn default_sqlite_file() -> PathBuf {
    data_root().join("lexicards.sqlite3")
}

pub fn default_settings_file() -> PathBuf {
    data_root().join("settings.json")
}
