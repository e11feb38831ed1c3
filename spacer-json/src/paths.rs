use directories::ProjectDirs;
use std::path::PathBuf;

pub fn data_root() -> PathBuf {
    if let Some(pd) = ProjectDirs::from("com", "spacer", "Spacer") {
        pd.data_dir().to_path_buf()
    } else {
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    }
}

/// Collection file and backup directory under the platform data dir.
pub fn default_store_file() -> (PathBuf, PathBuf) {
    let root = data_root();
    (root.join("collection.json"), root.join("backups"))
}
