use dirs::data_dir;
use once_cell::sync::Lazy;
use std::{fs, path::Path, path::PathBuf};

static DATA_ROOT: Lazy<PathBuf> = Lazy::new(|| {
    let base = data_dir()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    let root = base.join("eventdeck");
    if let Err(err) = fs::create_dir_all(&root) {
        tracing::warn!(path = ?root, "failed to create data root: {err}");
    }
    root
});

pub fn data_root() -> PathBuf {
    DATA_ROOT.clone()
}

pub fn database_path() -> PathBuf {
    data_root().join("eventdeck.sqlite")
}

pub fn config_path() -> PathBuf {
    data_root().join("config.json")
}

pub fn ensure_parent(path: &Path) {
    if let Some(parent) = path.parent() {
        if let Err(err) = fs::create_dir_all(parent) {
            tracing::warn!(path = ?parent, "failed to create parent: {err}");
        }
    }
}

pub fn clean_text(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn is_blank(input: &str) -> bool {
    input.trim().is_empty()
}
