use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "range.yaml";
pub const CREDENTIALS_FILE: &str = "credentials.yaml";

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn credentials_path(root: &Path) -> PathBuf {
    root.join(CREDENTIALS_FILE)
}

pub fn ledger_path(root: &Path) -> PathBuf {
    root.join(".range").join("ledger.yaml")
}
