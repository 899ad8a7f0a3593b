//! Root-directory resolution, matching the layout spec: `<cwd>/local_data`.

use std::path::PathBuf;

pub fn default_root() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")).join("local_data")
}
