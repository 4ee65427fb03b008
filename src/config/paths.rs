//! Canonical paths under the freightline home.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use freightline::config::paths;
//!
//! let db = paths::database()?;
//! ```

use std::path::{Path, PathBuf};

use anyhow::Result;

pub const DATABASE_FILE: &str = "freightline.db";

/// Get the resolved database file
pub fn database() -> Result<PathBuf> {
    Ok(crate::config::config()?.database.clone())
}

/// Default database location inside `home`
pub fn database_file(home: &Path) -> PathBuf {
    home.join(DATABASE_FILE)
}
