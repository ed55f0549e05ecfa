//! Process-wide registry of open catalogs
//!
//! Opening the same directory twice in one process returns the same
//! `Catalog`. Entries are weak so a catalog is freed once every handle is
//! dropped; `Catalog::drop` removes its entry.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Weak;

use super::Catalog;

/// Open catalogs by canonical data directory
pub static OPEN_CATALOGS: Lazy<Mutex<HashMap<PathBuf, Weak<Catalog>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));
