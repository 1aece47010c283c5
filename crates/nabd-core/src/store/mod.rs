// ── Stores ──
//
// In-memory choreography library and the on-disk state directory.

pub mod library;
pub mod snapshot;

use std::path::{Component, Path, PathBuf};

pub use library::ChoreographyLibrary;
pub use snapshot::{LoadReport, SaveReport, StateStore};

/// Join `relative` onto `root`, refusing anything that could escape it:
/// absolute paths, `..`, drive prefixes and empty paths.
pub fn resource_path(root: &Path, relative: &Path) -> Option<PathBuf> {
    let mut joined = root.to_path_buf();
    let mut any = false;
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                joined.push(part);
                any = true;
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    any.then_some(joined)
}

/// A name usable as a single file stem.
pub(crate) fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.contains('\0')
}
