// Change detection between consecutive scoreboard snapshots.
//
// Used only to decide whether an update notification goes out. Snapshots are
// never merged or patched.

use crate::model::Scoreboard;

/// Structural equality. Item order matters; JSON key order never reaches
/// the typed model, so it cannot.
pub fn scoreboards_equal(prev: &Scoreboard, next: &Scoreboard) -> bool {
    prev == next
}

/// Whether `next` warrants a notification given the retained snapshot.
/// With no retained snapshot everything counts as a change.
pub fn has_changed(prev: Option<&Scoreboard>, next: &Scoreboard) -> bool {
    match prev {
        Some(prev) => !scoreboards_equal(prev, next),
        None => true,
    }
}
