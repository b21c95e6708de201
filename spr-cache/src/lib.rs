//! Process-wide interning of on-screen texts (regions, prompts, labels).
//!
//! The renderer keys its glyph cache by intern id, so a region that appears
//! in many sentences is rasterized once.

use lazy_static::lazy_static;
use std::sync::{PoisonError, RwLock};
pub use string_cache::DefaultAtom as Atom;

lazy_static! {
    static ref TEXT_INTERNER: RwLock<Vec<Atom>> = RwLock::new(Vec::new());
}

/// Intern a string and return its ID
pub fn intern_text(s: &str) -> usize {
    let atom = Atom::from(s);
    let mut v = TEXT_INTERNER
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    match v.iter().position(|a| *a == atom) {
        Some(idx) => idx,
        None => {
            v.push(atom);
            v.len() - 1
        }
    }
}

/// Current count of unique texts
pub fn text_count() -> usize {
    TEXT_INTERNER
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .len()
}

/// Atom for a previously interned id.
pub fn get_atom(id: usize) -> Option<Atom> {
    TEXT_INTERNER
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(id)
        .cloned()
}

pub fn get_text(id: usize) -> Option<String> {
    get_atom(id).map(|a| a.to_string())
}

/// Interns every region of a sentence ahead of display.
pub fn intern_all<S: AsRef<str>>(texts: &[S]) -> Vec<usize> {
    texts.iter().map(|t| intern_text(t.as_ref())).collect()
}
