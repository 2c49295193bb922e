//! Bounded multi-select over candidate filenames, used for comparison and bulk actions.

use serde::Serialize;

pub const MAX_SELECTED: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToggleOutcome {
    Added,
    Removed,
    /// Selection already holds `MAX_SELECTED` filenames; nothing changed.
    Full,
}

/// Selected filenames in pick order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SelectionSet {
    filenames: Vec<String>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toggle(&mut self, filename: &str) -> ToggleOutcome {
        if let Some(pos) = self.filenames.iter().position(|f| f == filename) {
            self.filenames.remove(pos);
            return ToggleOutcome::Removed;
        }
        if self.filenames.len() >= MAX_SELECTED {
            return ToggleOutcome::Full;
        }
        self.filenames.push(filename.to_string());
        ToggleOutcome::Added
    }

    pub fn clear(&mut self) {
        self.filenames.clear();
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.filenames.iter().any(|f| f == filename)
    }

    pub fn len(&self) -> usize {
        self.filenames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filenames.is_empty()
    }

    pub fn filenames(&self) -> &[String] {
        &self.filenames
    }

    /// Drops selections for which `present` is false. Returns how many were dropped.
    pub fn retain_present(&mut self, present: impl Fn(&str) -> bool) -> usize {
        let before = self.filenames.len();
        self.filenames.retain(|f| present(f));
        before - self.filenames.len()
    }
}
