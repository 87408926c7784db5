//! Multi-select state keyed by stable item identifiers.
//!
//! Selection is never pruned by background refreshes; ids that left the page
//! only disappear on the next explicit [`SelectionTracker::select_all`].

use std::collections::BTreeSet;

/// Selected identifiers for bulk actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionTracker<Id: Ord> {
    selected: BTreeSet<Id>,
}

impl<Id: Ord> Default for SelectionTracker<Id> {
    fn default() -> Self {
        Self {
            selected: BTreeSet::new(),
        }
    }
}

impl<Id: Ord + Clone> SelectionTracker<Id> {
    /// Tracker seeded with previously persisted identifiers.
    pub fn restore(ids: impl IntoIterator<Item = Id>) -> Self {
        Self {
            selected: ids.into_iter().collect(),
        }
    }

    /// Toggle the presence of `id`; returns whether it is now selected.
    pub fn toggle(&mut self, id: Id) -> bool {
        if self.selected.remove(&id) {
            false
        } else {
            self.selected.insert(id);
            true
        }
    }

    /// Replace the selection with exactly the current page.
    pub fn select_all(&mut self, page_ids: &[Id]) {
        self.selected = page_ids.iter().cloned().collect();
    }

    /// Header-checkbox behaviour: clear a fully selected page, otherwise select it.
    pub fn toggle_all(&mut self, page_ids: &[Id]) {
        if self.is_all_selected(page_ids) {
            for id in page_ids {
                self.selected.remove(id);
            }
        } else {
            self.select_all(page_ids);
        }
    }

    /// Drop the given identifiers (e.g. after they were deleted).
    pub fn remove_many<'a>(&mut self, ids: impl IntoIterator<Item = &'a Id>)
    where
        Id: 'a,
    {
        for id in ids {
            self.selected.remove(id);
        }
    }

    /// Clear every selected identifier.
    pub fn clear(&mut self) {
        self.selected.clear();
    }

    /// Whether `id` is selected.
    #[must_use]
    pub fn contains(&self, id: &Id) -> bool {
        self.selected.contains(id)
    }

    /// Number of selected identifiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.selected.len()
    }

    /// Whether nothing is selected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    /// Selected identifiers in ascending order.
    #[must_use]
    pub fn ids(&self) -> Vec<Id> {
        self.selected.iter().cloned().collect()
    }

    /// True iff the page is non-empty and every id on it is selected.
    #[must_use]
    pub fn is_all_selected(&self, page_ids: &[Id]) -> bool {
        !page_ids.is_empty() && page_ids.iter().all(|id| self.selected.contains(id))
    }

    /// True iff something is selected but not the whole page.
    #[must_use]
    pub fn is_indeterminate(&self, page_ids: &[Id]) -> bool {
        !self.selected.is_empty() && !self.is_all_selected(page_ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_adds_and_removes() {
        let mut tracker = SelectionTracker::default();
        assert!(tracker.toggle("a"));
        assert!(tracker.contains(&"a"));
        assert!(!tracker.toggle("a"));
        assert!(tracker.is_empty());
    }

    #[test]
    fn empty_page_is_never_all_selected() {
        let tracker = SelectionTracker::restore(["a"]);
        assert!(!tracker.is_all_selected(&[]));
        assert!(tracker.is_indeterminate(&[]));
        assert!(!SelectionTracker::<&str>::default().is_indeterminate(&[]));
    }

    #[test]
    fn all_selected_is_a_superset_check() {
        let tracker = SelectionTracker::restore(["a", "b", "z"]);
        assert!(tracker.is_all_selected(&["b", "a"]));
        assert!(!tracker.is_indeterminate(&["b", "a"]));
        assert!(!tracker.is_all_selected(&["a", "c"]));
        assert!(tracker.is_indeterminate(&["a", "c"]));
    }

    #[test]
    fn select_all_prunes_ids_outside_the_page() {
        let mut tracker = SelectionTracker::restore(["stale", "a"]);
        tracker.select_all(&["a", "b"]);
        assert_eq!(tracker.ids(), vec!["a", "b"]);
    }

    #[test]
    fn toggle_all_clears_a_full_page() {
        let mut tracker = SelectionTracker::default();
        tracker.toggle_all(&["a", "b"]);
        assert_eq!(tracker.len(), 2);
        tracker.toggle_all(&["a", "b"]);
        assert!(tracker.is_empty());
    }

    #[test]
    fn selection_survives_reordering() {
        let tracker = SelectionTracker::restore(["a", "b"]);
        assert!(tracker.is_all_selected(&["b", "a"]));
        assert!(tracker.is_all_selected(&["a", "b"]));
    }
}
