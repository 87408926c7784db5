//! Subscriber rows and helpers shared by controller suites.

use std::cmp::Ordering;

use pagewise_core::{ExportColumn, ListItem, QueryKey, SortDirection, Vocabulary};
use serde::{Deserialize, Serialize};

const PLANS: [&str; 3] = ["fiber-100", "fiber-500", "dsl-20"];
const STATUSES: [&str; 2] = ["active", "suspended"];

/// ISP subscriber row used as the list item in tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    /// Stable identifier.
    pub id: u32,
    /// Display name.
    pub name: String,
    /// Service plan code.
    pub plan: String,
    /// Account status.
    pub status: String,
}

impl ListItem for Subscriber {
    type Id = u32;

    fn id(&self) -> u32 {
        self.id
    }

    fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name must not be empty".to_string());
        }
        if self.plan.trim().is_empty() {
            return Err("plan must not be empty".to_string());
        }
        Ok(())
    }
}

/// Deterministic subscriber for `id`.
#[must_use]
pub fn subscriber(id: u32) -> Subscriber {
    let slot = id as usize;
    Subscriber {
        id,
        name: format!("Subscriber {id:03}"),
        plan: PLANS[slot % PLANS.len()].to_string(),
        status: STATUSES[slot % STATUSES.len()].to_string(),
    }
}

/// Subscribers `1..=count`.
#[must_use]
pub fn subscribers(count: u32) -> Vec<Subscriber> {
    (1..=count).map(subscriber).collect()
}

/// Filter and sort vocabulary of the subscriber list.
#[must_use]
pub fn subscriber_vocabulary() -> Vocabulary {
    Vocabulary::new(["status", "plan"], ["name", "id"]).unwrap_or_default()
}

/// Apply search, filters and sort the way the subscriber endpoint does.
#[must_use]
pub fn subscriber_view(items: &[Subscriber], key: &QueryKey) -> Vec<Subscriber> {
    let needle = key.search.to_lowercase();
    let mut matching: Vec<Subscriber> = items
        .iter()
        .filter(|row| needle.is_empty() || row.name.to_lowercase().contains(&needle))
        .filter(|row| field_matches(key, "status", &row.status))
        .filter(|row| field_matches(key, "plan", &row.plan))
        .cloned()
        .collect();
    if let Some(sort) = &key.sort {
        matching.sort_by(|left, right| {
            let ordering = match sort.field.as_str() {
                "name" => left.name.cmp(&right.name),
                "id" => left.id.cmp(&right.id),
                _ => Ordering::Equal,
            };
            match sort.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });
    }
    matching
}

fn field_matches(key: &QueryKey, field: &str, value: &str) -> bool {
    let mut accepted = key.filter_values(field).peekable();
    accepted.peek().is_none() || accepted.any(|candidate| candidate == value)
}

/// Export columns for subscriber rows.
#[must_use]
pub fn subscriber_columns() -> Vec<ExportColumn<Subscriber>> {
    vec![
        ExportColumn::new("id", |row: &Subscriber| row.id.to_string()),
        ExportColumn::new("name", |row: &Subscriber| row.name.clone()),
        ExportColumn::new("plan", |row: &Subscriber| row.plan.clone()),
        ExportColumn::new("status", |row: &Subscriber| row.status.clone()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagewise_core::Sort;

    #[test]
    fn generated_rows_are_deterministic() {
        assert_eq!(subscriber(7), subscriber(7));
        assert_eq!(subscribers(3).len(), 3);
        assert!(subscriber(1).validate().is_ok());
    }

    #[test]
    fn view_applies_search_filters_and_sort() {
        let rows = subscribers(12);
        let key = QueryKey::new(10)
            .with_search("subscriber 01")
            .with_filter_values("status", ["active"])
            .with_sort(Some(Sort::new("id", SortDirection::Desc)));
        let ids: Vec<u32> = subscriber_view(&rows, &key).iter().map(|row| row.id).collect();
        assert_eq!(ids, vec![12, 10]);
    }

    #[test]
    fn vocabulary_accepts_subscriber_fields() {
        let vocabulary = subscriber_vocabulary();
        assert!(vocabulary.accepts_filter("plan"));
        assert!(vocabulary.accepts_sort("name"));
        assert!(!vocabulary.accepts_filter("name"));
    }
}
