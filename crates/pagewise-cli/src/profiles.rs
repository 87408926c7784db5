//! Resource profiles of the ISP console: endpoint path, vocabulary, and columns.

use pagewise_core::{ExportColumn, Vocabulary};

use crate::backend::Record;
use crate::client::{CliError, CliResult};

/// Static description of one list resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ResourceProfile {
    pub(crate) name: &'static str,
    pub(crate) path: &'static str,
    pub(crate) filters: &'static [&'static str],
    pub(crate) sort_fields: &'static [&'static str],
    pub(crate) columns: &'static [&'static str],
}

pub(crate) const PROFILES: &[ResourceProfile] = &[
    ResourceProfile {
        name: "subscribers",
        path: "/v1/subscribers",
        filters: &["status", "plan"],
        sort_fields: &["name", "id", "created_at"],
        columns: &["id", "name", "plan", "status"],
    },
    ResourceProfile {
        name: "users",
        path: "/v1/users",
        filters: &["role", "status"],
        sort_fields: &["name", "email"],
        columns: &["id", "name", "email", "role"],
    },
    ResourceProfile {
        name: "inventory",
        path: "/v1/inventory",
        filters: &["category", "location"],
        sort_fields: &["sku", "name", "quantity"],
        columns: &["id", "sku", "name", "quantity", "location"],
    },
    ResourceProfile {
        name: "ip-blocks",
        path: "/v1/ip-blocks",
        filters: &["region", "status"],
        sort_fields: &["cidr", "region"],
        columns: &["id", "cidr", "region", "status"],
    },
];

/// Look up a profile by resource name.
pub(crate) fn profile(name: &str) -> CliResult<&'static ResourceProfile> {
    PROFILES
        .iter()
        .find(|profile| profile.name == name)
        .ok_or_else(|| {
            let known: Vec<&str> = PROFILES.iter().map(|profile| profile.name).collect();
            CliError::validation(format!(
                "unknown resource '{name}' (expected one of: {})",
                known.join(", ")
            ))
        })
}

impl ResourceProfile {
    pub(crate) fn vocabulary(&self) -> CliResult<Vocabulary> {
        Vocabulary::new(
            self.filters.iter().copied(),
            self.sort_fields.iter().copied(),
        )
        .map_err(|err| CliError::failure(anyhow::Error::new(err).context(self.name)))
    }

    pub(crate) fn export_columns(&self) -> Vec<ExportColumn<Record>> {
        self.columns
            .iter()
            .map(|&field| ExportColumn::new(field, move |record: &Record| record.field_text(field)))
            .collect()
    }
}
