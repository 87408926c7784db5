//! Command handlers and the controller wiring they share.

pub(crate) mod list;
pub(crate) mod mutate;

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::anyhow;
use pagewise_core::{ListController, QueryKey, Sort};

use crate::backend::{HttpBackend, Record};
use crate::cli::QueryArgs;
use crate::client::{AppContext, CliError, CliResult};
use crate::profiles::ResourceProfile;

/// Controller for `profile`, opened at `initial_query`.
pub(crate) fn build_controller(
    ctx: &AppContext,
    profile: &ResourceProfile,
    initial_query: &str,
) -> CliResult<ListController<Record>> {
    let collection = ctx
        .base_url
        .join(profile.path)
        .map_err(|err| CliError::failure(anyhow!("invalid base URL: {err}")))?;
    let backend = HttpBackend::new(ctx.client.clone(), collection, ctx.api_key.clone());
    let controller = ListController::<Record>::builder(profile.name, Arc::new(backend))
        .vocabulary(profile.vocabulary()?)
        .config(ctx.config.clone())
        .initial_query(initial_query)
        .build()?;
    Ok(controller)
}

/// Layer explicit flags over the controller's current key.
///
/// Filters, sort, and page size each reset paging, so an explicit page is
/// applied last.
pub(crate) fn resolve_key(
    controller: &ListController<Record>,
    args: &QueryArgs,
) -> CliResult<QueryKey> {
    let codec = controller.codec();
    let vocabulary = codec.vocabulary();
    let mut key = controller.query();

    if let Some(search) = &args.search {
        key = key.with_search(search.trim());
    }
    for (field, values) in group_filters(&args.filters)? {
        if !vocabulary.accepts_filter(&field) {
            return Err(CliError::validation(format!(
                "unknown filter field '{field}' for {}",
                controller.resource()
            )));
        }
        key = key.with_filter_values(&field, values);
    }
    if let Some(raw) = &args.sort {
        let sort = Sort::parse(raw).ok_or_else(|| {
            CliError::validation(format!(
                "invalid sort '{raw}' (expected FIELD, FIELD:asc or FIELD:desc)"
            ))
        })?;
        if !vocabulary.accepts_sort(&sort.field) {
            return Err(CliError::validation(format!(
                "unknown sort field '{}' for {}",
                sort.field,
                controller.resource()
            )));
        }
        key = key.with_sort(Some(sort));
    }
    if let Some(page_size) = args.page_size {
        if page_size == 0 || page_size > codec.max_page_size() {
            return Err(CliError::validation(format!(
                "page size must be between 1 and {}",
                codec.max_page_size()
            )));
        }
        key = key.with_page_size(page_size);
    }
    if let Some(page) = args.page {
        if page == 0 {
            return Err(CliError::validation("page numbers start at 1"));
        }
        key = key.with_page(page);
    }
    Ok(key)
}

fn group_filters(raw: &[String]) -> CliResult<BTreeMap<String, Vec<String>>> {
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for entry in raw {
        let (field, value) = entry
            .split_once('=')
            .map(|(field, value)| (field.trim(), value.trim()))
            .filter(|(field, _)| !field.is_empty())
            .ok_or_else(|| {
                CliError::validation(format!("filter '{entry}' must be FIELD=VALUE"))
            })?;
        grouped
            .entry(field.to_string())
            .or_default()
            .push(value.to_string());
    }
    Ok(grouped)
}

#[cfg(test)]
pub(crate) mod test_support {
    use pagewise_core::ControllerConfig;
    use reqwest::Client;

    use crate::client::{AppContext, ApiKeyCredential};

    pub(crate) fn context(base_url: &str) -> AppContext {
        AppContext {
            client: Client::new(),
            base_url: base_url.parse().expect("valid URL"),
            api_key: Some(ApiKeyCredential {
                key_id: "ops".to_string(),
                secret: "s3cret".to_string(),
            }),
            config: ControllerConfig {
                min_loading_ms: 0,
                ..ControllerConfig::default()
            },
        }
    }
}
