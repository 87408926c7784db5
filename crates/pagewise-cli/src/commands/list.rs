use std::fs;

use anyhow::anyhow;
use pagewise_core::{FetchOutcome, ListController};

use crate::backend::Record;
use crate::cli::{ExportArgs, ListArgs, QueryArgs};
use crate::client::{AppContext, CliError, CliResult};
use crate::commands::{build_controller, resolve_key};
use crate::output::{OutputFormat, PageView, render_page};
use crate::profiles::{ResourceProfile, profile};

pub(crate) async fn handle_list(
    ctx: &AppContext,
    args: ListArgs,
    format: OutputFormat,
) -> CliResult<()> {
    let profile = profile(&args.resource)?;
    let controller = fetch_page(ctx, profile, &args.query).await?;
    let collection = controller.collection();
    let query = controller.shareable_query();
    let rendered = render_page(
        &PageView {
            profile,
            collection: &collection,
            page: controller.query().page,
            query: &query,
        },
        format,
    )?;
    println!("{rendered}");
    Ok(())
}

pub(crate) async fn handle_export(ctx: &AppContext, args: ExportArgs) -> CliResult<()> {
    let profile = profile(&args.list.resource)?;
    let controller = fetch_page(ctx, profile, &args.list.query).await?;
    let csv = controller
        .export_csv(&profile.export_columns())
        .map_err(|err| CliError::failure(anyhow::Error::new(err).context("CSV export failed")))?;

    match &args.out {
        Some(path) => {
            fs::write(path, &csv).map_err(|err| {
                CliError::failure(anyhow!("failed to write '{}': {err}", path.display()))
            })?;
            println!(
                "Exported {} {} to {}",
                controller.collection().len(),
                profile.name,
                path.display()
            );
        }
        None => print!("{csv}"),
    }
    Ok(())
}

async fn fetch_page(
    ctx: &AppContext,
    profile: &ResourceProfile,
    args: &QueryArgs,
) -> CliResult<ListController<Record>> {
    let controller = build_controller(ctx, profile, args.query.as_deref().unwrap_or_default())?;
    let key = resolve_key(&controller, args)?;
    match controller.request(key).await {
        FetchOutcome::Applied => Ok(controller),
        FetchOutcome::Failed(error) => Err(error.into()),
        other => Err(CliError::failure(anyhow!(
            "list request for {} ended as {}",
            profile.name,
            other.label()
        ))),
    }
}
