use anyhow::anyhow;

use crate::backend::Record;
use crate::cli::{RemoveArgs, WriteArgs};
use crate::client::{AppContext, CliError, CliResult};
use crate::commands::build_controller;
use crate::output::render_report;
use crate::profiles::profile;

pub(crate) async fn handle_create(ctx: &AppContext, args: WriteArgs) -> CliResult<()> {
    let profile = profile(&args.resource)?;
    let record = parse_record(&args.json)?;
    let id = record.id.clone();
    let controller = build_controller(ctx, profile, "")?;
    controller.create(record).await?;
    println!("Created {} {id}", profile.name);
    Ok(())
}

pub(crate) async fn handle_update(ctx: &AppContext, args: WriteArgs) -> CliResult<()> {
    let profile = profile(&args.resource)?;
    let record = parse_record(&args.json)?;
    let id = record.id.clone();
    let controller = build_controller(ctx, profile, "")?;
    controller.update(record).await?;
    println!("Updated {} {id}", profile.name);
    Ok(())
}

pub(crate) async fn handle_remove(ctx: &AppContext, args: RemoveArgs) -> CliResult<()> {
    let profile = profile(&args.resource)?;
    let controller = build_controller(ctx, profile, "")?;
    let report = controller.delete_many(args.ids).await?;
    println!("{}", render_report(&report));
    if report.is_complete() {
        Ok(())
    } else {
        Err(CliError::failure(anyhow!(
            "{} of {} deletions failed",
            report.failed.len(),
            report.failed.len() + report.deleted.len()
        )))
    }
}

fn parse_record(raw: &str) -> CliResult<Record> {
    serde_json::from_str(raw).map_err(|err| {
        CliError::validation(format!("item must be a JSON object with an id: {err}"))
    })
}
