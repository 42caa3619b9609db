//! Schedule subcommand handlers.

use std::path::Path;

use tracing::warn;

use netsweep_core::Engine;
use netsweep_protocols::{ExpectedVersion, ScheduleDefinition};

use crate::cli::{OutputFormat, ScheduleAction};

/// Handle schedule subcommands.
pub(crate) async fn handle_schedule_command(
    engine: &Engine,
    action: ScheduleAction,
) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ScheduleAction::List { format } => schedule_list(engine, format).await,
        ScheduleAction::Add {
            file,
            expect_version,
        } => schedule_add(engine, &file, expect_version).await,
        ScheduleAction::Remove {
            schedule_id,
            expect_version,
        } => {
            engine
                .delete_schedule(&schedule_id, expected(expect_version))
                .await?;
            println!("Removed schedule {}", schedule_id);
            Ok(())
        }
        ScheduleAction::Validate { schedule_id } => schedule_validate(engine, &schedule_id).await,
        ScheduleAction::RunNow { schedule_id } => {
            let result = engine.run_schedule_now(&schedule_id).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            match result.error_code() {
                Some(code) => Err(format!("schedule {} did not run: {}", schedule_id, code).into()),
                None => Ok(()),
            }
        }
    }
}

fn expected(version: Option<u64>) -> ExpectedVersion {
    match version {
        None => ExpectedVersion::Any,
        Some(0) => ExpectedVersion::Absent,
        Some(v) => ExpectedVersion::Exact(v),
    }
}

async fn schedule_list(engine: &Engine, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let views = engine.list_schedules().await?;
    if views.is_empty() {
        println!("No schedules.");
        return Ok(());
    }

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&views)?),
        OutputFormat::Table => {
            println!(
                "{:<20} {:<24} {:<9} {:<8} {:<26} {}",
                "ID", "NAME", "STATUS", "VERSION", "NEXT RUN", "LAST RESULT"
            );
            println!("{}", "-".repeat(100));
            for view in &views {
                let next = view
                    .runtime
                    .next_run_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "-".to_string());
                let last = view
                    .runtime
                    .last_result
                    .as_ref()
                    .map(|r| r.error_code().unwrap_or("completed"))
                    .unwrap_or("-");
                println!(
                    "{:<20} {:<24} {:<9} {:<8} {:<26} {}",
                    view.definition.id,
                    view.definition.name,
                    format!("{:?}", view.runtime.status).to_lowercase(),
                    view.version,
                    next,
                    last
                );
            }
        }
    }
    Ok(())
}

async fn schedule_add(
    engine: &Engine,
    file: &Path,
    expect_version: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let content = tokio::fs::read_to_string(file).await?;
    let definition: ScheduleDefinition = serde_json::from_str(&content)?;
    let id = definition.id.clone();

    let version = engine.save_schedule(definition, expected(expect_version)).await?;
    println!("Saved schedule {} (version {})", id, version);

    match engine.validate_schedule(&id).await {
        Ok(problems) => {
            for problem in &problems {
                println!("warning: {}", problem);
            }
        }
        Err(e) => warn!(schedule_id = %id, "Could not validate saved schedule: {}", e),
    }
    Ok(())
}

async fn schedule_validate(engine: &Engine, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let problems = engine.validate_schedule(id).await?;
    if problems.is_empty() {
        println!("Schedule {} is valid.", id);
        return Ok(());
    }
    for problem in &problems {
        println!("{}", problem);
    }
    Err(format!("schedule {} has {} problem(s)", id, problems.len()).into())
}
