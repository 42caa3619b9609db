//! Module and job subcommand handlers.

use serde_json::{Map, Value};
use tracing::info;

use netsweep_core::Engine;
use netsweep_protocols::JobStatus;

use crate::cli::{JobAction, ModulesAction, OutputFormat};

/// Handle module subcommands.
pub(crate) async fn handle_modules_command(
    engine: &Engine,
    action: ModulesAction,
) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ModulesAction::List { format } => modules_list(engine, format).await,
    }
}

/// Handle job subcommands.
pub(crate) async fn handle_job_command(
    engine: &Engine,
    action: JobAction,
) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        JobAction::Run {
            module_id,
            params,
            site,
            lines,
        } => job_run(engine, &module_id, &params, site, lines).await,
        JobAction::Log {
            job_id,
            lines,
            delete,
        } => {
            let tail = engine.job_log(&job_id, delete, lines).await?;
            print!("{}", tail);
            Ok(())
        }
    }
}

async fn modules_list(engine: &Engine, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let modules = engine.list_modules().await?;
    if modules.is_empty() {
        println!("No modules found in {}.", engine.paths().modules_dir.display());
        return Ok(());
    }

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&modules)?),
        OutputFormat::Table => {
            println!("{:<28} {:<10} {}", "ID", "VERSION", "REQUIRED INPUTS");
            println!("{}", "-".repeat(72));
            for module in &modules {
                let required: Vec<&str> = module.required_inputs().map(|i| i.name.as_str()).collect();
                println!(
                    "{:<28} {:<10} {}",
                    module.id,
                    module.version.as_deref().unwrap_or("-"),
                    if required.is_empty() { "-".to_string() } else { required.join(", ") }
                );
            }
        }
    }
    Ok(())
}

/// Submit one job, wait for it, print its record and log tail.
async fn job_run(
    engine: &Engine,
    module_id: &str,
    params: &str,
    site: Option<String>,
    lines: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let parameters = match serde_json::from_str::<Value>(params)? {
        Value::Object(map) => map,
        _ => return Err("--params must be a JSON object".into()),
    };

    let mut config = Map::new();
    if let Some(site) = site {
        config.insert("site_name".to_string(), Value::String(site));
    }
    config.insert("parameters".to_string(), Value::Object(parameters));

    let job_id = engine.submit_job(module_id, config).await?;
    info!(job_id = %job_id, "Waiting for job");
    let record = engine.wait_for_job(&job_id).await?;

    println!("{}", serde_json::to_string_pretty(&record)?);
    if let Ok(tail) = engine.job_log(&job_id, false, lines).await {
        println!("--- log ---");
        print!("{}", tail);
    }

    if record.status != JobStatus::Completed {
        return Err(format!("job {} finished with status {}", job_id, record.status).into());
    }
    Ok(())
}
