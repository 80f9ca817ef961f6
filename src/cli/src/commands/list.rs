//! `tedge-oscar flows instances list` command.

use std::path::Path;

use clap::Args;
use oscar_core::config::DEFAULT_MAPPER;
use oscar_runtime::flow::{InstanceRegistry, InstanceSummary, SUMMARY_COLUMNS};

use crate::output::{render_rows, OutputFormat};

#[derive(Args)]
pub struct ListArgs {
    /// Mapper associated with the flows
    #[arg(long, default_value = DEFAULT_MAPPER)]
    pub mapper: String,

    /// Output format (default: table on a terminal, jsonl otherwise)
    #[arg(short, long, value_enum)]
    pub output: Option<OutputFormat>,

    /// Comma separated list of columns to display (e.g. name,image,imageVersion)
    #[arg(long, value_delimiter = ',')]
    pub select: Vec<String>,
}

pub async fn execute(args: ListArgs, config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let deploy_dir = config.deploy_dir(&args.mapper)?;
    let registry = InstanceRegistry::new(deploy_dir, config.display_deploy_dir(&args.mapper));

    let columns = select_columns(&args.select)?;
    let mut summaries: Vec<InstanceSummary> = registry.list()?.collect();
    if summaries.is_empty() {
        eprintln!("No flow instances are currently deployed.");
        return Ok(());
    }
    summaries.sort_by(|a, b| a.name.cmp(&b.name));

    let rows = to_rows(&summaries, &columns);
    let format = args.output.unwrap_or_else(OutputFormat::detect);
    print!("{}", render_rows(&columns, &rows, format));
    Ok(())
}

/// Validate `--select`, defaulting to every column.
fn select_columns(select: &[String]) -> Result<Vec<&'static str>, String> {
    let requested: Vec<&str> = select
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    if requested.is_empty() {
        return Ok(SUMMARY_COLUMNS.to_vec());
    }

    requested
        .into_iter()
        .map(|name| {
            SUMMARY_COLUMNS
                .iter()
                .find(|c| **c == name)
                .copied()
                .ok_or_else(|| {
                    format!(
                        "Unknown column '{}' (available: {})",
                        name,
                        SUMMARY_COLUMNS.join(",")
                    )
                })
        })
        .collect()
}

fn to_rows(summaries: &[InstanceSummary], columns: &[&str]) -> Vec<Vec<String>> {
    summaries
        .iter()
        .map(|s| {
            columns
                .iter()
                .map(|c| s.column(c).unwrap_or_default().to_string())
                .collect()
        })
        .collect()
}
