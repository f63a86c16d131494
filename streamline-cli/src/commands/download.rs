//! Download command - save a response body to the download directory.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use tracing::info;

use streamline_core::RequestDescriptor;

use crate::{Cli, OutputFormat};

/// Arguments for the download command.
#[derive(Args, Debug)]
pub struct DownloadArgs {
    /// Path relative to the base URL.
    pub path: String,

    /// File name to store the download under. Defaults to the last path
    /// segment.
    #[arg(long, short)]
    pub output: Option<String>,
}

#[derive(Debug, Serialize)]
struct DownloadOutput {
    path: String,
}

/// Runs the download command.
pub async fn run(args: &DownloadArgs, cli: &Cli) -> Result<()> {
    let service = crate::make_service(cli)?;
    let file_name = file_name_for(args);
    info!(path = %args.path, file = %file_name, "Downloading");

    let saved = service
        .download(&RequestDescriptor::get(args.path.as_str()), &file_name)
        .await?;

    match cli.format {
        OutputFormat::Text => println!("{}", saved.display()),
        OutputFormat::Json => {
            let output = DownloadOutput {
                path: saved.display().to_string(),
            };
            println!("{}", serde_json::to_string(&output)?);
        }
    }
    Ok(())
}

fn file_name_for(args: &DownloadArgs) -> String {
    args.output.clone().unwrap_or_else(|| {
        args.path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("download")
            .to_string()
    })
}
