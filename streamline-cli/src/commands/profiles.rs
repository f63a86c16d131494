//! Profiles command - list session profiles.

use anyhow::Result;
use serde::Serialize;

use streamline_fetch::SessionProfile;

use crate::{Cli, OutputFormat};

/// JSON output for one profile.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProfileOutput {
    name: &'static str,
    foreground: bool,
    request_timeout_secs: u64,
    resource_timeout_secs: u64,
    waits_for_connectivity: bool,
    allows_cellular: bool,
}

impl From<SessionProfile> for ProfileOutput {
    fn from(profile: SessionProfile) -> Self {
        Self {
            name: profile.name(),
            foreground: profile.is_foreground(),
            request_timeout_secs: profile.request_timeout().as_secs(),
            resource_timeout_secs: profile.resource_timeout().as_secs(),
            waits_for_connectivity: profile.waits_for_connectivity(),
            allows_cellular: profile.allows_cellular(),
        }
    }
}

/// Runs the profiles command.
pub fn run(cli: &Cli) -> Result<()> {
    let profiles: Vec<ProfileOutput> = SessionProfile::ALL.into_iter().map(Into::into).collect();

    match cli.format {
        OutputFormat::Json => {
            let json = if cli.pretty {
                serde_json::to_string_pretty(&profiles)?
            } else {
                serde_json::to_string(&profiles)?
            };
            println!("{json}");
        }
        OutputFormat::Text => {
            println!("{:<40} {:>10} {:>12}  {}", "PROFILE", "REQUEST", "RESOURCE", "NOTES");
            for p in &profiles {
                let notes = match (p.foreground, p.allows_cellular) {
                    (true, _) => "fails fast when offline",
                    (false, true) => "waits for connectivity",
                    (false, false) => "waits for connectivity, no cellular",
                };
                println!(
                    "{:<40} {:>10} {:>12}  {}",
                    p.name,
                    format_secs(p.request_timeout_secs),
                    format_secs(p.resource_timeout_secs),
                    notes
                );
            }
        }
    }
    Ok(())
}

fn format_secs(secs: u64) -> String {
    match secs {
        s if s % 86_400 == 0 => format!("{}d", s / 86_400),
        s if s % 3_600 == 0 => format!("{}h", s / 3_600),
        s if s % 60 == 0 => format!("{}m", s / 60),
        s => format!("{s}s"),
    }
}
