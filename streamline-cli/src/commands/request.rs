//! Request command - send one call and print the JSON response.

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use streamline_core::{HttpMethod, RequestDescriptor};

use crate::{Cli, OutputFormat};

/// HTTP method argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum MethodArg {
    /// GET (never sends a body).
    #[default]
    Get,
    /// POST.
    Post,
    /// PUT.
    Put,
    /// DELETE.
    Delete,
}

impl From<MethodArg> for HttpMethod {
    fn from(method: MethodArg) -> Self {
        match method {
            MethodArg::Get => Self::Get,
            MethodArg::Post => Self::Post,
            MethodArg::Put => Self::Put,
            MethodArg::Delete => Self::Delete,
        }
    }
}

/// Arguments for the request command.
#[derive(Args, Debug)]
pub struct RequestArgs {
    /// Path relative to the base URL, e.g. "posts".
    pub path: String,

    /// HTTP method.
    #[arg(long, short = 'X', default_value = "get")]
    pub method: MethodArg,

    /// JSON body. Ignored for GET.
    #[arg(long, short)]
    pub data: Option<String>,

    /// Query parameter as key=value. Repeatable.
    #[arg(long = "query", short = 'Q', value_parser = parse_query)]
    pub query: Vec<(String, String)>,

    /// Path parameter appended after the path.
    #[arg(long)]
    pub param: Option<String>,
}

/// Runs the request command.
pub async fn run(args: &RequestArgs, cli: &Cli) -> Result<()> {
    let descriptor = build_descriptor(args)?;
    let service = crate::make_service(cli)?;

    info!(method = %descriptor.method(), path = %descriptor.full_path(), "Sending request");

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("Interrupted, cancelling request");
            on_interrupt.cancel();
        }
    });

    let value: Value = service.fetch_with_cancel(&descriptor, &cancel).await?;
    print_value(&value, cli)
}

/// Builds the descriptor described by the arguments.
pub fn build_descriptor(args: &RequestArgs) -> Result<RequestDescriptor> {
    let mut descriptor = RequestDescriptor::new(args.method.into(), args.path.as_str());

    if let Some(raw) = &args.data {
        let body: Value = serde_json::from_str(raw).context("--data is not valid JSON")?;
        descriptor = descriptor.with_json(body);
    }
    for (key, value) in &args.query {
        descriptor = descriptor.with_query(key.as_str(), value);
    }
    if let Some(param) = &args.param {
        descriptor = descriptor.with_path_param(param);
    }

    Ok(descriptor)
}

fn print_value(value: &Value, cli: &Cli) -> Result<()> {
    let output = match (cli.format, value) {
        (OutputFormat::Text, Value::String(s)) => s.clone(),
        (OutputFormat::Text, Value::Null) => String::new(),
        _ if cli.pretty => serde_json::to_string_pretty(value)?,
        _ => serde_json::to_string(value)?,
    };
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}

fn parse_query(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {raw:?}"))?;
    if key.is_empty() {
        return Err(format!("empty query key in {raw:?}"));
    }
    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(method: MethodArg) -> RequestArgs {
        RequestArgs {
            path: "posts".to_string(),
            method,
            data: None,
            query: Vec::new(),
            param: None,
        }
    }

    #[test]
    fn test_parse_query() {
        assert_eq!(
            parse_query("sortBy=title:ASC").unwrap(),
            ("sortBy".to_string(), "title:ASC".to_string())
        );
        assert_eq!(parse_query("search=").unwrap().1, "");
        assert!(parse_query("page").is_err());
        assert!(parse_query("=1").is_err());
    }

    #[test]
    fn test_build_descriptor() {
        let mut args = args(MethodArg::Put);
        args.data = Some(r#"{"title":"x"}"#.to_string());
        args.query = vec![("page".to_string(), "2".to_string())];
        args.param = Some("42".to_string());

        let descriptor = build_descriptor(&args).unwrap();
        assert_eq!(descriptor.method(), HttpMethod::Put);
        assert_eq!(descriptor.full_path(), "posts/42");
        assert_eq!(descriptor.body(), Some(&serde_json::json!({"title": "x"})));
        assert_eq!(descriptor.query().len(), 1);
    }

    #[test]
    fn test_build_descriptor_rejects_bad_json() {
        let mut args = args(MethodArg::Post);
        args.data = Some("{not json".to_string());
        assert!(build_descriptor(&args).is_err());
    }
}
