//! Raw authenticated API calls.
//!
//! These go through the same refresh-and-retry pipeline as the account
//! commands, so an expired access token is renewed transparently.

use anyhow::{Context, Result, bail};
use clap::{Args, Subcommand};
use serde_json::Value;

use campus_http::{ApiRequest, Method};

use crate::cli::ConnectionArgs;
use crate::output;
use crate::session::storage;

#[derive(Args, Debug)]
pub struct ApiCommand {
    #[command(subcommand)]
    pub command: ApiSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum ApiSubcommand {
    /// GET a path, e.g. `courses/modules/`
    Get(ReadArgs),

    /// POST a JSON body to a path
    Post(WriteArgs),

    /// PATCH a JSON body to a path
    Patch(WriteArgs),

    /// DELETE a path
    Delete(ReadArgs),
}

#[derive(Args, Debug)]
pub struct ReadArgs {
    /// Path relative to the API base URL
    pub path: String,

    /// Query parameter as key=value (repeatable)
    #[arg(short, long = "query", value_parser = parse_pair)]
    pub query: Vec<(String, String)>,
}

#[derive(Args, Debug)]
pub struct WriteArgs {
    #[command(flatten)]
    pub target: ReadArgs,

    /// JSON request body
    #[arg(short, long, default_value = "{}")]
    pub data: String,
}

pub async fn handle(cmd: ApiCommand, connection: &ConnectionArgs) -> Result<()> {
    let request = match cmd.command {
        ApiSubcommand::Get(args) => build(Method::GET, args, None)?,
        ApiSubcommand::Delete(args) => build(Method::DELETE, args, None)?,
        ApiSubcommand::Post(args) => build(Method::POST, args.target, Some(&args.data))?,
        ApiSubcommand::Patch(args) => build(Method::PATCH, args.target, Some(&args.data))?,
    };

    let client = storage::open_client(connection)?;
    let response = client
        .pipeline()
        .send(&request)
        .await
        .context("Request failed")?;

    if !response.is_success() {
        if !response.text().is_empty() {
            eprintln!("{}", response.text());
        }
        bail!(response.error());
    }

    let body: Value = response.json().context("Response is not JSON")?;
    if !body.is_null() {
        output::json_pretty(&body)?;
    }

    Ok(())
}

fn build(method: Method, args: ReadArgs, data: Option<&str>) -> Result<ApiRequest> {
    let mut request = ApiRequest::new(method, args.path);
    for (key, value) in args.query {
        request = request.query(key, value);
    }
    if let Some(data) = data {
        let body: Value = serde_json::from_str(data).context("--data is not valid JSON")?;
        request = request.json(&body)?;
    }
    Ok(request)
}

fn parse_pair(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", s))?;
    Ok((key.to_string(), value.to_string()))
}
