//! Login command implementation.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use campus_core::Credentials;

use crate::cli::ConnectionArgs;
use crate::output;
use crate::session::storage;

#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Account email address
    #[arg(long)]
    pub email: String,

    /// Account password
    #[arg(long, env = "CAMPUS_PASSWORD", hide_env_values = true)]
    pub password: String,
}

pub async fn run(args: LoginArgs, connection: &ConnectionArgs) -> Result<()> {
    let client = storage::open_client(connection)?;
    let credentials = Credentials::new(&args.email, &args.password);

    eprintln!("{}", "Logging in...".dimmed());

    let identity = client
        .login(&credentials)
        .await
        .context("Failed to login")?;

    output::success("Logged in successfully");
    println!();
    output::field("User", &identity.username);
    output::field("Email", &identity.email);
    output::field("API", client.config().api_url.as_str());

    Ok(())
}
