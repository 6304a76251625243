//! Register command implementation.

use anyhow::{Result, bail};
use clap::Args;
use colored::Colorize;

use campus_core::{Error, Registration};

use crate::cli::ConnectionArgs;
use crate::output;
use crate::session::storage;

#[derive(Args, Debug)]
pub struct RegisterArgs {
    /// Account email address
    #[arg(long)]
    pub email: String,

    /// Username
    #[arg(long)]
    pub username: String,

    /// Account password
    #[arg(long, env = "CAMPUS_PASSWORD", hide_env_values = true)]
    pub password: String,

    #[arg(long)]
    pub first_name: Option<String>,

    #[arg(long)]
    pub last_name: Option<String>,
}

pub async fn run(args: RegisterArgs, connection: &ConnectionArgs) -> Result<()> {
    let client = storage::open_client(connection)?;
    let registration = Registration::new(&args.email, &args.username, &args.password).with_name(
        args.first_name.unwrap_or_default(),
        args.last_name.unwrap_or_default(),
    );

    eprintln!("{}", "Creating account...".dimmed());

    let identity = match client.register(&registration).await {
        Ok(identity) => identity,
        Err(Error::Protocol(e)) if e.is_validation_error() => {
            for (field, message) in e.field_errors() {
                output::warning(&format!("{}: {}", field, message));
            }
            bail!("Registration rejected ({})", e.status);
        }
        Err(e) => return Err(anyhow::Error::new(e).context("Failed to register")),
    };

    output::success("Account created");
    println!();
    output::field("User", &identity.username);
    output::field("Email", &identity.email);

    Ok(())
}
