//! Account and session subcommands.

mod change_password;
mod login;
mod logout;
mod refresh_token;
mod register;
mod stats;
mod update_profile;
mod whoami;

use anyhow::Result;
use clap::{Args, Subcommand};

use crate::cli::ConnectionArgs;

#[derive(Args, Debug)]
pub struct AuthCommand {
    #[command(subcommand)]
    pub command: AuthSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum AuthSubcommand {
    /// Sign in with email and password
    Login(login::LoginArgs),

    /// Create an account and sign in
    Register(register::RegisterArgs),

    /// Sign out and discard stored credentials
    Logout(logout::LogoutArgs),

    /// Display the signed-in user
    Whoami(whoami::WhoamiArgs),

    /// Refresh the access token
    RefreshToken(refresh_token::RefreshTokenArgs),

    /// Update profile fields
    UpdateProfile(update_profile::UpdateProfileArgs),

    /// Change the account password
    ChangePassword(change_password::ChangePasswordArgs),

    /// Show learning statistics
    Stats(stats::StatsArgs),

    /// Show unlocked achievements
    Achievements(stats::AchievementsArgs),
}

pub async fn handle(cmd: AuthCommand, connection: &ConnectionArgs) -> Result<()> {
    match cmd.command {
        AuthSubcommand::Login(args) => login::run(args, connection).await,
        AuthSubcommand::Register(args) => register::run(args, connection).await,
        AuthSubcommand::Logout(args) => logout::run(args, connection).await,
        AuthSubcommand::Whoami(args) => whoami::run(args, connection).await,
        AuthSubcommand::RefreshToken(args) => refresh_token::run(args, connection).await,
        AuthSubcommand::UpdateProfile(args) => update_profile::run(args, connection).await,
        AuthSubcommand::ChangePassword(args) => change_password::run(args, connection).await,
        AuthSubcommand::Stats(args) => stats::run_stats(args, connection).await,
        AuthSubcommand::Achievements(args) => stats::run_achievements(args, connection).await,
    }
}
