//! applink – command-line front-end for applink-server.

mod cli;
mod commands;
mod repl;

use clap::Parser;

use crate::cli::{Cli, Command};
use crate::commands::Context;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let ctx = Context::from_cli(&cli)?;
    match cli.command {
        Command::Generate { prompt, model, out } => {
            commands::generate(&ctx, &prompt.join(" "), &model, out.as_deref()).await
        }
        Command::Modify {
            file,
            prompt,
            model,
            in_place,
        } => commands::modify(&ctx, &file, &prompt.join(" "), model, in_place).await,
        Command::Save { id, file } => commands::save(&ctx, &id, &file).await,
        Command::Show { id } => commands::show(&ctx, &id).await,
        Command::Signin(args) => commands::sign_in(&ctx, args).await,
        Command::Signup(args) => commands::sign_up(&ctx, args).await,
        Command::Signout => commands::sign_out(&ctx),
        Command::Whoami { remote } => commands::whoami(&ctx, remote).await,
        Command::Models => {
            commands::models();
            Ok(())
        }
        Command::Studio { model, quiet_ms } => commands::studio(&ctx, &model, quiet_ms).await,
    }
}
