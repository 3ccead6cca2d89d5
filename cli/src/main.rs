#![deny(clippy::all)]

mod args;
mod commands;
mod config;
mod proposal;
mod utils;

use anyhow::{anyhow, Context, Result};
use catalog_client::{Client, Config as ClientConfig, Token, DEFAULT_ENDPOINT};
use log::{error, warn};
use std::{fs, io, path::PathBuf, process};
use structopt::{clap::Shell as ClapShell, StructOpt};

use crate::{
    args::{Args, Command, Shell},
    commands::{config as config_command, publish},
    config::{ContextConfig, PublisherConfig},
    utils::io::{init_env_logger, read_token_from_stdin},
};

fn run(args: Args) -> Result<()> {
    let config_path = find_configuration(&args)?;
    let cli_config = config::read_publisher_config(&config_path)?;

    match &args.command {
        Command::Config { config_args } => {
            config_command::run(config_args, cli_config, config_path).map(|_| ())
        }
        Command::Completion { shell } => {
            let mut app = Args::clap();
            let clap_shell = match shell {
                Shell::Zsh => ClapShell::Zsh,
                Shell::Bash => ClapShell::Bash,
            };
            app.gen_completions_to("dpub", clap_shell, &mut io::stdout());
            Ok(())
        }
        Command::Publish { publish_args } => {
            let params = publish_params(&args, &cli_config, publish_args)?;
            let client = if publish_args.dry_run {
                None
            } else {
                Some(client_from_args(&args, &cli_config)?)
            };
            publish::run(publish_args, &params, client.as_ref())
        }
    }
}

fn current_context<'a>(
    args: &Args,
    config: &'a PublisherConfig,
) -> Result<Option<&'a ContextConfig>> {
    if let Some(context_name) = args.context.as_ref() {
        config
            .get_context(context_name)
            .map(Some)
            .ok_or_else(|| anyhow!("Unknown context `{}`.", context_name))
    } else {
        Ok(config.get_current_context())
    }
}

fn project_and_location(
    args: &Args,
    context: Option<&ContextConfig>,
) -> Result<(String, String)> {
    let project = args
        .project
        .clone()
        .or_else(|| context.and_then(|context| context.project.clone()))
        .ok_or_else(|| {
            anyhow!("No project configured. Pass --project or add one to the current context.")
        })?;
    let location = args
        .location
        .clone()
        .or_else(|| context.and_then(|context| context.location.clone()))
        .ok_or_else(|| {
            anyhow!("No location configured. Pass --location or add one to the current context.")
        })?;
    Ok((project, location))
}

fn publish_params(
    args: &Args,
    config: &PublisherConfig,
    publish_args: &publish::PublishArgs,
) -> Result<publish::Params> {
    let context = current_context(args, config)?;
    let (project, location) = project_and_location(args, context)?;
    let owner_email = publish_args
        .owner_email
        .clone()
        .or_else(|| context.and_then(|context| context.owner_email.clone()))
        .unwrap_or_else(|| publish::DEFAULT_OWNER_EMAIL.to_owned());
    let provenance_label = publish_args
        .provenance_label
        .clone()
        .unwrap_or_else(|| publish::DEFAULT_PROVENANCE_LABEL.to_owned());

    Ok(publish::Params {
        project,
        location,
        owner_email,
        provenance_label,
        poll: publish::Params::poll_config(publish_args),
    })
}

fn client_from_args(args: &Args, config: &PublisherConfig) -> Result<Client> {
    let context = current_context(args, config)?;

    let endpoint = args
        .endpoint
        .clone()
        .or_else(|| context.map(|context| context.endpoint.clone()))
        .unwrap_or_else(|| DEFAULT_ENDPOINT.clone());

    let args_or_config_token = args
        .token
        .clone()
        .or_else(|| context.and_then(|context| context.token.clone()));

    let token = Token(if let Some(token) = args_or_config_token {
        token
    } else {
        read_token_from_stdin()?.unwrap_or_default()
    });

    let (project, location) = project_and_location(args, context)?;

    let accept_invalid_certificates = args
        .accept_invalid_certificates
        .or_else(|| context.map(|context| context.accept_invalid_certificates))
        .unwrap_or(false);

    if accept_invalid_certificates {
        warn!(concat!(
            "TLS certificate verification is disabled. ",
            "Do NOT use this over an insecure network."
        ));
    }

    let proxy = args
        .proxy
        .clone()
        .or_else(|| context.and_then(|context| context.proxy.clone()));

    Client::new(ClientConfig {
        endpoint,
        token,
        project,
        location,
        accept_invalid_certificates,
        proxy,
    })
    .context("Failed to initialise the API client.")
}

fn find_configuration(args: &Args) -> Result<PathBuf> {
    let config_path = if let Some(config_path) = args.config.clone() {
        if !config_path.exists() {
            warn!(
                "Configuration file `{}` doesn't exist.",
                config_path.display()
            );
        }
        config_path
    } else {
        let mut config_path =
            dirs::config_dir().context("Could not get path to the user's config directory")?;
        config_path.push("dpub");
        fs::create_dir_all(&config_path).with_context(|| {
            format!(
                "Could not create config directory {}",
                config_path.display()
            )
        })?;
        config_path.push("contexts.json");
        config_path
    };
    Ok(config_path)
}

fn main() {
    let args = Args::from_args();
    init_env_logger(args.verbose);

    if let Err(error) = run(args) {
        error!("An error occurred:");
        for cause in error.chain() {
            error!(" |- {cause}");
        }
        process::exit(1);
    }
}
