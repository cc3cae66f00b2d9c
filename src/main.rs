use anyhow::Result;
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use encyclo_cli::cli::commands::{self, define, keys, providers, read};
use encyclo_cli::cli::{Args, Command, KeysCommand, ProvidersCommand};
use encyclo_cli::config::ResolveOptions;
use encyclo_cli::credentials::CredentialStore;
use encyclo_cli::definition::print_languages;
use encyclo_cli::output::{self, OutputConfig};

fn init_tracing() {
    let filter = EnvFilter::try_from_env("ENCYCLO_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| "warn".into());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    output::init(OutputConfig::from_flags(args.quiet, args.no_color));
    init_tracing();

    let options = ResolveOptions {
        language: args.language.clone(),
        provider: args.provider.clone(),
    };

    match args.command {
        Some(Command::Languages) => print_languages(),
        Some(Command::Keys { command }) => {
            let credentials = CredentialStore::open_default();
            match command {
                KeysCommand::Set {
                    provider,
                    key,
                    secret,
                } => keys::run_set(&credentials, &provider, key, secret)?,
                KeysCommand::Clear { provider, yes } => {
                    keys::run_clear(&credentials, provider.as_deref(), yes)?;
                }
                KeysCommand::Show => keys::run_show(&credentials),
            }
        }
        Some(Command::Providers { command }) => {
            let credentials = CredentialStore::open_default();
            match command {
                None | Some(ProvidersCommand::List) => {
                    let config = commands::load_config(&options)?;
                    let active = config
                        .provider
                        .unwrap_or_else(|| credentials.selected_provider());
                    providers::print_providers(&credentials, active);
                }
                Some(ProvidersCommand::Select { provider }) => {
                    providers::run_select(&credentials, &provider)?;
                }
                Some(ProvidersCommand::Reset) => providers::run_reset(&credentials),
            }
        }
        Some(Command::Read) => {
            let config = commands::load_config(&options)?;
            read::run_read(&config).await?;
        }
        None => {
            let Some(topic) = args.topic else {
                Args::command().print_help()?;
                return Ok(());
            };
            let config = commands::load_config(&options)?;
            let options = define::DefineOptions {
                topic,
                category: args.category,
                context: args.context,
                context_file: args.context_file,
            };
            define::run_define(options, &config).await?;
        }
    }

    Ok(())
}
