use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use client_core::{HttpLinkBackend, LinkClient, LinkError};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod render;
mod widget;

use commands::{Command, HELP};
use widget::{Console, PromptWidget};

#[derive(Parser, Debug)]
#[command(about = "Interactive driver for the account-link flow")]
struct Args {
    /// Backend base URL; overrides link.toml and the environment.
    #[arg(long)]
    api_url: Option<String>,
    /// Settings file (defaults to ./link.toml when present).
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    log_filter: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut settings = config::load_settings(args.config.as_deref())?;
    if let Some(api_url) = args.api_url {
        config::validate_api_url(&api_url)?;
        settings.api_url = api_url;
    }
    if let Some(filter) = args.log_filter {
        settings.log_filter = filter;
    }

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_filter))
        .with_context(|| format!("invalid log filter '{}'", settings.log_filter))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let backend = HttpLinkBackend::new(&settings.api_url)
        .with_context(|| format!("failed to set up backend client for {}", settings.api_url))?;
    let client = LinkClient::new(Arc::new(backend));
    info!("link_cli: started api_url={}", settings.api_url);

    let console = Console::stdin();
    let widget = PromptWidget::new(console.clone());
    println!("{HELP}");

    while let Some(line) = console
        .prompt("link> ")
        .await
        .context("failed to read command")?
    {
        if line.is_empty() {
            continue;
        }
        let command = match Command::parse(&line) {
            Ok(command) => command,
            Err(message) => {
                println!("{message}");
                continue;
            }
        };
        if command == Command::Quit {
            break;
        }
        if let Err(err) = run_command(&client, &widget, command).await {
            report(&err);
        }
    }
    Ok(())
}

async fn run_command(
    client: &LinkClient,
    widget: &PromptWidget,
    command: Command,
) -> Result<(), LinkError> {
    match command {
        Command::User(input) => {
            let user = client.resolve_user(&input).await?;
            println!("active user {} ({})", user.id, user.username);
        }
        Command::Select(user_id) => {
            let user = client.select_user(user_id).await?;
            println!("active user {} ({})", user.id, user.username);
        }
        Command::Users => {
            let state = client.snapshot().await;
            let active = state.active_user().map(|user| user.id);
            if state.session.known_users().is_empty() {
                println!("no users yet");
            }
            for user in state.session.known_users() {
                println!("{}", render::user_line(user, active));
            }
        }
        Command::Mode(mode) => {
            client.set_mode(mode).await?;
            println!("mode {mode:?}");
        }
        Command::Item(item_id) => {
            client.select_item(item_id.clone()).await?;
            println!("update target {item_id}");
        }
        Command::Token => {
            let token = client.request_link_token().await?;
            println!("link token {}", token.preview());
        }
        Command::Open => open_widget(client, widget).await?,
        Command::Link => {
            client.request_link_token().await?;
            open_widget(client, widget).await?;
        }
        Command::Items => {
            let state = client.snapshot().await;
            if state.items.is_empty() {
                println!("no linked items");
            }
            for item in state.items.list_items() {
                println!("{}", render::item_block(item));
            }
        }
        Command::Load => {
            let added = client.load_user_items().await?;
            println!("registered {} new item(s)", added.len());
            for item in &added {
                println!("{}", render::item_block(item));
            }
        }
        Command::Accounts(item_id) => {
            let accounts = client.refresh_item_accounts(&item_id).await?;
            if accounts.is_empty() {
                println!("no accounts");
            }
            for account in &accounts {
                println!("{}", render::account_line(account));
            }
        }
        Command::Transactions => {
            let transactions = client.fetch_transactions().await?;
            println!("{}", render::transactions_table(&transactions));
        }
        Command::Reset => {
            client.reset().await;
            println!("link flow reset");
        }
        Command::State => match serde_json::to_string_pretty(&client.snapshot().await) {
            Ok(json) => println!("{json}"),
            Err(err) => println!("failed to encode state: {err}"),
        },
        Command::Help => println!("{HELP}"),
        Command::Quit => {}
    }
    Ok(())
}

async fn open_widget(client: &LinkClient, widget: &PromptWidget) -> Result<(), LinkError> {
    match client.run_widget(widget).await? {
        Some(item) => {
            println!("linked");
            println!("{}", render::item_block(&item));
        }
        None => println!("link cancelled"),
    }
    Ok(())
}

fn report(err: &LinkError) {
    if err.is_precondition() {
        println!("{err}");
    } else {
        println!("error: {err}");
    }
}
