mod config;
mod error;
mod relay;
mod telegram_log;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::{AllowedUpdate, MessageReactionCountUpdated, MessageReactionUpdated};
use teloxide::update_listeners::Polling;
use teloxide::utils::command::BotCommands;
use tracing::{debug, error, info};
use tracing_subscriber::prelude::*;

use config::Config;
use relay::{Inbound, Ledger, ReactionChange, ReactionCountChange, Relay, TelegramClient, VoiceAttachment, VoiceStore};

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase")]
enum Command {
    /// Explain what the bot does.
    Start,
}

#[tokio::main]
async fn main() -> ExitCode {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = match Config::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("voice-relay: {:?} error: {e}", e.kind());
            return ExitCode::FAILURE;
        }
    };

    let bot = Bot::new(&config.telegram_bot_token);

    // Setup logging
    let log_dir = config.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let file_appender = tracing_appender::rolling::never(&log_dir, "voice-relay.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let registry = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        );

    if config.mirror_logs_to_admin {
        let admin_layer = telegram_log::AdminLogLayer::new(bot.clone(), config.admin_chat());
        registry.with(admin_layer).init();
    } else {
        registry.init();
    }

    info!("🚀 Starting voice-relay...");
    if let Some(ref path) = config_path {
        info!("Loaded config from {}", path.display());
    }
    info!("Admin ID: {}", config.admin_id);
    info!(
        "Voice limit {}s, forwarding at {} {}",
        config.max_voice_secs, config.like_threshold, config.like_emoji
    );

    let ledger = match Ledger::open(&config.ledger_path()) {
        Ok(ledger) => Arc::new(ledger),
        Err(e) => {
            error!("Failed to open ledger {:?}: {e}", config.ledger_path());
            return ExitCode::FAILURE;
        }
    };
    let store = match VoiceStore::open(&config.audio_dir).await {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to create audio folder {:?}: {e}", config.audio_dir);
            return ExitCode::FAILURE;
        }
    };
    info!("Saving voice messages to {:?}", store.dir());

    let telegram = Arc::new(TelegramClient::new(bot.clone(), ledger.clone()));
    let relay = Arc::new(Relay::new(Arc::new(config), telegram, ledger, store));

    let handler = dptree::entry()
        .branch(
            Update::filter_message()
                .branch(dptree::entry().filter_command::<Command>().endpoint(handle_command))
                .branch(dptree::filter(|msg: Message| msg.voice().is_some()).endpoint(handle_voice))
                .branch(dptree::filter(|msg: Message| msg.text().is_some()).endpoint(handle_text)),
        )
        .branch(Update::filter_message_reaction_updated().endpoint(handle_reaction))
        .branch(Update::filter_message_reaction_count_updated().endpoint(handle_reaction_count));

    let listener = Polling::builder(bot.clone())
        .allowed_updates(vec![
            AllowedUpdate::Message,
            AllowedUpdate::MessageReaction,
            AllowedUpdate::MessageReactionCount,
        ])
        .build();

    info!("Bot started, waiting for messages and reactions...");
    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![relay])
        .enable_ctrlc_handler()
        .build()
        .dispatch_with_listener(
            listener,
            LoggingErrorHandler::with_custom_text("An error from the update listener"),
        )
        .await;

    ExitCode::SUCCESS
}

async fn handle_command(msg: Message, cmd: Command, relay: Arc<Relay>) -> ResponseResult<()> {
    let Some(inbound) = Inbound::from_message(&msg) else {
        return Ok(());
    };
    match cmd {
        Command::Start => relay.handle_start(&inbound).await,
    }
    Ok(())
}

async fn handle_voice(msg: Message, relay: Arc<Relay>) -> ResponseResult<()> {
    let (Some(inbound), Some(voice)) = (Inbound::from_message(&msg), VoiceAttachment::from_message(&msg)) else {
        return Ok(());
    };
    relay.handle_voice(&inbound, &voice).await;
    Ok(())
}

async fn handle_text(msg: Message, relay: Arc<Relay>) -> ResponseResult<()> {
    let (Some(inbound), Some(text)) = (Inbound::from_message(&msg), msg.text()) else {
        return Ok(());
    };
    relay.handle_text(&inbound, text).await;
    Ok(())
}

async fn handle_reaction(update: MessageReactionUpdated, relay: Arc<Relay>) -> ResponseResult<()> {
    let change = ReactionChange::from_update(&update);
    let outcome = relay.handle_reaction(&change).await;
    debug!("Reaction on message {}: {:?}", change.message_id.0, outcome);
    Ok(())
}

async fn handle_reaction_count(update: MessageReactionCountUpdated, relay: Arc<Relay>) -> ResponseResult<()> {
    let change = ReactionCountChange::from_update(&update);
    let outcome = relay.handle_reaction_count(&change).await;
    debug!("Reaction count on message {}: {:?}", change.message_id.0, outcome);
    Ok(())
}
