use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use market_chat::config::AppConfig;
use market_chat::logging::{init_from_config, OperationTimer};
use market_chat::metrics::MetricsCollector;
use market_chat::notification::RecordingNotifier;
use market_chat::settings::{LocalSettings, SoundPreset};
use market_chat::{AuthState, ChatService, ChatStore, Database, ItemSummary, OpenRoomRequest};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a message about an item, creating the chat room if needed
    Send {
        /// Item id
        #[arg(long)]
        item: String,

        /// Item title, used as the notification title
        #[arg(long, default_value = "")]
        title: String,

        /// Seller user id
        #[arg(long)]
        seller: String,

        /// Seller display name
        #[arg(long, default_value = "Seller")]
        seller_name: String,

        /// Buyer user id
        #[arg(long)]
        buyer: String,

        /// Buyer display name
        #[arg(long, default_value = "Buyer")]
        buyer_name: String,

        /// Sending user id (seller or buyer)
        #[arg(long)]
        from: String,

        /// Message text
        #[arg(short, long)]
        text: String,
    },
    /// Show the messages of a chat room
    History {
        /// Room key
        #[arg(short, long)]
        room: String,
    },
    /// List the chat rooms of a user
    Rooms {
        /// User id
        #[arg(short, long)]
        user: String,
    },
    /// Listen for incoming messages as a signed-in user until Ctrl-C
    Watch {
        /// User id
        #[arg(short, long)]
        user: String,

        /// Treat this room as open on screen
        #[arg(long)]
        open_room: Option<String>,
    },
    /// Show or change local notification preferences
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Print the effective configuration
    Config,
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Show current preferences
    Show,
    /// Turn chat notifications on
    Enable,
    /// Turn chat notifications off
    Disable,
    /// Pick a notification sound (default, chime, bell)
    Sound { preset: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;

    let _log_guard = init_from_config(&config.logging, &config.get_log_level())?;

    if let Err(e) = MetricsCollector::init() {
        warn!("Metrics disabled: {}", e);
    }

    info!("Starting market-chat");

    let cli = Cli::parse();

    if matches!(cli.command, Commands::Config) {
        info!("Effective configuration:\n{}", config.to_yaml()?);
        return Ok(());
    }

    let store: Arc<dyn ChatStore> = Arc::new(
        Database::from_config(&config.store, &config.get_database_url()).context("Failed to open chat store")?,
    );
    let settings = Arc::new(
        LocalSettings::open(Path::new(&config.settings.path)).context("Failed to open local settings")?,
    );
    let notifier = Arc::new(RecordingNotifier::new());
    let service = ChatService::new(store, settings, notifier.clone(), &config.notifications);

    match cli.command {
        Commands::Send {
            item,
            title,
            seller,
            seller_name,
            buyer,
            buyer_name,
            from,
            text,
        } => {
            let request = OpenRoomRequest {
                item: ItemSummary {
                    id: item,
                    title,
                    image: None,
                },
                seller_id: seller,
                seller_name,
                buyer_id: buyer,
                buyer_name,
            };
            send(&service, &request, &from, &text).await?;
        },
        Commands::History { room } => history(&service, &room).await?,
        Commands::Rooms { user } => rooms(&service, &user).await?,
        Commands::Watch { user, open_room } => {
            watch(&service, &user, open_room.as_deref()).await?;
            info!("{} notification(s) scheduled", notifier.scheduled_count());
        },
        Commands::Settings { action } => update_settings(service.settings(), action)?,
        Commands::Config => {},
    }

    Ok(())
}

/// Resolve the room and send one message
async fn send(service: &ChatService, request: &OpenRoomRequest, from: &str, text: &str) -> Result<()> {
    let timer = OperationTimer::new("send");
    let room = service.resolve_room(request).await?;
    let message = service
        .send_message(&room.id, from, text)
        .await
        .context("Message send failed")?;
    info!("Sent message {} in room {}", message.id, room.id);
    timer.finish();
    Ok(())
}

/// Print the messages of a room, oldest first
async fn history(service: &ChatService, room_id: &str) -> Result<()> {
    let messages = service.store().messages(room_id).await?;
    if messages.is_empty() {
        warn!("No messages in room {}", room_id);
        return Ok(());
    }

    for message in messages {
        info!(
            "{}, {}, {}",
            message.sender_name,
            message.timestamp.format("%b %d, %Y %r"),
            message.text
        );
    }
    Ok(())
}

/// Print the rooms of a user with their unread state
async fn rooms(service: &ChatService, user_id: &str) -> Result<()> {
    let rooms = service.rooms_for_user(user_id).await?;
    info!("Found {} rooms", rooms.len());

    for room in &rooms {
        let unread = room.role_of(user_id).is_some_and(|role| !room.read_flag(role));
        info!(
            "{} [{}] {}: {}{}",
            room.id,
            room.item.title,
            room.last_message_sender.as_deref().unwrap_or("-"),
            room.last_message,
            if unread { " (unread)" } else { "" }
        );
    }

    info!("{} room(s) with unread messages", service.unread_room_count(user_id).await?);
    Ok(())
}

/// Run the global listener until interrupted
async fn watch(service: &ChatService, user_id: &str, open_room: Option<&str>) -> Result<()> {
    let _viewing = open_room.map(|room| service.viewing().enter(room));

    service.on_auth_state(&AuthState::SignedIn(user_id.to_string()))?;
    info!("Watching chat rooms of {}; press Ctrl-C to stop", user_id);

    tokio::signal::ctrl_c().await?;

    service.on_auth_state(&AuthState::SignedOut)?;
    Ok(())
}

fn update_settings(settings: &LocalSettings, action: SettingsAction) -> Result<()> {
    let preferences = match action {
        SettingsAction::Show => settings.load()?,
        SettingsAction::Enable => settings.set_enabled(true)?,
        SettingsAction::Disable => settings.set_enabled(false)?,
        SettingsAction::Sound { preset } => settings.set_sound(preset.parse::<SoundPreset>()?)?,
    };

    info!(
        "Chat notifications {}; sound {} ({}, channel {})",
        if preferences.enabled { "enabled" } else { "disabled" },
        preferences.sound,
        preferences.sound.file(),
        preferences.sound.channel()
    );
    Ok(())
}
