mod network;
mod view;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use scrawl_common::protocol::{ChatKind, ClientEvent, RoomMode, ServerEvent};

use crate::view::RoomView;

/// Scrawl Client - headless room participant for the scrawl server
#[derive(Parser, Debug)]
#[command(name = "scrawl-client", version, about)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:4000")]
    server: String,

    /// Room code to join (short uppercase, e.g. ABCD)
    #[arg(short, long)]
    room: String,

    /// Display name
    #[arg(short, long)]
    name: String,

    /// Room mode: professional or fun
    #[arg(short, long, default_value = "professional")]
    mode: String,

    /// Claim the host role for this room
    #[arg(long)]
    host: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scrawl_client=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mode = match args.mode.as_str() {
        "professional" => RoomMode::Professional,
        "fun" => RoomMode::Fun,
        other => anyhow::bail!("unknown mode '{}', expected professional or fun", other),
    };

    let (tx, mut rx) = network::connect(&args.server).await?;
    tx.send(ClientEvent::Hello {
        user_name: args.name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
    .await?;

    let mut room = RoomView::default();

    match rx.recv().await {
        Some(event @ ServerEvent::Welcome { .. }) => {
            room.apply(&event);
            tracing::info!(
                "connected as '{}' (id {:?}, color {:?})",
                args.name,
                room.my_id,
                room.my_color
            );
        }
        Some(ServerEvent::HandshakeError { reason }) => {
            anyhow::bail!("handshake rejected: {}", reason)
        }
        other => anyhow::bail!("unexpected handshake reply: {:?}", other),
    }

    tx.send(ClientEvent::JoinRoom {
        room_code: args.room.clone(),
        mode,
        is_host: args.host,
    })
    .await?;
    tracing::info!("joined room {} as {:?}", args.room, mode);

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else {
                    tracing::warn!("server closed the connection");
                    break;
                };
                report(&event, &room);
                room.apply(&event);
                tracing::debug!("{}", room.describe());
            }
            line = lines.next_line() => {
                match line? {
                    Some(line) => {
                        if !dispatch_line(&tx, &mut room, &args.name, line.trim()).await? {
                            break;
                        }
                    }
                    None => break, // stdin closed
                }
            }
        }
    }

    tx.send(ClientEvent::Disconnect).await.ok();
    Ok(())
}

/// Lines starting with '/' are commands; anything else is chat (and in a
/// fun-mode round, a guess).
async fn dispatch_line(
    tx: &mpsc::Sender<ClientEvent>,
    room: &mut RoomView,
    name: &str,
    line: &str,
) -> anyhow::Result<bool> {
    match line {
        "" => {}
        "/quit" => return Ok(false),
        "/start" => tx.send(ClientEvent::StartGame).await?,
        "/end" => tx.send(ClientEvent::EndGame).await?,
        "/lock" => tx.send(ClientEvent::SetLock { locked: true }).await?,
        "/unlock" => tx.send(ClientEvent::SetLock { locked: false }).await?,
        "/clear" => tx.send(ClientEvent::ClearCanvas).await?,
        message => {
            tx.send(ClientEvent::Chat {
                message: message.to_string(),
            })
            .await?;
            room.push_own_chat(name, message);
        }
    }
    Ok(true)
}

fn report(event: &ServerEvent, room: &RoomView) {
    match event {
        ServerEvent::UsersInRoom { users } => {
            let names: Vec<_> = users.iter().map(|u| u.user_name.as_str()).collect();
            tracing::info!("in room: {}", names.join(", "));
        }
        ServerEvent::MemberJoined { user } => tracing::info!("{} joined", user.user_name),
        ServerEvent::MemberLeft { user_name, .. } => tracing::info!("{} left", user_name),
        ServerEvent::ChatMessage {
            user_name,
            message,
            kind: ChatKind::User,
            ..
        } => tracing::info!("<{}> {}", user_name, message),
        ServerEvent::LockChanged { locked } => tracing::info!("drawing lock: {}", locked),
        ServerEvent::GameState(view) => match (&view.word, view.started) {
            (Some(word), true) => {
                tracing::info!("round {}: you are drawing '{}'", view.round, word)
            }
            (None, true) => tracing::info!("round {}: guess the word!", view.round),
            (Some(word), false) => {
                tracing::info!("round {} over, the word was '{}'", view.round, word)
            }
            (None, false) => tracing::info!("round {} over", view.round),
        },
        ServerEvent::CorrectGuess {
            user_name,
            word,
            points,
        } => tracing::info!("{} guessed '{}' (+{} points)", user_name, word, points),
        ServerEvent::RoundEnd { word, reason } => {
            tracing::info!("round over ({:?}), the word was '{}'", reason, word)
        }
        ServerEvent::GameEnded => tracing::info!("game ended"),
        ServerEvent::GameError { message } => tracing::warn!("game error: {}", message),
        ServerEvent::TimerUpdate { time_left } if time_left % 10 == 0 => {
            if room.game.is_some() {
                tracing::info!("{}s left", time_left);
            }
        }
        _ => {}
    }
}
