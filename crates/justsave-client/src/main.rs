use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use justsave_client::config::gateway_url;
use justsave_client::memory::FileMemory;
use justsave_client::store::HttpRoomStore;
use justsave_client::transport::WsTransport;
use justsave_client::{ClientConfig, ViewState};

const HELP: &str = "commands: /room <id>, /clear, /retry, /leave, /quit; any other line is appended";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Logs go to stderr so they don't mix with the room view
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "justsave_client=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = ClientConfig::from_env()?;
    info!("Using server {}", config.server_url);

    let session = justsave_client::spawn(
        config.sync.clone(),
        HttpRoomStore::new(&config.server_url),
        WsTransport::new(gateway_url(&config.server_url)),
        FileMemory::new(&config.state_file),
    );

    if let Some(room_id) = std::env::args().nth(1) {
        session.set_room_id(room_id);
    }

    let mut views = session.subscribe();
    let printer = tokio::spawn(async move {
        render(&views.borrow_and_update().clone());
        while views.changed().await.is_ok() {
            let view = views.borrow_and_update().clone();
            render(&view);
        }
    });

    println!("{}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.split_once(' ').map_or((line.as_str(), ""), |(cmd, rest)| (cmd, rest)) {
            ("/room", id) => session.set_room_id(id),
            ("/clear", _) => session.clear(),
            ("/retry", _) => session.retry(),
            ("/leave", _) => session.detach(),
            ("/quit", _) => break,
            ("/help", _) => println!("{}", HELP),
            _ => {
                let view = session.view();
                if !view.phase.is_editable() {
                    println!("(not editable: {})", view.status_line());
                    continue;
                }
                let mut content = view.content;
                if !content.is_empty() {
                    content.push('\n');
                }
                content.push_str(&line);
                session.edit(content);
            }
        }
    }

    session.shutdown().await;
    printer.abort();
    Ok(())
}

fn render(view: &ViewState) {
    let room = view.room_id.as_deref().unwrap_or("-");
    let link = if view.connected { "live" } else { "offline" };
    println!("[{} | {} | {:?}] {}", room, link, view.phase, view.status_line());
    if let Some(error) = &view.error {
        println!("  error: {}", error);
    }
    if let Some(at) = view.last_modified {
        println!("  last modified {}", at.to_rfc3339());
    }
    if !view.content.is_empty() {
        for line in view.content.lines() {
            println!("  | {}", line);
        }
    }
}
