use chat_stream_client::cli::{print_completions, Args};
use chat_stream_client::driver::{HttpDriver, UiUpdate, UserCommand, WsDriver};
use chat_stream_client::http::HttpFallback;
use chat_stream_client::{ChatClient, ConnectionState, Role, TranscriptChange, TranscriptEntry};
use clap::Parser;
use colored::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Printing
// ---------------------------------------------------------------------------

fn print_entry(entry: &TranscriptEntry) {
    let header = match (entry.role, entry.is_error) {
        (_, true) => format!("{}:", entry.role).bright_red().bold(),
        (Role::User, _) => format!("{}:", entry.role).bright_cyan().bold(),
        (Role::Assistant, _) => format!("{}:", entry.role).bright_green().bold(),
    };
    if entry.in_progress {
        println!("{} {}", header, entry.rendered.dimmed());
    } else if entry.is_error {
        println!("{} {}", header, entry.rendered.bright_red());
    } else {
        println!("{} {}", header, entry.rendered);
    }
}

fn print_update(update: &UiUpdate) {
    match update {
        UiUpdate::Transcript(TranscriptChange::Appended(entry)) => {
            // User entries were typed on this terminal already.
            if entry.role == Role::Assistant || entry.content.starts_with("Selected File:") {
                print_entry(entry);
            }
        }
        // In-progress updates are not echoed; the final text is.
        UiUpdate::Transcript(TranscriptChange::Updated(entry)) if !entry.in_progress => {
            print_entry(entry)
        }
        UiUpdate::Transcript(TranscriptChange::Updated(_)) => {}
        UiUpdate::Transcript(TranscriptChange::Discarded(_)) => {
            println!("{}", "(response abandoned)".dimmed());
        }
        UiUpdate::Status {
            state,
            attempts,
            awaiting_manual,
        } => {
            let label = match state {
                ConnectionState::Connected => state.to_string().bright_green(),
                ConnectionState::Connecting => state.to_string().bright_yellow(),
                ConnectionState::Disconnected | ConnectionState::Error => {
                    state.to_string().bright_red()
                }
            };
            if *awaiting_manual {
                println!("[{}] retries exhausted, type /reconnect", label);
            } else if *attempts > 0 && *state != ConnectionState::Connected {
                println!("[{}] retry {}", label, attempts);
            } else {
                println!("[{}]", label);
            }
        }
        UiUpdate::Notice(text) => println!("{}", text.bright_yellow()),
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if let Some(shell) = args.completions {
        print_completions(shell, &mut std::io::stdout());
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("chat_stream_client=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = args.load_config()?;
    let client = ChatClient::from_config(&config);

    println!(
        "{} session {}",
        "chat-stream-client".bright_magenta().bold(),
        client.session().to_string().dimmed()
    );
    println!(
        "{}",
        "commands: /attach <path>, /reconnect, /disconnect, /connect, /quit".dimmed()
    );

    let (cmd_tx, cmd_rx) = mpsc::channel::<UserCommand>(32);
    let (ui_tx, mut ui_rx) = mpsc::unbounded_channel::<UiUpdate>();

    tokio::spawn(async move {
        let mut lines = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());
        while let Some(Ok(line)) = lines.next().await {
            let Some(cmd) = UserCommand::parse(&line) else {
                continue;
            };
            let quit = cmd == UserCommand::Quit;
            if cmd_tx.send(cmd).await.is_err() || quit {
                return;
            }
        }
        let _ = cmd_tx.send(UserCommand::Quit).await;
    });

    let printer = tokio::spawn(async move {
        while let Some(update) = ui_rx.recv().await {
            print_update(&update);
        }
    });

    match (args.http, config.http_endpoint.clone()) {
        (true, Some(endpoint)) => {
            let http = HttpFallback::new(endpoint, config.reveal.clone());
            HttpDriver::new(http, client, ui_tx).run(cmd_rx).await;
        }
        _ => {
            WsDriver::new(config.endpoint.clone(), client, ui_tx)
                .run(cmd_rx)
                .await;
        }
    }

    let _ = printer.await;
    Ok(())
}
