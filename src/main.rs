use anyhow::{Context, Result};
use tokio::sync::mpsc;

use ytmd_sync::format::format_time;
use ytmd_sync::{PlayerStore, Settings, SubscriberId};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Starting YTMD monitor");

    let store = ytmd_sync::init_store(Settings::from_env()).clone();

    let watcher = store.clone();
    store.subscribe(SubscriberId::next(), move || log_now_playing(&watcher));

    store
        .initialize()
        .context("Failed to connect to YouTube Music Desktop (is YTMD_API_KEY set?)")?;

    // Ctrl+C arrives on its own thread; hand it to the runtime.
    let (stop_tx, mut stop_rx) = mpsc::unbounded_channel();
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    })
    .context("Failed to set Ctrl+C handler")?;

    let mut connection = store.watch_connection();
    loop {
        tokio::select! {
            _ = stop_rx.recv() => {
                log::info!("Received interrupt signal (Ctrl+C), disconnecting...");
                break;
            }
            changed = connection.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *connection.borrow_and_update();
                log::info!("Connection state: {:?}", state);
            }
        }
    }

    store.disconnect();
    Ok(())
}

fn log_now_playing(store: &PlayerStore) {
    let model = store.snapshot();
    match model.track.as_ref() {
        Some(track) if store.should_display() => {
            log::info!(
                "{} {} - {} [{} / {}]",
                if model.is_playing { "▶" } else { "⏸" },
                track.name,
                track.primary_artist(),
                format_time(model.position_ms),
                format_time(model.duration_ms),
            );
        }
        _ => log::info!("Nothing playing"),
    }
}
