//! Live feed over a JSON-lines table.
//!
//! A background writer appends a burst of taps, a prophecy and a heartbeat
//! to a table in a temp dir. The feed tails the table, merges the burst
//! into one entry and prints each snapshot as it changes.
//!
//! Run with `RUST_LOG=livefeed=debug` to see the pipeline's decisions.

use livefeed::{AdminConfig, ConfigStore, Event, FeedPipeline, JsonlSource, JsonlTable};
use serde_json::json;
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let dir = tempfile::tempdir()?;
    let mut table = JsonlTable::open(dir.path())?;
    let source = JsonlSource::new(table.reader()).with_poll_interval(Duration::from_millis(100));

    let config = ConfigStore::new(AdminConfig {
        performance_throttling: true,
        max_events_per_second: 4.0,
        max_events: 10,
        ..AdminConfig::default()
    });
    let handle = FeedPipeline::new(source, config).spawn();

    let writer = thread::spawn(move || -> livefeed::Result<()> {
        for i in 0..6 {
            thread::sleep(Duration::from_millis(150));
            let tap = Event::new(format!("tap-{i}"), "tap_activity", json!({"earned": i + 1}))
                .with_actor("0xabc")
                .with_session("s1");
            table.insert(&tap.to_record())?;
        }
        let prophecy = Event::new("p-1", "oracle_prophecy", json!({"text": "Slaps ahead."}));
        table.insert(&prophecy.to_record())?;
        table.insert(&Event::new("hb-1", "heartbeat", json!({"ok": true})).to_record())?;
        Ok(())
    });

    let mut updates = handle.subscribe();
    let deadline = tokio::time::sleep(Duration::from_secs(4));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                println!("[{:?}] {} shown, {} queued", snapshot.status, snapshot.events.len(), snapshot.queued);
                for event in &snapshot.events {
                    if event.is_aggregated() {
                        println!("    {} x{} total {}", event.event_type, event.count(), event.total_earned());
                    } else {
                        println!("    {} ({})", event.event_type, event.id);
                    }
                }
            }
            _ = &mut deadline => break,
        }
    }

    writer.join().map_err(|_| "writer thread panicked")??;
    let stats = handle.snapshot().stats;
    println!("\nreceived {} merged {} filtered {}", stats.received, stats.merged, stats.filtered);
    handle.shutdown().await;
    Ok(())
}
