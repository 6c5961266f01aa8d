// ===============================
// src/recorder.rs
// ===============================
//
// JSONL journal:
// - setiap Event (action terkirim, hasilnya, snapshot akun) jadi satu baris
// - BufWriter, flush tiap 1s atau tiap 100 event
// - parent directory dibuat otomatis
// - tulis gagal -> reopen sekali, kalau masih gagal event di-drop
//
// ENV: `RECORD_FILE=/path/to/events.jsonl` (lihat main.rs).
//
use std::path::Path;

use chrono::Utc;
use tokio::{
    fs::{self, OpenOptions},
    io::{AsyncWriteExt, BufWriter},
    sync::mpsc,
    time::{interval, Duration, MissedTickBehavior},
};
use tracing::{error, info};

use crate::domain::Event;
use crate::error::{Error, Result};

const FLUSH_EVERY_N_EVENTS: u32 = 100;

/// Cheap handle for producers; dropping every clone stops the writer task.
#[derive(Clone, Debug)]
pub struct Journal {
    tx: Option<mpsc::Sender<Event>>,
}

impl Journal {
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn new(tx: mpsc::Sender<Event>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Never blocks the trading path; a full queue drops the event.
    pub fn record(&self, ev: Event) {
        if let Some(tx) = &self.tx {
            if tx.try_send(ev).is_err() {
                tracing::warn!("recorder: queue full or closed, event dropped");
            }
        }
    }

    pub fn note(&self, text: impl Into<String>) {
        self.record(Event::Note { ts_ms: Utc::now().timestamp_millis(), text: text.into() });
    }
}

async fn open_writer(path: &str) -> Result<BufWriter<fs::File>> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = fs::create_dir_all(parent).await {
                error!(?e, %path, "recorder: create_dir_all failed");
            }
        }
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| Error::Config(format!("recorder: open {path}: {e}")))?;
    Ok(BufWriter::new(file))
}

/// Opens the file up front so a bad path fails at startup, then returns the writer task.
pub async fn start(path: String) -> Result<(Journal, tokio::task::JoinHandle<()>)> {
    let writer = open_writer(&path).await?;
    let (tx, rx) = mpsc::channel(4096);
    let handle = tokio::spawn(run(rx, writer, path));
    Ok((Journal::new(tx), handle))
}

async fn write_line(writer: &mut BufWriter<fs::File>, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await
}

async fn run(mut rx: mpsc::Receiver<Event>, mut writer: BufWriter<fs::File>, path: String) {
    info!(%path, "recorder: started");

    let mut tick = interval(Duration::from_secs(1));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut since_last_flush: u32 = 0;

    loop {
        tokio::select! {
            maybe_ev = rx.recv() => {
                let Some(ev) = maybe_ev else {
                    let _ = writer.flush().await;
                    info!("recorder: channel closed, stopped");
                    break;
                };
                let line = match serde_json::to_string(&ev) {
                    Ok(s) => s,
                    Err(e) => {
                        error!(?e, "recorder: serialize error, skip event");
                        continue;
                    }
                };

                if let Err(e) = write_line(&mut writer, &line).await {
                    error!(?e, "recorder: write failed, attempting reopen");
                    match open_writer(&path).await {
                        Ok(w) => writer = w,
                        Err(e2) => {
                            error!(error = %e2, "recorder: reopen failed, drop event");
                            continue;
                        }
                    }
                    if let Err(e2) = write_line(&mut writer, &line).await {
                        error!(?e2, "recorder: write failed again after reopen, drop event");
                        continue;
                    }
                }

                since_last_flush += 1;
                if since_last_flush >= FLUSH_EVERY_N_EVENTS {
                    let _ = writer.flush().await;
                    since_last_flush = 0;
                }
            }

            _ = tick.tick() => {
                let _ = writer.flush().await;
                since_last_flush = 0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_one_json_object_per_line() {
        let dir = std::env::temp_dir().join(format!("hl_loop_rec_{}", rand::random::<u64>()));
        let path = dir.join("events.jsonl").to_string_lossy().to_string();

        let (journal, handle) = start(path.clone()).await.unwrap();
        journal.record(Event::ActionSent { ts_ms: 1, kind: "order".into(), nonce: 9 });
        journal.note("hello");
        drop(journal);
        handle.await.unwrap();

        let text = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event"], "action_sent");
        assert_eq!(first["nonce"], 9);
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[test]
    fn disabled_journal_is_a_noop() {
        Journal::disabled().note("ignored");
    }
}
