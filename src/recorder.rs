// ===============================
// src/recorder.rs
// ===============================
//
// JSONL event journal:
// - Tulis setiap Event (trade, liquidity, candle sealed, peg) ke file .jsonl (append).
// - BufWriter, flush tiap 1s dan/atau tiap 1000 event, flush saat channel ditutup.
// - Parent directory dibuat otomatis.
// - Kalau file tidak bisa dibuka, journal mati (pool tetap jalan).
//
// ENV: set `RECORD_FILE=/path/to/events.jsonl` agar aktif (lihat main.rs).
// Ini audit trail saja; state tidak pernah di-restore dari file ini.
//
use std::path::Path;
use tokio::{
    fs::{self, File, OpenOptions},
    io::{AsyncWriteExt, BufWriter},
    sync::mpsc,
    time::{interval, Duration, MissedTickBehavior},
};
use tracing::{error, info};

use crate::domain::Event;

const FLUSH_EVERY_N_EVENTS: u32 = 1000;

async fn open_writer(path: &str) -> std::io::Result<BufWriter<File>> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    let file = OpenOptions::new().create(true).append(true).open(path).await?;
    Ok(BufWriter::new(file))
}

async fn write_line(writer: &mut BufWriter<File>, ev: &Event) -> std::io::Result<()> {
    let mut line = serde_json::to_vec(ev)?;
    line.push(b'\n');
    writer.write_all(&line).await
}

pub async fn run(mut rx: mpsc::Receiver<Event>, path: String) {
    let mut writer = match open_writer(&path).await {
        Ok(w) => w,
        Err(e) => {
            error!(?e, %path, "recorder: open failed, journal disabled");
            return;
        }
    };
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
                if let Err(e) = write_line(&mut writer, &ev).await {
                    error!(?e, "recorder: write failed, attempting reopen");
                    match open_writer(&path).await {
                        Ok(w) => writer = w,
                        Err(e2) => {
                            error!(?e2, "recorder: reopen failed, journal disabled");
                            break;
                        }
                    }
                    if let Err(e3) = write_line(&mut writer, &ev).await {
                        error!(?e3, "recorder: write failed again after reopen, drop event");
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
    use crate::domain::{Candle, PegChange};

    #[tokio::test]
    async fn writes_one_json_line_per_event_and_flushes_on_close() {
        let dir = std::env::temp_dir().join(format!("amm_sim_rec_{}", std::process::id()));
        let path = dir.join("nested").join("events.jsonl");
        let path_str = path.to_string_lossy().to_string();
        let (tx, rx) = mpsc::channel(16);
        let handle = tokio::spawn(run(rx, path_str));

        let candle = Candle { bucket_start: 60, open: 1.0, high: 1.0, low: 1.0, close: 1.0, volume: 0.0 };
        tx.send(Event::CandleSealed(candle)).await.unwrap();
        tx.send(Event::Peg(PegChange::Armed { target: 1.5 })).await.unwrap();
        drop(tx);
        handle.await.unwrap();

        let text = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["CandleSealed"]["time"], 60);
        let second: Event = serde_json::from_str(lines[1]).unwrap();
        assert!(matches!(second, Event::Peg(PegChange::Armed { target }) if target == 1.5));

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
