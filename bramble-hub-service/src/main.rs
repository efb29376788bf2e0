//! Bramble hub service: reads framed messages from the LoRa radio
//! co-processor over serial, runs them through address management,
//! forwarding, and statistics, and writes responses back.

mod config;
mod dispatch;
mod transport;

use anyhow::{Context, Result};
use config::Config;
use dispatch::HubState;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio_serial::SerialPortBuilderExt;
use tracing::{error, info, warn};
use transport::SerialSink;

fn now_s() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs()
}

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_millis() as u64
}

enum Event {
    Frame { raw: Vec<u8>, rssi_dbm: i16, snr_db: i16 },
    Sweep,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = Config::from_env();
    info!(port = %config.serial_port, baud = config.baud_rate, "bramble hub service starting");

    let port = tokio_serial::new(&config.serial_port, config.baud_rate)
        .open_native_async()
        .with_context(|| format!("failed to open serial port {}", config.serial_port))?;
    let (mut reader, writer) = tokio::io::split(port);

    let (write_tx, write_rx) = mpsc::unbounded_channel();
    let writer_handle = tokio::spawn(transport::run_writer(writer, write_rx));

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();

    let reader_tx = event_tx.clone();
    let reader_handle = tokio::spawn(async move {
        loop {
            match transport::read_frame(&mut reader).await {
                Ok((raw, rssi_dbm, snr_db)) => {
                    if reader_tx.send(Event::Frame { raw, rssi_dbm, snr_db }).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    error!(?err, "serial read failed, ending reader task");
                    break;
                }
            }
        }
    });

    let sweep_tx = event_tx;
    let sweep_interval = config.sweep_interval;
    let sweep_handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        loop {
            ticker.tick().await;
            if sweep_tx.send(Event::Sweep).is_err() {
                break;
            }
        }
    });

    let mut state = HubState::new(SerialSink::new(write_tx));

    info!("hub service running, press Ctrl+C to stop");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("received Ctrl+C, shutting down");
                break;
            }
            event = event_rx.recv() => {
                match event {
                    Some(Event::Frame { raw, rssi_dbm, snr_db }) => {
                        if let Some(response) = dispatch::handle_frame(&mut state, &raw, rssi_dbm, snr_db, now_s(), now_ms()) {
                            // The response frame's own header already carries its
                            // destination (bytes 6..8, §3 header layout); `send_frame`'s
                            // `dst` only feeds logging.
                            let dst = bramble_protocol::Address::from_u16(u16::from_le_bytes([response[6], response[7]]));
                            let _ = state.router.sink_mut().send_frame(dst, &response);
                        }
                    }
                    Some(Event::Sweep) => {
                        state.run_sweep(now_s(), now_ms(), config.inactive_timeout_s, config.deregister_timeout_s);
                    }
                    None => {
                        warn!("event channel closed, shutting down");
                        break;
                    }
                }
            }
        }
    }

    reader_handle.abort();
    sweep_handle.abort();
    drop(writer_handle);

    info!("bramble hub service stopped");
    Ok(())
}
