//! sky1090: a Mode S / ADS-B decoder fed by an external SDR tool.
//!
//! The SDR front-end runs as a child process emitting one hex frame per
//! line; frames are decoded, folded into the sky, and rendered either
//! per-message or as a live aircraft table.

#![allow(dead_code)]

mod aircraft;
mod config;
mod cpr;
mod crc;
mod decoder;
mod icao;
mod source;

use std::io::{self, Write};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::RwLock;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::aircraft::Sky;
use crate::config::Config;
use crate::decoder::Decoder;
use crate::source::RawFrame;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_args();

    // The interactive renderer owns the terminal; log only otherwise.
    if !config.interactive {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(Level::INFO)
            .finish();
        tracing::subscriber::set_global_default(subscriber).ok();
        info!("sky1090 starting");
    }

    let sky = Arc::new(RwLock::new(Sky::with_ttl(Duration::from_secs(
        config.interactive_ttl,
    ))));

    let (frame_tx, frame_rx): (Sender<RawFrame>, Receiver<RawFrame>) = bounded(1024);

    // Frames are decoded and folded into the sky on a dedicated thread;
    // the channel preserves arrival order.
    let processor = {
        let sky = Arc::clone(&sky);
        let config = config.clone();
        thread::spawn(move || process_frames(frame_rx, sky, config))
    };

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let prune_handle = {
            let sky = Arc::clone(&sky);
            tokio::spawn(async move {
                let mut tick = tokio::time::interval(Duration::from_secs(1));
                loop {
                    tick.tick().await;
                    sky.write().prune();
                }
            })
        };

        let display_handle = if config.interactive {
            let sky = Arc::clone(&sky);
            let config = config.clone();
            Some(tokio::spawn(async move {
                interactive_display(sky, config).await;
            }))
        } else {
            None
        };

        // Run the source until it drains or the user interrupts; either
        // way the sender drops and the decode thread winds down.
        tokio::select! {
            result = run_source(&config, frame_tx) => {
                if let Err(e) = result {
                    error!("frame source error: {}", e);
                    if !config.interactive && config.ifile.is_none() {
                        eprintln!("\nCould not run '{}'.", config.exec_path);
                        eprintln!("Install rtl-sdr, or replay a capture with --ifile.");
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, shutting down");
            }
        }

        prune_handle.abort();
        if let Some(handle) = display_handle {
            handle.abort();
        }
    });

    processor.join().ok();
    Ok(())
}

async fn run_source(config: &Config, tx: Sender<RawFrame>) -> io::Result<()> {
    match config.ifile {
        Some(ref path) => source::run_file(path, tx).await,
        None => source::run_exec(&config.exec_path, tx).await,
    }
}

/// Channel consumer: decode each frame, fold it into the sky, print it
/// in non-interactive mode. Exits when every sender is gone.
fn process_frames(rx: Receiver<RawFrame>, sky: Arc<RwLock<Sky>>, config: Config) {
    let decoder = Decoder::from_config(&config);

    while let Ok(frame) = rx.recv() {
        let mm = decoder.decode(&frame);

        sky.write().apply(&mm);

        if !config.interactive && (mm.crc_ok || !config.check_crc) {
            if config.raw {
                println!("{}", mm.to_raw_line());
            } else if config.onlyaddr {
                println!("{:06X}", mm.icao);
            } else {
                println!("{}", mm);
            }
        }
    }
}

async fn interactive_display(sky: Arc<RwLock<Sky>>, config: Config) {
    let refresh = Duration::from_millis(250);

    loop {
        tokio::time::sleep(refresh).await;
        render_sky(&sky, &config);
    }
}

fn render_sky(sky: &Arc<RwLock<Sky>>, config: &Config) {
    let (mut aircraft, count) = {
        let sky = sky.read();
        (sky.snapshot(), sky.count())
    };
    aircraft.sort_by(|a, b| b.seen.cmp(&a.seen));

    // Clear screen, cursor home.
    print!("\x1B[2J\x1B[H");

    println!(
        "\x1B[1m{:<6} {:<8} {:>9} {:>7} {:>10} {:>11} {:>5} {:>9} {:>6}\x1B[0m",
        "Hex", "Flight", "Altitude", "Speed", "Lat", "Lon", "Track", "Messages", "Seen"
    );
    println!("{}", "-".repeat(80));

    for ac in aircraft.iter().take(config.interactive_rows) {
        let (altitude, speed) = if config.metric {
            (
                (ac.altitude as f64 / 3.2808) as i32,
                (ac.speed as f64 * 1.852) as u16,
            )
        } else {
            (ac.altitude, ac.speed)
        };

        let alt_str = if altitude != 0 {
            altitude.to_string()
        } else {
            String::new()
        };
        let speed_str = if speed != 0 {
            speed.to_string()
        } else {
            String::new()
        };
        let track_str = if ac.track != 0 {
            ac.track.to_string()
        } else {
            String::new()
        };
        let (lat_str, lon_str) = match ac.position {
            Some((lat, lon)) => (format!("{:.4}", lat), format!("{:.4}", lon)),
            None => (String::new(), String::new()),
        };

        println!(
            "{:<6} {:<8} {:>9} {:>7} {:>10} {:>11} {:>5} {:>9} {:>5}s",
            ac.hex_addr,
            ac.callsign.trim_end(),
            alt_str,
            speed_str,
            lat_str,
            lon_str,
            track_str,
            ac.messages,
            ac.seen.elapsed().as_secs()
        );
    }

    println!("{}", "-".repeat(80));
    println!(
        "Aircraft: {} | {} mode | Press Ctrl+C to exit",
        count,
        if config.metric { "Metric" } else { "Imperial" }
    );

    io::stdout().flush().ok();
}
