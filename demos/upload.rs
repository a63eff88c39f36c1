//! Upload - send a program to the first hub in range and run it.
//!
//! This example demonstrates:
//! - Connecting a session over BLE
//! - Uploading a program into a slot and starting it
//! - Printing console output from the running program
//!
//! # Running
//!
//! ```text
//! RUST_LOG=hublink=debug cargo run --example upload --features btleplug -- program.py 0
//! ```
//!
//! Press Ctrl-C to stop the program and disconnect.

use std::sync::Arc;

use hublink::transport::btle::BtleAdapter;
use hublink::{Message, ProgramUploader, Session, SessionConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut args = std::env::args().skip(1);
    let path = args.next().ok_or("usage: upload <program.py> [slot]")?;
    let slot: u8 = match args.next() {
        Some(slot) => slot.parse()?,
        None => 0,
    };
    let program = std::fs::read(&path)?;

    let config = match std::env::var("HUBLINK_CONFIG") {
        Ok(file) => SessionConfig::from_json(&std::fs::read_to_string(file)?)?,
        Err(_) => SessionConfig::default(),
    };

    let adapter = BtleAdapter::first().await?;
    let session = Session::new(config, Arc::new(adapter))?;
    session.connect().await?;

    if let Some(info) = session.device_info() {
        println!(
            "Connected: firmware {}.{}.{}, max chunk {} bytes",
            info.firmware_major, info.firmware_minor, info.firmware_build, info.max_chunk_size
        );
    }

    let mut events = session.subscribe_events();
    let uploader = ProgramUploader::new(session.clone());
    uploader.upload_and_run("program.py", slot, &program).await?;
    println!("Program started in slot {}", slot);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(Message::ConsoleNotification(console)) => print!("{}", console.text),
                Ok(Message::ProgramFlowNotification(flow)) if flow.stop => {
                    println!("Program finished");
                    break;
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    eprintln!("missed {} events", missed);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                uploader.stop_program(slot).await?;
                break;
            }
        }
    }

    session.disconnect().await?;
    Ok(())
}
