//! Capture a finger image and upload it with progress

use std::time::Duration;

use fpsense::{ConfirmationCode, Sensor, SensorConfig, TransferEvent, TransferReceiver};
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> fpsense::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let port = std::env::var("SENSOR_PORT").unwrap_or_else(|_| "/dev/ttyUSB0".to_string());

    let sensor = Sensor::open(SensorConfig::new(port)).await?;
    sensor.ready().await?;
    sensor.handshake().await?;

    println!("Place your finger on the sensor...");
    loop {
        match sensor.gen_img().await {
            Ok(()) => break,
            Err(e) if e.confirmation_code() == Some(ConfirmationCode::NoFinger) => {
                sleep(Duration::from_millis(200)).await;
            }
            Err(e) => return Err(e),
        }
    }
    println!("✓ Image captured");

    let (observer, mut events) = TransferReceiver::channel();
    sensor.up_image(observer).await?;

    while let Some(event) = events.next().await {
        match event {
            TransferEvent::Progress(progress) => {
                print!("\rUploading... {:5.1}%", progress.percent());
            }
            TransferEvent::Received(image) => {
                println!("\n✓ Received {} bytes", image.len());
                let mean = image.iter().map(|&b| b as u64).sum::<u64>() / image.len().max(1) as u64;
                println!("  Mean intensity: {}", mean);
                break;
            }
            TransferEvent::Failed(e) => {
                println!();
                return Err(e.into());
            }
            TransferEvent::Sent => {}
        }
    }

    sensor.close().await?;
    Ok(())
}
