//! Handshake example
//!
//! Run with `SENSOR_PORT=/dev/ttyUSB0 RUST_LOG=fpsense=debug cargo run --example handshake`

use fpsense::{Sensor, SensorConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> fpsense::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let port = std::env::var("SENSOR_PORT").unwrap_or_else(|_| "/dev/ttyUSB0".to_string());

    println!("Opening {}...", port);

    let sensor = Sensor::open(SensorConfig::new(port)).await?;
    sensor.ready().await?;
    println!("✓ Ready");

    sensor.handshake().await?;
    println!("✓ Handshake OK");

    sensor.verify_password().await?;
    println!("✓ Password verified");

    let params = sensor.read_system_parameters().await?;
    println!("✓ {}", params);
    println!("  Status: {:?}", params.status);
    println!("  Templates stored: {}", sensor.template_count().await?);

    sensor.close().await?;
    println!("✓ Closed");

    Ok(())
}
