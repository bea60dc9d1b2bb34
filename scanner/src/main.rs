use loyalty_client_common::config::Config;
use loyalty_client_scanner::camera::mjpeg::NetworkCamera;
use loyalty_client_scanner::{decode, ChannelObserver, ScanEvent, ScanSession, ScanSettings};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .with_writer(std::io::stderr)
        .init();

    info!(
        camera = config.camera.url,
        mode = config.camera.mode,
        strategy = config.scan.strategy,
        interval_ms = config.scan.interval_ms,
        "starting loyalty-scan"
    );

    let camera = match NetworkCamera::from_config(&config.camera) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "invalid camera configuration");
            std::process::exit(1);
        }
    };
    let decoder = match decode::from_config(&config.scan, &config.decode) {
        Ok(d) => d,
        Err(e) => {
            error!(error = %e, "invalid decode configuration");
            std::process::exit(1);
        }
    };

    let (observer, mut events) = ChannelObserver::new();
    let session = ScanSession::new(
        Arc::new(camera),
        decoder,
        Arc::new(observer),
        ScanSettings::from_config(&config),
    );

    if let Err(e) = session.start().await {
        eprintln!("{e}\n{}", e.remediation());
        std::process::exit(1);
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(ScanEvent::Found { payload, method }) => {
                    let line = serde_json::json!({ "data": payload, "method": method });
                    println!("{line}");
                    break;
                }
                Some(ScanEvent::Error(e)) if e.is_fatal() => {
                    error!(error = %e, "scan failed");
                    eprintln!("{e}\n{}", e.remediation());
                    std::process::exit(1);
                }
                Some(ScanEvent::Error(e)) => warn!(error = %e, "transient scan error"),
                Some(ScanEvent::State(state)) => info!(?state, "scan state changed"),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                session.stop();
                std::process::exit(130);
            }
        }
    }
    session.stop();
}
