use softphone_core::application::{HealthService, Softphone, SoftphoneHandle, SoftphoneRuntime};
use softphone_core::config::Config;
use softphone_core::infrastructure::probe::NetworkProbe;
use softphone_core::infrastructure::transport::LoopbackTransport;
use softphone_core::interface::events::EventBus;
use softphone_core::interface::metrics::describe_metrics;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "softphone.toml".to_string());
    let config = Config::load(&path)?;
    info!("Configuration loaded from {}", path);

    describe_metrics();

    let (transport, transport_events) = LoopbackTransport::new();
    let transport = Arc::new(transport);
    transport.auto_answer(true);

    let events = Arc::new(EventBus::default());
    let softphone = Softphone::new(transport.clone(), config.clone(), events);
    let (runtime, handle) = SoftphoneRuntime::new(softphone, transport_events);

    // Print every core event as a JSON line
    let mut rx = handle.subscribe_events();
    let printer = tokio::spawn(async move {
        while let Ok(envelope) = rx.recv().await {
            match serde_json::to_string(&envelope) {
                Ok(json) => println!("{}", json),
                Err(e) => warn!("Failed to encode event: {}", e),
            }
        }
    });

    let monitor = if config.connectivity.enabled {
        let probe = Arc::new(NetworkProbe::new(config.connectivity.probe_timeout())?);
        Some(HealthService::new(probe, config.connectivity.clone()).spawn(handle.inputs()))
    } else {
        None
    };

    let dispatch = runtime.spawn();

    tokio::select! {
        result = run_scenario(&handle, &transport) => {
            if let Err(e) = result {
                warn!("Scenario stopped: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    handle.shutdown().await?;
    dispatch.await?;
    if let Some(monitor) = monitor {
        monitor.abort();
    }
    printer.abort();

    info!("Softphone stopped");
    Ok(())
}

/// Register, watch a colleague, place a call, hold it, and transfer it away
async fn run_scenario(
    handle: &SoftphoneHandle,
    transport: &LoopbackTransport,
) -> anyhow::Result<()> {
    let pause = || tokio::time::sleep(Duration::from_millis(200));

    pause().await;
    handle.subscribe("101", Some("Reception".to_string())).await?;
    pause().await;
    transport.remote_notify("101", "confirmed", Some("sip:200@pbx.local"));

    let session = handle.dial("200").await?;
    pause().await;

    handle.toggle_hold(Some(session)).await?;
    pause().await;
    handle.toggle_hold(Some(session)).await?;
    handle.send_dtmf(Some(session), '5').await?;

    let record = handle.blind_transfer(Some(session), "300").await?;
    info!("Transfer {} {:?}", record.id, record.disposition);

    transport.remote_offer("555", Some("Front Desk"));
    pause().await;
    handle.answer(None).await?;
    pause().await;
    handle.hang_up(None).await?;
    pause().await;

    let snapshot = handle.snapshot().await?;
    info!(
        "Done: {} live sessions, {} transfers",
        snapshot.sessions.len(),
        snapshot.transfers.len()
    );
    Ok(())
}
