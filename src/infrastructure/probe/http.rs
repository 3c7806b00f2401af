//! Network reachability probe
//!
//! Internet targets are checked with an HTTP `HEAD`; any response counts as
//! reachable. Signaling targets are checked with a WebSocket handshake that
//! offers the `sip` subprotocol and is closed straight away.

use crate::domain::connection::{ConnectivityProbe, ProbeClass, ProbeError};
use async_trait::async_trait;
use std::time::Duration;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tracing::debug;
use url::Url;

pub struct NetworkProbe {
    client: reqwest::Client,
}

impl NetworkProbe {
    pub fn new(timeout: Duration) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProbeError::Unreachable(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    async fn check_http(&self, target: &Url) -> Result<(), ProbeError> {
        let response = self
            .client
            .head(target.as_str())
            .send()
            .await
            .map_err(|e| ProbeError::Unreachable(e.to_string()))?;
        debug!("HEAD {} -> {}", target, response.status());
        Ok(())
    }

    async fn check_websocket(&self, target: &Url) -> Result<(), ProbeError> {
        let request = signaling_request(target)?;
        let (mut socket, response) = connect_async(request)
            .await
            .map_err(|e| ProbeError::Unreachable(e.to_string()))?;
        debug!("WebSocket {} -> {}", target, response.status());
        // The handshake is all we wanted
        if let Err(e) = socket.close(None).await {
            debug!("Closing handshake socket to {} failed: {}", target, e);
        }
        Ok(())
    }
}

/// Handshake request for a signaling target. SIP servers refuse upgrades
/// that do not offer the `sip` subprotocol.
pub fn signaling_request(target: &Url) -> Result<Request, ProbeError> {
    let mut request = target
        .as_str()
        .into_client_request()
        .map_err(|e| ProbeError::InvalidTarget(format!("{}: {}", target, e)))?;
    request
        .headers_mut()
        .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static("sip"));
    Ok(request)
}

/// Parse a target and check it fits the probe class
pub fn parse_target(class: ProbeClass, target: &str) -> Result<Url, ProbeError> {
    let url = Url::parse(target)
        .map_err(|e| ProbeError::InvalidTarget(format!("{}: {}", target, e)))?;

    let allowed: &[&str] = match class {
        ProbeClass::Internet => &["http", "https"],
        ProbeClass::Signaling => &["ws", "wss"],
    };
    if !allowed.contains(&url.scheme()) {
        return Err(ProbeError::InvalidTarget(format!(
            "{} is not a {:?} probe target",
            target, class
        )));
    }
    Ok(url)
}

#[async_trait]
impl ConnectivityProbe for NetworkProbe {
    async fn check(&self, class: ProbeClass, target: &str) -> Result<(), ProbeError> {
        let url = parse_target(class, target)?;
        match class {
            ProbeClass::Internet => self.check_http(&url).await,
            ProbeClass::Signaling => self.check_websocket(&url).await,
        }
    }
}
