//! Fire-and-forget announcement of the server endpoint.
//!
//! Mirrors the connection-info sync the desktop host performs so remote
//! clients can discover where to connect. Announce failures are logged and
//! never reach the broker's control flow.

use serde::Serialize;

use crate::config::AnnounceConfig;

#[derive(Debug, Serialize)]
struct Announcement<'a> {
    host: &'a str,
    port: u16,
    agent: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<&'a str>,
}

/// POST this server's connection info to the configured endpoint.
pub async fn announce_endpoint(config: &AnnounceConfig, port: u16, token: Option<&str>) {
    let host = match &config.host {
        Some(host) => host.clone(),
        None => hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "127.0.0.1".to_string()),
    };
    let payload = Announcement {
        host: &host,
        port,
        agent: "omnihost",
        token,
    };

    let client = reqwest::Client::new();
    match client.post(&config.url).json(&payload).send().await {
        Ok(resp) if resp.status().is_success() => {
            tracing::info!(url = %config.url, host = %host, port, "announced endpoint");
        }
        Ok(resp) => {
            tracing::warn!(url = %config.url, status = %resp.status(), "endpoint announce rejected");
        }
        Err(e) => {
            tracing::warn!(url = %config.url, error = %e, "endpoint announce failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn announcement_payload_shape() {
        let payload = Announcement {
            host: "workstation-1",
            port: 4700,
            agent: "omnihost",
            token: Some("secret"),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "host": "workstation-1",
                "port": 4700,
                "agent": "omnihost",
                "token": "secret",
            })
        );
    }

    #[test]
    fn token_is_omitted_when_absent() {
        let payload = Announcement {
            host: "h",
            port: 1,
            agent: "omnihost",
            token: None,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("token").is_none());
    }
}
