//! `reqwest`-based [`ServerControl`] speaking the server's JSON-RPC dialect.
//!
//! Every request is a `slim.request` carrying the player id and a CLI-style
//! command array, e.g. `["playlist", "index", "+1"]`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::retry::with_retry;
use super::traits::ServerControl;
use super::{ControlError, ControlResult};
use crate::context::ServerContext;
use crate::protocol_constants::{JSONRPC_METHOD, RESUME_PREF_NAME};
use crate::types::{ResumePreference, TrackInfo};

/// JSON-RPC control client bound to one player.
#[derive(Clone)]
pub struct JsonRpcControl {
    client: Client,
    url: String,
    base_url: String,
    player_id: String,
    timeout: Duration,
}

impl JsonRpcControl {
    /// Creates a client for `player_id` on the given server.
    ///
    /// # Arguments
    /// * `client` - Shared HTTP client
    /// * `server` - Server address
    /// * `player_id` - Player MAC as the server knows it
    /// * `timeout` - Per-request timeout
    #[must_use]
    pub fn new(client: Client, server: &ServerContext, player_id: String, timeout: Duration) -> Self {
        Self {
            client,
            url: server.jsonrpc_url(),
            base_url: server.stream_url("", 0),
            player_id,
            timeout,
        }
    }

    /// Sends one command and returns its `result` object.
    async fn execute(&self, params: Vec<Value>) -> ControlResult<Value> {
        let body = request_body(&self.player_id, params);
        log::debug!("[JsonRpc] -> {}", body["params"][1]);

        let res = self
            .client
            .post(&self.url)
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            return Err(ControlError::HttpStatus(status.as_u16()));
        }

        let data: Value = res.json().await?;
        extract_result(data)
    }

    async fn execute_unit(&self, params: Vec<Value>) -> ControlResult<()> {
        self.execute(params).await.map(|_| ())
    }
}

#[async_trait]
impl ServerControl for JsonRpcControl {
    async fn play(&self) -> ControlResult<()> {
        with_retry("play", || self.execute_unit(vec![json!("play")])).await
    }

    async fn pause(&self) -> ControlResult<()> {
        with_retry("pause", || self.execute_unit(vec![json!("pause"), json!("1")])).await
    }

    async fn stop(&self) -> ControlResult<()> {
        self.execute_unit(vec![json!("stop")]).await
    }

    async fn seek(&self, seconds: f64) -> ControlResult<()> {
        self.execute_unit(vec![json!("time"), json!(format_seconds(seconds))])
            .await
    }

    async fn playlist_jump(&self, delta: i32) -> ControlResult<()> {
        self.execute_unit(vec![
            json!("playlist"),
            json!("index"),
            json!(format!("{:+}", delta)),
        ])
        .await
    }

    async fn playlist_jump_to_current(&self, offset: f64) -> ControlResult<()> {
        let status = self
            .execute(vec![json!("status"), json!("-"), json!(1)])
            .await?;
        let index = status
            .get("playlist_cur_index")
            .and_then(value_as_f64)
            .ok_or_else(|| ControlError::UnexpectedResponse("no current playlist index".into()))?;

        self.execute_unit(vec![
            json!("playlist"),
            json!("index"),
            json!((index as u64).to_string()),
        ])
        .await?;

        if offset > 0.0 {
            self.seek(offset).await?;
        }
        Ok(())
    }

    async fn current_time(&self) -> ControlResult<f64> {
        let result = self.execute(vec![json!("time"), json!("?")]).await?;
        result
            .get("_time")
            .and_then(value_as_f64)
            .ok_or_else(|| ControlError::UnexpectedResponse(format!("time: {}", result)))
    }

    async fn resume_preference(&self) -> ControlResult<ResumePreference> {
        let result = self
            .execute(vec![json!("playerpref"), json!(RESUME_PREF_NAME), json!("?")])
            .await?;
        Ok(match result.get("_p2") {
            Some(Value::String(s)) => ResumePreference::from_pref_value(s),
            Some(Value::Number(n)) => ResumePreference::from_pref_value(&n.to_string()),
            _ => ResumePreference::NoResume,
        })
    }

    async fn now_playing(&self) -> ControlResult<Option<TrackInfo>> {
        let result = self
            .execute(vec![
                json!("status"),
                json!("-"),
                json!(1),
                json!("tags:aAdlKc"),
            ])
            .await?;
        Ok(parse_track_info(&result, &self.base_url))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Request / Response helpers
// ─────────────────────────────────────────────────────────────────────────────

fn request_body(player_id: &str, params: Vec<Value>) -> Value {
    json!({
        "id": 1,
        "method": JSONRPC_METHOD,
        "params": [player_id, params]
    })
}

fn extract_result(data: Value) -> ControlResult<Value> {
    if let Some(error) = data.get("error") {
        if !error.is_null() {
            return Err(ControlError::Rpc(error.to_string()));
        }
    }
    Ok(data.get("result").cloned().unwrap_or(Value::Null))
}

/// Numbers arrive both as JSON numbers and as strings.
fn value_as_f64(v: &Value) -> Option<f64> {
    v.as_f64()
        .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
}

fn format_seconds(seconds: f64) -> String {
    format!("{:.3}", seconds.max(0.0))
}

fn parse_track_info(result: &Value, base_url: &str) -> Option<TrackInfo> {
    let track = result
        .get("playlist_loop")
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())?;

    let text = |key: &str| {
        track
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string()
    };

    let artwork_url = track
        .get("artwork_url")
        .and_then(|v| v.as_str())
        .map(|url| {
            if url.starts_with('/') {
                format!("{}{}", base_url.trim_end_matches('/'), url)
            } else {
                url.to_string()
            }
        })
        .or_else(|| {
            track
                .get("coverid")
                .and_then(|v| v.as_str())
                .map(|id| format!("{}/music/{}/cover.jpg", base_url.trim_end_matches('/'), id))
        });

    Some(TrackInfo {
        title: text("title"),
        artist: text("artist"),
        album: text("album"),
        artwork_url,
        duration: track
            .get("duration")
            .and_then(value_as_f64)
            .or_else(|| result.get("duration").and_then(value_as_f64)),
    })
}
