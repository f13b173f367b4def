//! Code store adapter for a Redis-compatible key-value service reached over
//! HTTP.
//!
//! Each command is POSTed as a JSON array (`["SET", "key", "value"]`) with a
//! bearer token; the service answers `{"result": ...}` or `{"error": "..."}`.
//! The conditional state update runs as a server-side script so the
//! check-and-set is one atomic operation in the store, shared by every relay
//! instance pointed at it.

use std::time::Duration;

use async_trait::async_trait;
use codepair_common::StoreError;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::CodeStore;
use crate::record::{PairingRecord, Transition};

/// KEYS[1] = record key
/// ARGV = expected state, expected claim count, next state, claimant ("" for none)
const CAS_SCRIPT: &str = r#"
local raw = redis.call('GET', KEYS[1])
if not raw then return 0 end
local rec = cjson.decode(raw)
local claims = rec.claimants or {}
if rec.state ~= ARGV[1] or #claims ~= tonumber(ARGV[2]) then return 0 end
rec.state = ARGV[3]
if ARGV[4] ~= '' then table.insert(claims, ARGV[4]) end
rec.claimants = claims
local out = cjson.encode(rec)
if #claims == 0 then out = string.gsub(out, '"claimants":{}', '"claimants":[]') end
redis.call('SET', KEYS[1], out, 'KEEPTTL')
return 1
"#;

const SCAN_PAGE_SIZE: &str = "100";

#[derive(Debug, Clone)]
pub struct RestCodeStore {
    http: reqwest::Client,
    url: String,
    token: String,
    key_prefix: String,
}

impl RestCodeStore {
    pub fn new(
        url: &str,
        token: &str,
        key_prefix: &str,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Unavailable(format!("http client: {e}")))?;
        Ok(Self {
            http,
            url: url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            key_prefix: key_prefix.to_string(),
        })
    }

    async fn command(&self, args: Vec<Value>) -> Result<Value, StoreError> {
        let name = args
            .first()
            .and_then(Value::as_str)
            .unwrap_or("?")
            .to_string();
        debug!(command = %name, "code store request");

        let mut request = self.http.post(&self.url).json(&args);
        if !self.token.is_empty() {
            request = request.bearer_auth(&self.token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let text = text.chars().take(200).collect::<String>();
            warn!(command = %name, %status, "code store rejected request");
            return Err(StoreError::Unavailable(format!("HTTP {status}: {text}")));
        }

        let mut body: Value = response
            .json()
            .await
            .map_err(|e| StoreError::Unavailable(format!("bad response body: {e}")))?;

        if let Some(error) = body.get("error").and_then(Value::as_str) {
            return Err(StoreError::Unavailable(format!("{name}: {error}")));
        }
        Ok(body.get_mut("result").map(Value::take).unwrap_or(Value::Null))
    }
}

#[async_trait]
impl CodeStore for RestCodeStore {
    async fn set_if_absent(
        &self,
        key: &str,
        record: &PairingRecord,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let value =
            serde_json::to_string(record).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let ttl_ms = ttl.as_millis().max(1).to_string();
        let result = self
            .command(vec![
                json!("SET"),
                json!(key),
                json!(value),
                json!("NX"),
                json!("PX"),
                json!(ttl_ms),
            ])
            .await?;
        Ok(result.as_str() == Some("OK"))
    }

    async fn get(&self, key: &str) -> Result<Option<PairingRecord>, StoreError> {
        match self.command(vec![json!("GET"), json!(key)]).await? {
            Value::Null => Ok(None),
            Value::String(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| StoreError::Corrupt(format!("{key}: {e}"))),
            other => Err(StoreError::Corrupt(format!(
                "{key}: unexpected GET result {other}"
            ))),
        }
    }

    async fn compare_and_swap_state(
        &self,
        key: &str,
        transition: &Transition,
    ) -> Result<bool, StoreError> {
        let claimant = transition
            .claimant
            .as_ref()
            .map(|c| c.as_str().to_string())
            .unwrap_or_default();
        let result = self
            .command(vec![
                json!("EVAL"),
                json!(CAS_SCRIPT),
                json!("1"),
                json!(key),
                json!(transition.expected_state.as_str()),
                json!(transition.expected_claims.to_string()),
                json!(transition.next_state.as_str()),
                json!(claimant),
            ])
            .await?;
        Ok(result.as_i64() == Some(1))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.command(vec![json!("DEL"), json!(key)]).await?;
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        let pattern = format!("{}*", self.key_prefix);
        let mut cursor = "0".to_string();
        let mut keys = Vec::new();
        loop {
            let page = self
                .command(vec![
                    json!("SCAN"),
                    json!(cursor),
                    json!("MATCH"),
                    json!(pattern),
                    json!("COUNT"),
                    json!(SCAN_PAGE_SIZE),
                ])
                .await?;
            let (next, batch) = match page.as_array().map(Vec::as_slice) {
                Some([next, Value::Array(batch)]) => (next, batch),
                _ => {
                    return Err(StoreError::Corrupt(format!(
                        "unexpected SCAN result {page}"
                    )))
                }
            };
            keys.extend(batch.iter().filter_map(Value::as_str).map(str::to_string));
            cursor = match next {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                _ => "0".to_string(),
            };
            if cursor == "0" {
                break;
            }
        }
        Ok(keys)
    }
}
