// ===============================
// src/exchange.rs (venue HTTP client)
// ===============================
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::domain::{SignedEnvelope, VenueResponse};
use crate::error::{Error, Result};
use crate::gateway::{RawReply, Transport, EXCHANGE_PATH, INFO_PATH};
use crate::metrics::{ACTIONS, HTTP_LATENCY};

/// POST /exchange and /info over an injected transport. No retries: a signed
/// action that may have landed must not be replayed blindly.
pub struct VenueClient<T> {
    transport: T,
}

impl<T: Transport> VenueClient<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn post_action(&self, envelope: &SignedEnvelope) -> Result<VenueResponse> {
        let kind = envelope.action.kind();
        let body = serde_json::to_string(envelope)?;

        let timer = HTTP_LATENCY.with_label_values(&["exchange"]).start_timer();
        let reply = self.transport.post_json(EXCHANGE_PATH, body).await;
        timer.observe_duration();

        let reply = match reply {
            Ok(r) => r,
            Err(e) => {
                error!(kind, nonce = envelope.nonce, error = %e, "exchange request failed");
                ACTIONS.with_label_values(&[kind, "network_failure"]).inc();
                return Err(e);
            }
        };

        match interpret_exchange_reply(reply) {
            Ok(resp) => {
                info!(kind, nonce = envelope.nonce, "action accepted");
                ACTIONS.with_label_values(&[kind, "ok"]).inc();
                Ok(resp)
            }
            Err(e) => {
                warn!(kind, nonce = envelope.nonce, error = %e, "action not accepted");
                ACTIONS.with_label_values(&[kind, e.kind()]).inc();
                Err(e)
            }
        }
    }

    /// Typed `/info` query; the request body is `{"type": ..., ...params}`.
    pub async fn post_query<Q, R>(&self, query: &Q) -> Result<R>
    where
        Q: Serialize + Sync,
        R: DeserializeOwned,
    {
        let body = serde_json::to_string(query)?;
        let timer = HTTP_LATENCY.with_label_values(&["info"]).start_timer();
        let reply = self.transport.post_json(INFO_PATH, body).await?;
        timer.observe_duration();

        if reply.status >= 400 {
            return Err(Error::NetworkFailure(format!("info HTTP {}: {}", reply.status, reply.body)));
        }
        serde_json::from_str(&reply.body).map_err(|e| Error::Decode(format!("info reply: {e}")))
    }
}

/// Maps a raw /exchange reply onto the error taxonomy.
pub fn interpret_exchange_reply(reply: RawReply) -> Result<VenueResponse> {
    if reply.status >= 500 {
        return Err(Error::NetworkFailure(format!("HTTP {}: {}", reply.status, reply.body)));
    }
    let parsed: VenueResponse = match serde_json::from_str(&reply.body) {
        Ok(v) => v,
        // venue kadang balas plain text (mis. "Failed to deserialize the JSON body")
        Err(_) => return Err(Error::VenueRejected(reply.body.trim().to_string())),
    };
    if parsed.is_ok() {
        return Ok(parsed);
    }
    let message = match &parsed.response {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => format!("status {}", parsed.status),
    };
    Err(Error::VenueRejected(message))
}

/// Per-order errors inside an `ok` reply, e.g.
/// `{"type":"order","data":{"statuses":[{"error":"..."}]}}`.
pub fn embedded_errors(resp: &VenueResponse) -> Vec<String> {
    resp.response
        .as_ref()
        .and_then(|r| r.pointer("/data/statuses"))
        .and_then(|s| s.as_array())
        .map(|statuses| {
            statuses
                .iter()
                .filter_map(|s| s.get("error").and_then(|e| e.as_str()).map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Action, BulkCancel, CancelWire, SignatureWire};
    use crate::gateway::MockTransport;

    fn envelope() -> SignedEnvelope {
        SignedEnvelope {
            action: Action::Cancel(BulkCancel { cancels: vec![CancelWire { a: 1, o: 9 }] }),
            nonce: 5,
            signature: SignatureWire { r: "0x01".into(), s: "0x02".into(), v: 27 },
            vault_address: None,
        }
    }

    #[tokio::test]
    async fn ok_reply_is_success_and_body_is_envelope() {
        let t = MockTransport::new();
        t.push_reply(200, r#"{"status":"ok","response":{"type":"cancel","data":{"statuses":["success"]}}}"#);
        let c = VenueClient::new(t);
        let resp = c.post_action(&envelope()).await.unwrap();
        assert!(resp.is_ok());
        assert!(embedded_errors(&resp).is_empty());

        let reqs = c.transport().requests();
        assert_eq!(reqs[0].0, EXCHANGE_PATH);
        assert_eq!(
            reqs[0].1,
            r#"{"action":{"type":"cancel","cancels":[{"a":1,"o":9}]},"nonce":5,"signature":{"r":"0x01","s":"0x02","v":27},"vaultAddress":null}"#
        );
    }

    #[tokio::test]
    async fn err_reply_surfaces_venue_text_verbatim() {
        let t = MockTransport::new();
        t.push_reply(200, r#"{"status":"err","response":"User or API Wallet 0xabc does not exist."}"#);
        let c = VenueClient::new(t);
        let e = c.post_action(&envelope()).await.unwrap_err();
        assert_eq!(e, Error::VenueRejected("User or API Wallet 0xabc does not exist.".into()));
        assert_eq!(e.to_string(), "User or API Wallet 0xabc does not exist.");
    }

    #[tokio::test]
    async fn non_json_and_server_errors() {
        let t = MockTransport::new();
        t.push_reply(422, "Failed to deserialize the JSON body into the target type")
            .push_reply(502, "bad gateway")
            .push_error(Error::NetworkFailure("connection reset".into()));
        let c = VenueClient::new(t);
        assert!(matches!(c.post_action(&envelope()).await, Err(Error::VenueRejected(m)) if m.starts_with("Failed")));
        assert!(matches!(c.post_action(&envelope()).await, Err(Error::NetworkFailure(_))));
        assert!(matches!(c.post_action(&envelope()).await, Err(Error::NetworkFailure(_))));
        // tidak ada retry: tepat tiga request
        assert_eq!(c.transport().requests().len(), 3);
    }

    #[test]
    fn embedded_order_errors_are_collected() {
        let resp: VenueResponse = serde_json::from_str(
            r#"{"status":"ok","response":{"type":"order","data":{"statuses":[{"resting":{"oid":1}},{"error":"Order must have minimum value of $10."}]}}}"#,
        )
        .unwrap();
        assert_eq!(embedded_errors(&resp), vec!["Order must have minimum value of $10.".to_string()]);
    }

    #[tokio::test]
    async fn query_decodes_and_maps_http_errors() {
        let t = MockTransport::new();
        t.push_reply(200, r#"{"x":1}"#).push_reply(429, "rate limited").push_reply(200, "nope");
        let c = VenueClient::new(t);
        let q = serde_json::json!({"type": "meta"});
        let v: serde_json::Value = c.post_query(&q).await.unwrap();
        assert_eq!(v["x"], 1);
        assert!(matches!(c.post_query::<_, serde_json::Value>(&q).await, Err(Error::NetworkFailure(_))));
        assert!(matches!(c.post_query::<_, serde_json::Value>(&q).await, Err(Error::Decode(_))));
        assert_eq!(c.transport().requests()[0].1, r#"{"type":"meta"}"#);
    }
}
