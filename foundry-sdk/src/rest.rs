//! HTTP backend for a Discord-style REST API (v10).
//!
//! Only the handful of endpoints the bot needs: channel create/delete/get,
//! guild channel listing, and the member move used for relocation.

use serde::Deserialize;

use crate::client::{RemoteError, ResourceClient};
use crate::types::{ContextId, MemberId, Resource, ResourceId, ResourceKind};

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

/// Channel object as returned by the API. Unknown fields are ignored.
#[derive(Debug, Deserialize)]
struct ChannelPayload {
    id: ResourceId,
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    guild_id: Option<ContextId>,
}

impl ChannelPayload {
    fn into_resource(self, fallback_context: Option<ContextId>) -> Result<Resource, RemoteError> {
        let context = self
            .guild_id
            .or(fallback_context)
            .ok_or_else(|| RemoteError::Decode(format!("channel {} has no guild_id", self.id)))?;
        Ok(Resource {
            id: self.id,
            name: self.name.unwrap_or_default(),
            kind: ResourceKind::from_code(self.kind),
            context,
        })
    }
}

/// REST client authenticated with a bot token.
pub struct RestClient {
    token: String,
    base: String,
    http: reqwest::Client,
}

impl RestClient {
    pub fn new(token: String) -> Self {
        Self {
            token,
            base: DEFAULT_API_BASE.to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn with_base(mut self, base: &str) -> Self {
        self.base = base.trim_end_matches('/').to_string();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, RemoteError> {
        let resp = req
            .header("authorization", format!("Bot {}", self.token))
            .send()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(RemoteError::NotFound(body));
        }
        tracing::debug!(%status, %body, "REST call failed");
        Err(RemoteError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn channel(
        &self,
        req: reqwest::RequestBuilder,
        context: Option<ContextId>,
    ) -> Result<Resource, RemoteError> {
        let payload = self
            .send(req)
            .await?
            .json::<ChannelPayload>()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        payload.into_resource(context)
    }
}

impl ResourceClient for RestClient {
    async fn create_resource(
        &self,
        name: &str,
        kind: ResourceKind,
        context: ContextId,
    ) -> Result<Resource, RemoteError> {
        let code = kind
            .code()
            .ok_or_else(|| RemoteError::Rejected(format!("cannot create a {kind} resource")))?;
        let body = serde_json::json!({ "name": name, "type": code });
        let req = self
            .http
            .post(self.url(&format!("/guilds/{context}/channels")))
            .json(&body);
        self.channel(req, Some(context)).await
    }

    async fn delete_resource(&self, id: ResourceId) -> Result<(), RemoteError> {
        self.send(self.http.delete(self.url(&format!("/channels/{id}"))))
            .await?;
        Ok(())
    }

    async fn get_resource(&self, id: ResourceId) -> Result<Resource, RemoteError> {
        let req = self.http.get(self.url(&format!("/channels/{id}")));
        self.channel(req, None).await
    }

    async fn relocate_member(
        &self,
        member: MemberId,
        context: ContextId,
        resource: ResourceId,
    ) -> Result<(), RemoteError> {
        let body = serde_json::json!({ "channel_id": resource.to_string() });
        let req = self
            .http
            .patch(self.url(&format!("/guilds/{context}/members/{member}")))
            .json(&body);
        self.send(req).await?;
        Ok(())
    }

    async fn list_resources(&self, context: ContextId) -> Result<Vec<Resource>, RemoteError> {
        let payloads = self
            .send(self.http.get(self.url(&format!("/guilds/{context}/channels"))))
            .await?
            .json::<Vec<ChannelPayload>>()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        payloads
            .into_iter()
            .map(|p| p.into_resource(Some(context)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_uses_guild_id_when_present() {
        let p: ChannelPayload = serde_json::from_str(
            r#"{"id":"10","name":"Gaming","type":2,"guild_id":"5","position":3}"#,
        )
        .unwrap();
        let r = p.into_resource(Some(ContextId(9))).unwrap();
        assert_eq!(r.id, ResourceId(10));
        assert_eq!(r.kind, ResourceKind::Voice);
        assert_eq!(r.context, ContextId(5));
    }

    #[test]
    fn payload_without_any_context_is_a_decode_error() {
        let p: ChannelPayload = serde_json::from_str(r#"{"id":"10","type":1}"#).unwrap();
        assert!(matches!(p.into_resource(None), Err(RemoteError::Decode(_))));
    }

    #[test]
    fn base_url_is_normalized() {
        let c = RestClient::new("t".into()).with_base("http://localhost:8080/api/");
        assert_eq!(c.url("/channels/1"), "http://localhost:8080/api/channels/1");
    }
}
