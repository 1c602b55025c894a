use anyhow::{Context as _, anyhow};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};

use checkpoint_domain::id::{ExternalId, TeamId};

use crate::domain::repository::PlatformPort;
use crate::domain::types::TeamResources;
use crate::error::RegistryError;

const CHANNEL_TEXT: u8 = 0;
const CHANNEL_VOICE: u8 = 2;
const CHANNEL_CATEGORY: u8 = 4;
const OVERWRITE_ROLE: u8 = 0;

const VIEW_CHANNEL: u64 = 1 << 10;
const SEND_MESSAGES: u64 = 1 << 11;
const CONNECT: u64 = 1 << 20;
const SPEAK: u64 = 1 << 21;

/// Category name shown on the platform.
pub fn category_name(team_id: TeamId, team_name: &str) -> String {
    format!("Team {team_id} - {team_name}")
}

/// Channel name with spaces replaced by dashes and the given suffix.
pub fn channel_name(team_name: &str, suffix: &str) -> String {
    format!("{}-{suffix}", team_name.trim().replace(' ', "-"))
}

#[derive(Debug, Deserialize)]
struct Created {
    id: String,
}

/// Discord REST client scoped to one guild.
#[derive(Clone)]
pub struct DiscordPlatform {
    pub client: reqwest::Client,
    pub api_base: String,
    pub bot_token: String,
    pub guild_id: String,
    /// Staff role that sees every team channel.
    pub all_access_role_id: Option<String>,
}

impl DiscordPlatform {
    async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> anyhow::Result<reqwest::Response> {
        let url = format!("{}{path}", self.api_base.trim_end_matches('/'));
        let mut req = self
            .client
            .request(method.clone(), &url)
            .header(reqwest::header::AUTHORIZATION, format!("Bot {}", self.bot_token));
        if let Some(body) = body {
            req = req.json(&body);
        }
        req.send()
            .await
            .with_context(|| format!("{method} {path}"))
    }

    async fn create(&self, path: &str, body: Value) -> anyhow::Result<String> {
        let resp = self.call(Method::POST, path, Some(body)).await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("POST {path} failed (status={status}): {text}"));
        }
        let created: Created = resp.json().await.with_context(|| format!("decode POST {path}"))?;
        Ok(created.id)
    }

    /// Succeeds on 2xx, and on 404 when `missing_ok` is set.
    async fn expect_done(
        &self,
        method: Method,
        path: &str,
        missing_ok: bool,
    ) -> anyhow::Result<()> {
        let resp = self.call(method.clone(), path, None).await?;
        let status = resp.status();
        if status.is_success() || (missing_ok && status == StatusCode::NOT_FOUND) {
            return Ok(());
        }
        let text = resp.text().await.unwrap_or_default();
        Err(anyhow!("{method} {path} failed (status={status}): {text}"))
    }

    fn member_role_path(&self, account: &ExternalId, role_id: &str) -> String {
        format!("/guilds/{}/members/{account}/roles/{role_id}", self.guild_id)
    }

    fn team_overwrites(&self, role_id: &str, allow: u64) -> Value {
        // The @everyone role shares the guild id.
        let mut overwrites = vec![
            json!({ "id": self.guild_id, "type": OVERWRITE_ROLE, "deny": allow.to_string() }),
            json!({ "id": role_id, "type": OVERWRITE_ROLE, "allow": allow.to_string() }),
        ];
        if let Some(all_access) = &self.all_access_role_id {
            overwrites.push(
                json!({ "id": all_access, "type": OVERWRITE_ROLE, "allow": allow.to_string() }),
            );
        }
        Value::Array(overwrites)
    }

    async fn build_resources(
        &self,
        team_id: TeamId,
        team_name: &str,
        created: &mut TeamResources,
    ) -> anyhow::Result<()> {
        let channels = format!("/guilds/{}/channels", self.guild_id);
        created.category_id = self
            .create(
                &channels,
                json!({
                    "name": category_name(team_id, team_name),
                    "type": CHANNEL_CATEGORY,
                    "permission_overwrites": self.team_overwrites(&created.role_id, VIEW_CHANNEL),
                }),
            )
            .await?;
        created.text_id = self
            .create(
                &channels,
                json!({
                    "name": channel_name(team_name, "text"),
                    "type": CHANNEL_TEXT,
                    "parent_id": created.category_id,
                    "permission_overwrites": self
                        .team_overwrites(&created.role_id, VIEW_CHANNEL | SEND_MESSAGES),
                }),
            )
            .await?;
        created.voice_id = Some(
            self.create(
                &channels,
                json!({
                    "name": channel_name(team_name, "voice"),
                    "type": CHANNEL_VOICE,
                    "parent_id": created.category_id,
                    "permission_overwrites": self
                        .team_overwrites(&created.role_id, VIEW_CHANNEL | CONNECT | SPEAK),
                }),
            )
            .await?,
        );
        Ok(())
    }

    async fn delete_all(&self, resources: &TeamResources) -> anyhow::Result<()> {
        // Children before the category, then the role.
        let channels = resources
            .voice_id
            .iter()
            .chain([&resources.text_id, &resources.category_id])
            .filter(|id| !id.is_empty());
        for channel_id in channels {
            self.expect_done(Method::DELETE, &format!("/channels/{channel_id}"), true)
                .await?;
        }
        if !resources.role_id.is_empty() {
            self.expect_done(
                Method::DELETE,
                &format!("/guilds/{}/roles/{}", self.guild_id, resources.role_id),
                true,
            )
            .await?;
        }
        Ok(())
    }
}

impl PlatformPort for DiscordPlatform {
    async fn grant_role(&self, account: &ExternalId, role_id: &str) -> Result<(), RegistryError> {
        self.expect_done(Method::PUT, &self.member_role_path(account, role_id), false)
            .await
            .map_err(RegistryError::External)
    }

    async fn revoke_role(&self, account: &ExternalId, role_id: &str) -> Result<(), RegistryError> {
        self.expect_done(Method::DELETE, &self.member_role_path(account, role_id), true)
            .await
            .map_err(RegistryError::External)
    }

    async fn create_team_resources(
        &self,
        team_id: TeamId,
        team_name: &str,
        is_capstone: bool,
    ) -> Result<TeamResources, RegistryError> {
        let role_id = self
            .create(
                &format!("/guilds/{}/roles", self.guild_id),
                json!({ "name": team_name, "mentionable": true }),
            )
            .await
            .map_err(RegistryError::External)?;

        let mut created = TeamResources {
            role_id,
            category_id: String::new(),
            text_id: String::new(),
            voice_id: None,
        };
        if let Err(e) = self.build_resources(team_id, team_name, &mut created).await {
            if let Err(cleanup) = self.delete_all(&created).await {
                tracing::warn!(
                    team_id = %team_id,
                    error = %cleanup,
                    "failed to clean up partially created team resources"
                );
            }
            return Err(RegistryError::External(e));
        }

        tracing::info!(
            team_id = %team_id,
            is_capstone,
            role_id = %created.role_id,
            category_id = %created.category_id,
            "created team resources"
        );
        Ok(created)
    }

    async fn delete_team_resources(&self, resources: &TeamResources) -> Result<(), RegistryError> {
        self.delete_all(resources)
            .await
            .map_err(RegistryError::External)
    }
}
