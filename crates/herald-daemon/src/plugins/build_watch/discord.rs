//! Discord REST client

use super::gateway::PresenceGateway;
use super::http::{build_client, check_status, read_json, request_error};
use super::provider::ChatClient;
use super::types::ChatMessage;
use crate::plugin::PluginError;
use ci_herald_core::Destination;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

const MAX_EMBED_FIELDS: usize = 25;
const MAX_TITLE_CHARS: usize = 256;
const MAX_DESCRIPTION_CHARS: usize = 4096;
const MAX_FIELD_VALUE_CHARS: usize = 1024;
/// Sum of title, description, field names and field values
const MAX_EMBED_CHARS: usize = 6000;
/// Description space kept free when attachments crowd the embed
const RESERVED_DESCRIPTION_CHARS: usize = 512;

#[derive(Debug, Serialize)]
struct CreateMessage<'a> {
    embeds: [Embed<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Embed<'a> {
    title: String,
    url: &'a str,
    color: u32,
    description: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fields: Vec<EmbedField>,
    timestamp: &'a str,
}

#[derive(Debug, Serialize)]
struct EmbedField {
    name: String,
    value: String,
    inline: bool,
}

#[derive(Debug, Deserialize)]
struct CurrentUser {
    username: String,
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}

fn embed(message: &ChatMessage) -> Embed<'_> {
    let title = truncate(&message.title, MAX_TITLE_CHARS);
    let mut used = title.chars().count();

    let mut fields = Vec::new();
    for attachment in &message.attachments {
        let name = truncate(&attachment.name, MAX_TITLE_CHARS);
        let value = format!("[Download]({})", attachment.url);
        let size = name.chars().count() + value.chars().count();
        if value.chars().count() > MAX_FIELD_VALUE_CHARS {
            continue;
        }
        if fields.len() == MAX_EMBED_FIELDS
            || used + size + RESERVED_DESCRIPTION_CHARS > MAX_EMBED_CHARS
        {
            break;
        }
        used += size;
        fields.push(EmbedField {
            name,
            value,
            inline: false,
        });
    }

    let hidden = message.attachments.len() - fields.len();
    let description = if hidden > 0 {
        debug!("{hidden} attachment(s) do not fit in the embed for '{title}'");
        format!("{}\n{hidden} more file(s) not listed", message.description)
    } else {
        message.description.clone()
    };
    let budget = MAX_DESCRIPTION_CHARS.min(MAX_EMBED_CHARS - used);

    Embed {
        title,
        url: &message.url,
        color: message.color,
        description: truncate(&description, budget),
        fields,
        timestamp: &message.timestamp,
    }
}

/// Posts embeds to Discord channels as a bot user.
///
/// Presence needs a gateway session; without one, `set_presence` fails.
#[derive(Clone)]
pub struct DiscordClient {
    endpoint: String,
    token: String,
    client: reqwest::Client,
    gateway: Option<PresenceGateway>,
}

impl fmt::Debug for DiscordClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscordClient")
            .field("endpoint", &self.endpoint)
            .field("token", &"<redacted>")
            .field("gateway", &self.gateway.is_some())
            .finish_non_exhaustive()
    }
}

impl DiscordClient {
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            token: token.into(),
            client: build_client(),
            gateway: None,
        }
    }

    /// Publish presence through `gateway`
    pub fn with_gateway(mut self, gateway: PresenceGateway) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Presence text most recently set
    pub fn presence(&self) -> Option<String> {
        self.gateway.as_ref().and_then(PresenceGateway::current)
    }

    fn authorization(&self) -> String {
        format!("Bot {}", self.token)
    }
}

impl ChatClient for DiscordClient {
    async fn send_message(
        &self,
        destination: &Destination,
        message: &ChatMessage,
    ) -> Result<(), PluginError> {
        let body = CreateMessage {
            embeds: [embed(message)],
        };
        let response = self
            .client
            .post(format!("{}/channels/{destination}/messages", self.endpoint))
            .header("Authorization", self.authorization())
            .json(&body)
            .send()
            .await
            .map_err(|e| request_error("Discord message", e))?;
        check_status("Discord message", response).await?;
        Ok(())
    }

    async fn set_presence(&self, text: Option<&str>) -> Result<(), PluginError> {
        let Some(gateway) = &self.gateway else {
            return Err(PluginError::provider(
                "Discord presence requires a gateway session",
            ));
        };
        gateway.set(text)?;
        match text {
            Some(text) => info!("Presence: {text}"),
            None => info!("Presence cleared"),
        }
        Ok(())
    }

    async fn verify(&self) -> Result<(), PluginError> {
        let response = self
            .client
            .get(format!("{}/users/@me", self.endpoint))
            .header("Authorization", self.authorization())
            .send()
            .await
            .map_err(|e| request_error("Discord user", e))?;
        let response = check_status("Discord user", response).await?;
        let user: CurrentUser = read_json("Discord user", response).await?;
        debug!("Authenticated to Discord as {}", user.username);
        Ok(())
    }

    fn provider_name(&self) -> &str {
        "Discord"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::build_watch::types::MessageAttachment;

    fn message(attachments: usize) -> ChatMessage {
        ChatMessage {
            title: "widget #12 passed".to_string(),
            url: "https://ci.example/acme/widget/builds/12".to_string(),
            color: 0x2ECC71,
            description: "**acme/widget** on `main`".to_string(),
            attachments: (0..attachments)
                .map(|i| MessageAttachment {
                    name: format!("file{i}.jar"),
                    url: format!("https://dl.example/file{i}.jar"),
                })
                .collect(),
            timestamp: "2026-02-13T10:05:00Z".to_string(),
        }
    }

    #[test]
    fn test_embed_payload_shape() {
        let msg = message(1);
        let body = CreateMessage {
            embeds: [embed(&msg)],
        };
        let json = serde_json::to_value(&body).unwrap();
        let embed = &json["embeds"][0];
        assert_eq!(embed["title"], "widget #12 passed");
        assert_eq!(embed["color"], 0x2ECC71);
        assert_eq!(embed["timestamp"], "2026-02-13T10:05:00Z");
        assert_eq!(embed["fields"][0]["name"], "file0.jar");
        assert_eq!(
            embed["fields"][0]["value"],
            "[Download](https://dl.example/file0.jar)"
        );
    }

    #[test]
    fn test_embed_omits_empty_fields_and_caps_count() {
        let msg = message(0);
        let json = serde_json::to_value(embed(&msg)).unwrap();
        assert!(json.get("fields").is_none());

        let msg = message(40);
        assert_eq!(embed(&msg).fields.len(), MAX_EMBED_FIELDS);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("short", 10), "short");
    }

    fn embed_chars(embed: &Embed<'_>) -> usize {
        embed.title.chars().count()
            + embed.description.chars().count()
            + embed
                .fields
                .iter()
                .map(|f| f.name.chars().count() + f.value.chars().count())
                .sum::<usize>()
    }

    #[test]
    fn test_embed_stays_within_total_limit() {
        let mut msg = message(0);
        msg.description = "x".repeat(5000);
        msg.attachments = (0..25)
            .map(|i| MessageAttachment {
                name: format!("artifact-{i}-{}.jar", "n".repeat(40)),
                url: format!("https://dl.example/{}/{i}.jar", "p".repeat(200)),
            })
            .collect();

        let embed = embed(&msg);
        assert!(embed_chars(&embed) <= MAX_EMBED_CHARS);
        assert!(!embed.fields.is_empty());
        assert!(embed.fields.len() < 25);
        assert!(embed.description.chars().count() <= MAX_DESCRIPTION_CHARS);
    }

    #[test]
    fn test_embed_notes_attachments_that_do_not_fit() {
        let mut msg = message(0);
        msg.attachments = (0..30)
            .map(|i| MessageAttachment {
                name: format!("file{i}.jar"),
                url: format!("https://dl.example/{}/{i}.jar", "p".repeat(200)),
            })
            .collect();

        let embed = embed(&msg);
        let hidden = 30 - embed.fields.len();
        assert!(hidden >= 5);
        assert!(
            embed
                .description
                .ends_with(&format!("{hidden} more file(s) not listed"))
        );
    }

    #[tokio::test]
    async fn test_presence_without_gateway_is_an_error() {
        let client = DiscordClient::new("https://discord.example/api", "token");
        let err = client.set_presence(Some("watching widget")).await.unwrap_err();
        assert!(matches!(err, PluginError::Provider { .. }));
        assert_eq!(client.presence(), None);
    }

    #[test]
    fn test_debug_hides_token() {
        let client = DiscordClient::new("https://discord.example/api", "sekrit");
        assert!(!format!("{client:?}").contains("sekrit"));
    }
}
