//! Discord webhook messages for critical alerts

use chrono::Utc;
use serde::Serialize;

use crate::alerts::{Alert, Category};

/// Discord rejects embeds with more fields than this
const MAX_EMBED_FIELDS: usize = 25;

const CRITICAL_COLOR: u32 = 15158332; // Red

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Debug, Default)]
pub struct MessageBuilder {
    content: Option<String>,
    embeds: Vec<Embed>,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(mut self, content: impl ToString) -> Self {
        self.content = Some(content.to_string());
        self
    }

    pub fn add_embed(mut self, embed: Embed) -> Self {
        self.embeds.push(embed);
        self
    }

    pub fn build(self) -> Message {
        Message {
            content: self.content,
            embeds: self.embeds,
        }
    }
}

/// One embed listing every critical alert of a cycle, mentioning `user_id` if given.
pub fn critical_alerts_message(alerts: &[&Alert], user_id: Option<&str>) -> Message {
    let mut builder = MessageBuilder::new().add_embed(critical_alerts_embed(alerts));

    if let Some(user_id) = user_id {
        builder = builder.content(format!("<@{user_id}>"));
    }

    builder.build()
}

fn critical_alerts_embed(alerts: &[&Alert]) -> Embed {
    let fields = alerts
        .iter()
        .take(MAX_EMBED_FIELDS)
        .map(|alert| EmbedField {
            name: format!("{} {}", category_emoji(alert.category), category_name(alert)),
            value: match &alert.error {
                Some(error) => format!("{}\n`{error}`", alert.message),
                None => alert.message.clone(),
            },
            inline: false,
        })
        .collect();

    let description = if alerts.len() == 1 {
        "1 critical condition detected".to_string()
    } else {
        format!("{} critical conditions detected", alerts.len())
    };

    Embed {
        title: Some("🚨 Critical Alert".to_string()),
        description: Some(description),
        color: Some(CRITICAL_COLOR),
        fields,
        footer: Some(EmbedFooter {
            text: "metrics-beacon".to_string(),
        }),
        timestamp: Some(Utc::now().to_rfc3339()),
    }
}

fn category_name(alert: &Alert) -> String {
    match (&alert.subject, alert.category) {
        (Some(subject), _) => subject.clone(),
        (None, Category::System) => "System".to_string(),
        (None, Category::Container) => "Container".to_string(),
        (None, Category::Service) => "Service".to_string(),
        (None, Category::Performance) => "Performance".to_string(),
    }
}

fn category_emoji(category: Category) -> &'static str {
    match category {
        Category::System => "🖥️",
        Category::Container => "📦",
        Category::Service => "🌐",
        Category::Performance => "⏱️",
    }
}
