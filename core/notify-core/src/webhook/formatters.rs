//! Per-platform payload builders.
//!
//! A preset name from the config selects one of these. Unknown or empty
//! presets fall back to the generic payload built by the sender.

use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};

use super::error::WebhookError;
use crate::types::{Status, StatusInfo};

pub trait Formatter: Send + Sync + std::fmt::Debug {
    fn format(
        &self,
        status: Status,
        message: &str,
        session_id: &str,
        info: &StatusInfo,
    ) -> Result<Value, WebhookError>;
}

/// Picks the formatter for a preset name (case-insensitive).
pub fn formatter_for_preset(preset: &str, chat_id: &str) -> Option<Box<dyn Formatter>> {
    match preset.trim().to_ascii_lowercase().as_str() {
        "slack" => Some(Box::new(SlackFormatter)),
        "discord" => Some(Box::new(DiscordFormatter)),
        "telegram" => Some(Box::new(TelegramFormatter {
            chat_id: chat_id.to_string(),
        })),
        "lark" | "feishu" => Some(Box::new(LarkFormatter)),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SlackFormatter;

impl Formatter for SlackFormatter {
    fn format(
        &self,
        status: Status,
        message: &str,
        session_id: &str,
        info: &StatusInfo,
    ) -> Result<Value, WebhookError> {
        Ok(json!({
            "attachments": [{
                "color": hex_color(status),
                "title": info.title,
                "text": message,
                "footer": format!("Session: {} | Claude Notifications", session_id),
                "footer_icon": "https://claude.ai/favicon.ico",
                "ts": Utc::now().timestamp(),
                "mrkdwn_in": ["text"],
            }]
        }))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DiscordFormatter;

impl Formatter for DiscordFormatter {
    fn format(
        &self,
        status: Status,
        message: &str,
        session_id: &str,
        info: &StatusInfo,
    ) -> Result<Value, WebhookError> {
        Ok(json!({
            "username": "Claude Code",
            "embeds": [{
                "title": info.title,
                "description": message,
                "color": color_rgb(status),
                "footer": { "text": format!("Session: {}", session_id) },
                "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            }]
        }))
    }
}

/// Telegram Bot API `sendMessage` body. Needs the target chat id.
#[derive(Debug, Clone, Default)]
pub struct TelegramFormatter {
    pub chat_id: String,
}

impl Formatter for TelegramFormatter {
    fn format(
        &self,
        status: Status,
        message: &str,
        session_id: &str,
        info: &StatusInfo,
    ) -> Result<Value, WebhookError> {
        if self.chat_id.trim().is_empty() {
            return Err(WebhookError::InvalidConfig(
                "telegram preset requires chatId".to_string(),
            ));
        }

        let text = format!(
            "<b>{} {}</b>\n\n{}\n\n<i>Session: {}</i>",
            emoji(status),
            escape_html(&info.title),
            escape_html(message),
            escape_html(session_id)
        );

        Ok(json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "HTML",
        }))
    }
}

/// Feishu/Lark interactive card.
#[derive(Debug, Clone, Copy, Default)]
pub struct LarkFormatter;

impl Formatter for LarkFormatter {
    fn format(
        &self,
        status: Status,
        message: &str,
        session_id: &str,
        info: &StatusInfo,
    ) -> Result<Value, WebhookError> {
        Ok(json!({
            "msg_type": "interactive",
            "card": {
                "config": { "wide_screen_mode": true },
                "header": {
                    "title": { "tag": "plain_text", "content": info.title },
                    "template": lark_template(status),
                },
                "elements": [
                    { "tag": "div", "text": { "tag": "plain_text", "content": message } },
                    { "tag": "hr" },
                    {
                        "tag": "div",
                        "text": {
                            "tag": "plain_text",
                            "content": format!("Session: {}", session_id)
                        }
                    },
                ],
            }
        }))
    }
}

fn color_rgb(status: Status) -> u32 {
    match status {
        Status::TaskComplete => 0x28a745,
        Status::ReviewComplete => 0x17a2b8,
        Status::Question => 0xffc107,
        Status::PlanReady => 0x007bff,
        Status::SessionLimitReached | Status::ApiError => 0xdc3545,
        Status::Unknown => 0x6c757d,
    }
}

fn hex_color(status: Status) -> String {
    format!("#{:06x}", color_rgb(status))
}

fn emoji(status: Status) -> &'static str {
    match status {
        Status::TaskComplete => "✅",
        Status::ReviewComplete => "🔍",
        Status::Question => "❓",
        Status::PlanReady => "📋",
        Status::SessionLimitReached => "⏱️",
        Status::ApiError => "🔴",
        Status::Unknown => "ℹ️",
    }
}

fn lark_template(status: Status) -> &'static str {
    match status {
        Status::TaskComplete => "green",
        Status::ReviewComplete => "yellow",
        Status::Question | Status::ApiError => "red",
        Status::PlanReady => "blue",
        Status::SessionLimitReached => "orange",
        Status::Unknown => "grey",
    }
}

// Telegram's HTML parse mode rejects unescaped <, > and &.
fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            _ => out.push(c),
        }
    }
    out
}
