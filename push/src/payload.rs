use loyalty_client_common::config::NotificationConfig;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Anything else the sender attached; forwarded untouched on click.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NotificationData {
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }
}

/// A notification as shown by the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub badge: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub require_interaction: bool,
    #[serde(default)]
    pub actions: Vec<NotificationAction>,
    #[serde(default)]
    pub data: NotificationData,
}

impl NotificationPayload {
    pub fn defaults(config: &NotificationConfig) -> Self {
        Self {
            title: config.title.clone(),
            body: config.body.clone(),
            icon: Some(config.icon.clone()),
            badge: Some(config.badge.clone()),
            tag: Some(config.tag.clone()),
            require_interaction: true,
            actions: vec![
                NotificationAction {
                    action: "view".into(),
                    title: "View".into(),
                    icon: Some(config.icon.clone()),
                },
                NotificationAction {
                    action: "dismiss".into(),
                    title: "Close".into(),
                    icon: None,
                },
            ],
            data: NotificationData::with_url(config.default_url.clone()),
        }
    }

    /// Build the notification for a push message body.
    ///
    /// A JSON object replaces the defaults key by key (top level only, so a
    /// `data` object replaces the default `data` entirely). Keys that are
    /// null or of the wrong type keep their default; unknown keys are
    /// ignored. Anything else keeps the defaults and uses the text as the
    /// body when non-empty.
    pub fn from_push(raw: Option<&[u8]>, config: &NotificationConfig) -> Self {
        let defaults = Self::defaults(config);
        let Some(raw) = raw else {
            return defaults;
        };

        match serde_json::from_slice::<Value>(raw) {
            Ok(Value::Object(overlay)) => defaults.overlay(overlay),
            Ok(Value::String(text)) => defaults.with_body(text),
            Ok(other) => {
                warn!(kind = json_kind(&other), "push payload is not an object");
                defaults
            }
            Err(e) => {
                warn!(error = %e, "push payload is not JSON, treating as text");
                defaults.with_body(String::from_utf8_lossy(raw).into_owned())
            }
        }
    }

    fn overlay(mut self, overlay: Map<String, Value>) -> Self {
        for (key, value) in overlay {
            if value.is_null() {
                continue;
            }
            match key.as_str() {
                "title" => set_field(&mut self.title, &key, value),
                "body" => set_field(&mut self.body, &key, value),
                "icon" => set_optional(&mut self.icon, &key, value),
                "badge" => set_optional(&mut self.badge, &key, value),
                "tag" => set_optional(&mut self.tag, &key, value),
                "requireInteraction" => set_field(&mut self.require_interaction, &key, value),
                "actions" => set_field(&mut self.actions, &key, value),
                "data" => set_field(&mut self.data, &key, value),
                _ => {}
            }
        }
        self
    }

    fn with_body(mut self, text: String) -> Self {
        if !text.trim().is_empty() {
            self.body = text;
        }
        self
    }
}

fn set_field<T: DeserializeOwned>(field: &mut T, key: &str, value: Value) {
    match serde_json::from_value(value) {
        Ok(v) => *field = v,
        Err(e) => warn!(key, error = %e, "ignoring invalid push payload field"),
    }
}

fn set_optional<T: DeserializeOwned>(field: &mut Option<T>, key: &str, value: Value) {
    match serde_json::from_value(value) {
        Ok(v) => *field = Some(v),
        Err(e) => warn!(key, error = %e, "ignoring invalid push payload field"),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
