//! `notify` — turns matching bus messages into desktop-style notifications.
//!
//! Notifications are emitted through the log backend under the
//! `mhub::notify` target, so any `tracing` subscriber layer can route them.

use async_trait::async_trait;
use glob::Pattern;
use serde_json::json;

use mhub_app::ports::{Plugin, PluginContext, Task};
use mhub_domain::error::HandlerError;
use mhub_domain::message::Message;
use mhub_domain::plugin_config::PluginConfig;

use crate::BuiltinError;

/// A notification derived from one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Summary line.
    pub title: String,
    /// Body text.
    pub message: String,
}

/// Shows a notification for every message whose action matches one of the
/// configured glob `patterns`.
#[derive(Debug, Default)]
pub struct Notify {
    patterns: Vec<Pattern>,
}

impl Notify {
    /// Build with already-chosen patterns.
    ///
    /// # Errors
    ///
    /// Returns [`BuiltinError::InvalidPattern`] for a malformed glob.
    pub fn with_patterns<S: AsRef<str>>(patterns: &[S]) -> Result<Self, BuiltinError> {
        let patterns = patterns
            .iter()
            .map(|pattern| {
                let pattern = pattern.as_ref();
                Pattern::new(pattern).map_err(|source| BuiltinError::InvalidPattern {
                    pattern: pattern.to_string(),
                    source,
                })
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { patterns })
    }

    /// Whether `action` matches any configured pattern.
    #[must_use]
    pub fn matches(&self, action: &str) -> bool {
        self.patterns.iter().any(|pattern| pattern.matches(action))
    }

    /// The notification to show for `message`, if any.
    #[must_use]
    pub fn notification(&self, message: &Message) -> Option<Notification> {
        let action = message.action_name()?;
        if !self.matches(action) {
            return None;
        }
        let text = |key: &str| {
            message
                .param(key)
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Some(Notification {
            title: text("title"),
            message: text("message"),
        })
    }
}

#[async_trait]
impl Plugin for Notify {
    fn name(&self) -> &str {
        "notify"
    }

    fn description(&self) -> &str {
        "Notifications"
    }

    fn default_config(&self) -> PluginConfig {
        PluginConfig::new().with("patterns", json!(["*"]))
    }

    async fn on_init(&mut self, ctx: PluginContext) -> Result<Vec<Task>, HandlerError> {
        let patterns = crate::list_or(ctx.config(), "patterns", &["*"])?;
        *self = Self::with_patterns(&patterns)?;
        tracing::debug!(?patterns, "notification patterns loaded");
        Ok(Vec::new())
    }

    fn handles_messages(&self) -> bool {
        true
    }

    async fn on_message(&mut self, message: &Message) -> Result<(), HandlerError> {
        if let Some(notification) = self.notification(message) {
            tracing::info!(
                target: "mhub::notify",
                title = %notification.title,
                message = %notification.message,
                "notification"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn should_match_glob_patterns() {
        let notify = Notify::with_patterns(&["lirc.*", "doorbell"]).unwrap();
        assert!(notify.matches("lirc.input"));
        assert!(notify.matches("doorbell"));
        assert!(!notify.matches("http.input"));
    }

    #[test]
    fn should_match_everything_with_star() {
        let notify = Notify::with_patterns(&["*"]).unwrap();
        assert!(notify.matches("byebyestandby.input"));
    }

    #[test]
    fn should_reject_malformed_pattern() {
        let result = Notify::with_patterns(&["[unclosed"]);
        assert!(matches!(result, Err(BuiltinError::InvalidPattern { .. })));
    }

    #[test]
    fn should_build_notification_from_params() {
        let notify = Notify::with_patterns(&["*"]).unwrap();
        let message = Message::action(
            "doorbell",
            json!({"title": "Front door", "message": "Someone is here"}),
        );

        assert_eq!(
            notify.notification(&message),
            Some(Notification {
                title: "Front door".to_string(),
                message: "Someone is here".to_string(),
            })
        );
    }

    #[test]
    fn should_default_missing_params_to_empty() {
        let notify = Notify::with_patterns(&["*"]).unwrap();
        let message = Message::action("ping", json!({}));
        let notification = notify.notification(&message).unwrap();
        assert!(notification.title.is_empty());
        assert!(notification.message.is_empty());
    }

    #[test]
    fn should_ignore_messages_without_action() {
        let notify = Notify::with_patterns(&["*"]).unwrap();
        assert!(notify.notification(&Message::new(json!({"title": "x"}))).is_none());
    }

    #[tokio::test]
    async fn should_load_patterns_from_config() {
        let mut notify = Notify::default();
        let (ctx, _producer) = testing::context(
            "notify",
            PluginConfig::new().with("patterns", json!(["http.*"])),
        );

        let tasks = notify.on_init(ctx).await.unwrap();

        assert!(tasks.is_empty());
        assert!(notify.matches("http.input"));
        assert!(!notify.matches("lirc.input"));
    }

    #[tokio::test]
    async fn should_fail_init_on_bad_pattern() {
        let mut notify = Notify::default();
        let (ctx, _producer) =
            testing::context("notify", PluginConfig::new().with("patterns", json!(["[x"])));
        assert!(matches!(notify.on_init(ctx).await, Err(HandlerError::Failed(_))));
    }
}
