//! Display collaborator
//!
//! The orchestrator drives a display (button title, image, ok/alert flashes,
//! property-inspector log lines) through `DisplaySink`. Every call returns a
//! `SideEffect`, which the caller inspects and discards; a cosmetic failure
//! never changes a dispatch outcome.

use std::path::Path;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use tracing::debug;

use crate::config::DispatchSettings;
use crate::error::{Error, Result};
use crate::logstore::LogLevel;

/// Structured log line sent to the display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEvent {
    pub message: String,
    pub level: LogLevel,
}

impl LogEvent {
    pub fn new(message: impl Into<String>, level: LogLevel) -> Self {
        Self {
            message: message.into(),
            level,
        }
    }
}

/// Result of a cosmetic call
#[must_use = "side effects must be discarded explicitly"]
#[derive(Debug)]
pub struct SideEffect(Result<()>);

impl SideEffect {
    pub fn done() -> Self {
        SideEffect(Ok(()))
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        SideEffect(Err(Error::Display(reason.into())))
    }

    /// Drop the result; a failure is logged and suppressed.
    /// Returns true when a failure was suppressed.
    pub fn discard(self, what: &str) -> bool {
        match self.0 {
            Ok(()) => false,
            Err(e) => {
                debug!("[display] {} suppressed: {}", what, e);
                true
            }
        }
    }

    pub fn into_result(self) -> Result<()> {
        self.0
    }
}

impl From<Result<()>> for SideEffect {
    fn from(result: Result<()>) -> Self {
        SideEffect(result)
    }
}

/// Display collaborator driven by the orchestrator
#[async_trait]
pub trait DisplaySink: Send + Sync {
    /// Forward a log line (property inspector)
    async fn log(&self, event: &LogEvent) -> SideEffect;

    async fn set_title(&self, title: &str) -> SideEffect;

    /// Set the indicator image, `None` restores the default image
    async fn set_image(&self, image: Option<&str>) -> SideEffect;

    async fn show_ok(&self) -> SideEffect;

    async fn show_alert(&self) -> SideEffect;
}

/// Display that writes log lines to stdout and everything else to tracing
#[derive(Debug, Default)]
pub struct ConsoleDisplay;

impl ConsoleDisplay {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DisplaySink for ConsoleDisplay {
    async fn log(&self, event: &LogEvent) -> SideEffect {
        println!("[{}] {}", event.level.as_str().to_uppercase(), event.message);
        SideEffect::done()
    }

    async fn set_title(&self, title: &str) -> SideEffect {
        debug!("[display] title {:?}", title);
        SideEffect::done()
    }

    async fn set_image(&self, image: Option<&str>) -> SideEffect {
        debug!("[display] image {}", if image.is_some() { "custom" } else { "default" });
        SideEffect::done()
    }

    async fn show_ok(&self) -> SideEffect {
        debug!("[display] ok");
        SideEffect::done()
    }

    async fn show_alert(&self) -> SideEffect {
        debug!("[display] alert");
        SideEffect::done()
    }
}

/// Title lines for the shown fields (name, ip, port), joined by newlines
pub fn compose_title(settings: &DispatchSettings) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(3);
    if settings.show_name.unwrap_or(false) {
        parts.push(settings.name.clone().unwrap_or_default());
    }
    if settings.show_ip.unwrap_or(false) {
        parts.push(settings.ip.clone().unwrap_or_default());
    }
    if settings.show_port.unwrap_or(false) {
        parts.push(settings.port.map(|p| p.to_string()).unwrap_or_default());
    }
    parts.join("\n")
}

/// Load an image file as a PNG data URL
pub async fn image_data_url(path: impl AsRef<Path>) -> Result<String> {
    let data = tokio::fs::read(path.as_ref()).await?;
    Ok(format!("data:image/png;base64,{}", STANDARD.encode(data)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_title_respects_flags() {
        let settings = DispatchSettings {
            name: Some("Lights".to_string()),
            ip: Some("10.0.0.5".to_string()),
            port: Some(7000),
            show_name: Some(true),
            show_ip: Some(false),
            show_port: Some(true),
            ..Default::default()
        };
        assert_eq!(compose_title(&settings), "Lights\n7000");
    }

    #[test]
    fn test_compose_title_empty_when_nothing_shown() {
        assert_eq!(compose_title(&DispatchSettings::default()), "");
    }

    #[test]
    fn test_side_effect_discard() {
        assert!(!SideEffect::done().discard("title"));
        assert!(SideEffect::failed("gone").discard("title"));
        assert!(SideEffect::from(Err(Error::Display("x".into())))
            .into_result()
            .is_err());
    }

    #[tokio::test]
    async fn test_image_data_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bg.png");
        std::fs::write(&path, b"PNG").unwrap();
        assert_eq!(
            image_data_url(&path).await.unwrap(),
            "data:image/png;base64,UE5H"
        );
        assert!(image_data_url(dir.path().join("missing.png")).await.is_err());
    }
}
