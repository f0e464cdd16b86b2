//! Static HTML rendering of the request log

use std::fmt::Write as _;

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use super::{LogLevel, LogRecord};

/// Seconds between browser reloads of the rendered document
const REFRESH_SECS: u32 = 5;

/// Escape text for an HTML element body
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

fn color(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Info => "#00ff00",
        LogLevel::Error => "#ff0000",
        LogLevel::Warning => "#ffaa00",
        LogLevel::Success => "#00ffff",
    }
}

/// Render the whole document for `records`, oldest first
pub fn render_document<'a>(
    records: impl ExactSizeIterator<Item = &'a LogRecord>,
    capacity: usize,
    rendered_at: OffsetDateTime,
) -> String {
    let count = records.len();
    let mut lines = String::new();
    for record in records {
        let t = record.timestamp;
        // Writing to a String cannot fail
        let _ = writeln!(
            lines,
            "      <div class=\"line {}\" style=\"color: {};\">[{:02}:{:02}:{:02}] {}</div>",
            record.level,
            color(record.level),
            t.hour(),
            t.minute(),
            t.second(),
            escape_html(&record.message)
        );
    }

    let body = if count == 0 {
        "      <div class=\"empty\">No log entries yet. Waiting for requests...</div>\n".to_string()
    } else {
        lines
    };

    let hint = format!(
        "Showing {} latest log{}{}",
        count,
        if count == 1 { "" } else { "s" },
        if count >= capacity { " (max reached)" } else { "" }
    );

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <meta http-equiv="refresh" content="{refresh}" />
  <title>Janus Cast - Request Logs</title>
  <style>
    body {{ background: #1a0f0a; color: #f4e8d8; font-family: Georgia, serif; padding: 20px; }}
    .line {{ font-family: ui-monospace, Menlo, Consolas, monospace; font-size: 0.9rem; margin-bottom: 4px; white-space: pre-wrap; }}
    .empty {{ text-align: center; opacity: 0.6; padding: 80px 0; color: #d4af37; font-style: italic; }}
    #hint {{ text-align: center; color: #d4af37; font-style: italic; margin-bottom: 16px; }}
  </style>
</head>
<body>
  <header>
    <h1>Request Logs</h1>
    <p>Rendered: {rendered}</p>
  </header>
  <main>
    <div id="hint">{hint}</div>
    <div id="log-container">
{body}    </div>
  </main>
</body>
</html>
"#,
        refresh = REFRESH_SECS,
        rendered = rendered_at.format(&Rfc3339).unwrap_or_default(),
        hint = hint,
        body = body,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn record(level: LogLevel, message: &str) -> LogRecord {
        LogRecord {
            timestamp: datetime!(2026-10-15 08:09:10 UTC),
            level,
            message: message.to_string(),
        }
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<b>&\"x\""), "&lt;b&gt;&amp;&quot;x&quot;");
    }

    #[test]
    fn test_render_lines_with_level_colors() {
        let records = vec![
            record(LogLevel::Error, "TCP request failed: <refused>"),
            record(LogLevel::Success, "done"),
        ];
        let html = render_document(records.iter(), 500, datetime!(2026-10-15 08:10:00 UTC));

        assert!(html.contains("[08:09:10] TCP request failed: &lt;refused&gt;"));
        assert!(html.contains("color: #ff0000;"));
        assert!(html.contains("color: #00ffff;"));
        assert!(html.contains("Showing 2 latest logs<"));
        assert!(html.contains("Rendered: 2026-10-15T08:10:00Z"));
    }

    #[test]
    fn test_render_single_and_full() {
        let one = vec![record(LogLevel::Info, "a")];
        let html = render_document(one.iter(), 1, OffsetDateTime::UNIX_EPOCH);
        assert!(html.contains("Showing 1 latest log (max reached)"));
    }
}
