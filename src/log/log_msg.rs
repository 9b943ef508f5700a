use std::time::SystemTime;

use crate::log::log_level::LogLevel;

/// One queued log line.
#[derive(Debug, Clone)]
pub struct LogMsg {
    pub level: LogLevel,
    /// Milliseconds since the UNIX epoch.
    pub ts_ms: u128,
    pub text: String,
    /// Module path of the call site.
    pub target: &'static str,
}

impl LogMsg {
    pub fn new(level: LogLevel, text: impl Into<String>, target: &'static str) -> Self {
        Self {
            level,
            ts_ms: now_millis(),
            text: text.into(),
            target,
        }
    }

    /// Single-line rendering used by the file writer and the console mirror.
    #[must_use]
    pub fn render(&self) -> String {
        format!("[{}] {} {} | {}", self.level, self.ts_ms, self.target, self.text)
    }
}

pub fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_contains_level_target_and_text() {
        let m = LogMsg::new(LogLevel::Warn, "target unreachable", "callrelay::signaling");
        let line = m.render();
        assert!(line.starts_with("[WARN] "));
        assert!(line.contains("callrelay::signaling | target unreachable"));
        assert!(m.ts_ms > 0);
    }
}
