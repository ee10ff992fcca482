//! Log output stamped with Peru civil time

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use chrono_tz::America::Lima;
use tracing::Level;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::EnvFilter;

/// Pattern used by [`setup_logger`]
pub const DEFAULT_PATTERN: &str = "%Y-%m-%d %H:%M:%S%z";

/// Event timer rendering America/Lima time, RFC 3339 unless a pattern is given
#[derive(Debug, Clone, Default)]
pub struct LimaTime {
    pattern: Option<String>,
}

impl LimaTime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pattern(pattern: &str) -> Self {
        Self {
            pattern: Some(pattern.to_string()),
        }
    }
}

impl FormatTime for LimaTime {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write_lima(w, Utc::now(), self.pattern.as_deref())
    }
}

fn write_lima<W: std::fmt::Write>(
    w: &mut W,
    at: DateTime<Utc>,
    pattern: Option<&str>,
) -> std::fmt::Result {
    let local = at.with_timezone(&Lima);
    match pattern {
        Some(pattern) => write!(w, "{}", local.format(pattern)),
        None => write!(w, "{}", local.to_rfc3339()),
    }
}

pub fn format_lima(at: DateTime<Utc>, pattern: Option<&str>) -> Result<String> {
    let mut out = String::new();
    write_lima(&mut out, at, pattern).map_err(|_| anyhow!("Invalid time pattern: {:?}", pattern))?;
    Ok(out)
}

/// Install the global subscriber. `RUST_LOG` takes precedence over `level`.
pub fn setup_logger(level: Level) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_timer(LimaTime::with_pattern(DEFAULT_PATTERN))
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow!("Failed to install logger: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io;
    use std::sync::{Arc, Mutex};

    fn noon_utc() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 17, 0, 0).unwrap()
    }

    #[test]
    fn test_iso_by_default() {
        assert_eq!(
            format_lima(noon_utc(), None).unwrap(),
            "2024-01-15T12:00:00-05:00"
        );
    }

    #[test]
    fn test_custom_pattern() {
        assert_eq!(
            format_lima(noon_utc(), Some(DEFAULT_PATTERN)).unwrap(),
            "2024-01-15 12:00:00-0500"
        );
    }

    #[test]
    fn test_date_rolls_back_across_midnight() {
        let early = Utc.with_ymd_and_hms(2024, 1, 16, 3, 30, 0).unwrap();
        assert_eq!(format_lima(early, Some("%Y-%m-%d %H:%M")).unwrap(), "2024-01-15 22:30");
    }

    #[test]
    fn test_invalid_pattern_is_an_error() {
        assert!(format_lima(noon_utc(), Some("%Q")).is_err());
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_events_carry_lima_offset() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_timer(LimaTime::with_pattern(DEFAULT_PATTERN))
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        {
            let _guard = tracing::subscriber::set_default(subscriber);
            tracing::info!("listing folder 2024");
        }

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("-0500"), "{}", output);
        assert!(output.contains("listing folder 2024"), "{}", output);
    }
}
