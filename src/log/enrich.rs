//! Attribute rewrites applied to every record before encoding.
//!
//! - `time` values are rendered as `YYYY-MM-DD HH:MM:SS.mmm` local time.
//! - When stack expansion is on, error values under `err` or `error` become a
//!   group of `msg`, `type` and `stack`.

use std::backtrace::{Backtrace, BacktraceStatus};

use super::{
    handler::ReplaceAttr,
    record::{Attr, Value, TIME_KEY},
};

/// Timestamp layout used for the `time` attribute.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// The record enricher, installed as the encoders' [`ReplaceAttr`] hook.
#[derive(Debug, Clone, Copy, Default)]
pub struct Enricher {
    error_stack: bool,
}

impl Enricher {
    pub fn new(error_stack: bool) -> Self {
        Self { error_stack }
    }

    pub fn rewrite(&self, attr: Attr) -> Attr {
        let Attr { key, value } = attr;
        match value {
            Value::Time(t) if key == TIME_KEY => {
                Attr::string(key, t.format(TIME_FORMAT).to_string())
            }
            Value::Error(err) if self.error_stack && matches!(key.as_str(), "err" | "error") => {
                Attr::group(
                    key,
                    vec![
                        Attr::string("msg", err.message),
                        Attr::string("type", err.type_name),
                        Attr::string("stack", capture_stack()),
                    ],
                )
            }
            value => Attr { key, value },
        }
    }
}

impl ReplaceAttr for Enricher {
    fn replace(&self, _groups: &[String], attr: Attr) -> Attr {
        self.rewrite(attr)
    }
}

/// Capture the current stack, or an empty string when unavailable.
pub fn capture_stack() -> String {
    let trace = Backtrace::force_capture();
    if trace.status() != BacktraceStatus::Captured {
        return String::new();
    }
    trim_capture_frames(&trace.to_string())
}

/// Drop the leading frames that belong to the capture itself.
fn trim_capture_frames(trace: &str) -> String {
    let mut lines = trace.lines().peekable();
    while let Some(line) = lines.peek() {
        if !is_frame_header(line) || !is_capture_frame(line) {
            break;
        }
        lines.next();
        while lines.peek().is_some_and(|l| !is_frame_header(l)) {
            lines.next();
        }
    }
    lines.collect::<Vec<_>>().join("\n")
}

fn is_frame_header(line: &str) -> bool {
    let trimmed = line.trim_start();
    let digits = trimmed.chars().take_while(char::is_ascii_digit).count();
    digits > 0 && trimmed[digits..].starts_with(':')
}

fn is_capture_frame(line: &str) -> bool {
    line.contains("backtrace") || line.contains("capture_stack") || line.contains("Enricher")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::record::ErrorValue;
    use chrono::{Local, TimeZone};

    #[test]
    fn time_is_formatted_with_millis() {
        let t = Local
            .with_ymd_and_hms(2024, 5, 15, 9, 3, 7)
            .unwrap()
            + chrono::Duration::milliseconds(42);
        let attr = Enricher::new(false).rewrite(Attr::new(TIME_KEY, Value::Time(t)));
        assert_eq!(attr, Attr::string(TIME_KEY, "2024-05-15 09:03:07.042"));
    }

    #[test]
    fn non_time_value_under_time_key_passes_through() {
        let attr = Attr::string(TIME_KEY, "yesterday");
        assert_eq!(Enricher::new(true).rewrite(attr.clone()), attr);
    }

    #[test]
    fn error_expands_into_group_when_enabled() {
        let err = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let attr = Enricher::new(true).rewrite(Attr::error("err", &err));

        let Value::Group(members) = attr.value else {
            panic!("expected group, got {:?}", attr.value);
        };
        assert_eq!(attr.key, "err");
        let keys: Vec<&str> = members.iter().map(|a| a.key.as_str()).collect();
        assert_eq!(keys, ["msg", "type", "stack"]);
        assert_eq!(members[0].value.as_str(), Some("disk full"));
        assert!(!members[1].value.as_str().unwrap_or_default().is_empty());
    }

    #[test]
    fn error_passes_through_when_disabled() {
        let attr = Attr::new(
            "error",
            ErrorValue {
                message: "boom".into(),
                type_name: "Boom".into(),
            },
        );
        assert_eq!(Enricher::new(false).rewrite(attr.clone()), attr);
    }

    #[test]
    fn non_error_values_and_other_keys_pass_through() {
        let enricher = Enricher::new(true);
        let plain = Attr::string("err", "just text");
        assert_eq!(enricher.rewrite(plain.clone()), plain);

        let other = Attr::new(
            "cause",
            ErrorValue {
                message: "boom".into(),
                type_name: "Boom".into(),
            },
        );
        assert_eq!(enricher.rewrite(other.clone()), other);
    }

    #[test]
    fn capture_frames_are_trimmed() {
        let trace = "   0: std::backtrace::Backtrace::force_capture\n             at /rustc/library/std/src/backtrace.rs:312:9\n   1: httpkit::log::enrich::capture_stack\n             at ./src/log/enrich.rs:60:17\n   2: app::handler\n             at ./src/main.rs:10:5\n   3: main";
        assert_eq!(
            trim_capture_frames(trace),
            "   2: app::handler\n             at ./src/main.rs:10:5\n   3: main"
        );
    }

    #[test]
    fn trace_without_capture_frames_is_unchanged() {
        let trace = "   0: app::handler\n   1: main";
        assert_eq!(trim_capture_frames(trace), trace);
        assert_eq!(trim_capture_frames(""), "");
    }
}
