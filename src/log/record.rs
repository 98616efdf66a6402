//! Structured log records.
//!
//! A [`Record`] is a level, a message and an ordered list of [`Attr`]s.
//! Nested structure is kept as named groups rather than flattened keys; the
//! encoders decide how to render a group.

use std::{error::Error as StdError, fmt, str::FromStr, time::Duration};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Key of the built-in timestamp attribute.
pub const TIME_KEY: &str = "time";
/// Key of the built-in level attribute.
pub const LEVEL_KEY: &str = "level";
/// Key of the built-in message attribute.
pub const MESSAGE_KEY: &str = "msg";
/// Key of the built-in call-site attribute.
pub const SOURCE_KEY: &str = "source";

/// Log severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<tracing::Level> for Level {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => Self::Trace,
            tracing::Level::DEBUG => Self::Debug,
            tracing::Level::INFO => Self::Info,
            tracing::Level::WARN => Self::Warn,
            tracing::Level::ERROR => Self::Error,
        }
    }
}

/// Returned when a level name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown log level `{0}`")]
pub struct ParseLevelError(String);

impl FromStr for Level {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _ => Err(ParseLevelError(s.to_owned())),
        }
    }
}

impl<'de> Deserialize<'de> for Level {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// An error captured as a log value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorValue {
    pub message: String,
    pub type_name: String,
}

impl ErrorValue {
    /// Capture a concrete error, keeping its Rust type name.
    pub fn new<E>(err: &E) -> Self
    where
        E: StdError + ?Sized,
    {
        Self {
            message: err.to_string(),
            type_name: std::any::type_name::<E>().to_owned(),
        }
    }

    /// Capture a type-erased error.
    ///
    /// The concrete type is unknown behind `dyn Error`; a few common types are
    /// recognised by downcasting, everything else is named after the leading
    /// identifier of its `Debug` output (the struct or variant name).
    pub fn from_dyn(err: &(dyn StdError + 'static)) -> Self {
        let type_name = if err.is::<std::io::Error>() {
            std::any::type_name::<std::io::Error>().to_owned()
        } else if err.is::<std::fmt::Error>() {
            std::any::type_name::<std::fmt::Error>().to_owned()
        } else {
            debug_type_name(err)
        };
        Self {
            message: err.to_string(),
            type_name,
        }
    }
}

fn debug_type_name(err: &dyn StdError) -> String {
    let debug = format!("{err:?}");
    let name: String = debug
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == ':')
        .collect();
    if name.is_empty() {
        "dyn Error".to_owned()
    } else {
        name
    }
}

impl fmt::Display for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Value of a log attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    I64(i64),
    U64(u64),
    F64(f64),
    Bool(bool),
    Time(DateTime<Local>),
    Duration(Duration),
    Error(ErrorValue),
    List(Vec<Value>),
    Group(Vec<Attr>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, Self::Group(_))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::I64(n) => write!(f, "{n}"),
            Self::U64(n) => write!(f, "{n}"),
            Self::F64(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Time(t) => f.write_str(&t.to_rfc3339_opts(chrono::SecondsFormat::Millis, false)),
            Self::Duration(d) => write!(f, "{d:?}"),
            Self::Error(e) => f.write_str(&e.message),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Group(attrs) => {
                f.write_str("[")?;
                for (i, attr) in attrs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}={}", attr.key, attr.value)?;
                }
                f.write_str("]")
            }
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident $(as $cast:ty)?),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Self::$variant(v $(as $cast)?)
                }
            }
        )*
    };
}

value_from! {
    String => Str,
    i64 => I64,
    i32 => I64 as i64,
    u64 => U64,
    u32 => U64 as u64,
    u16 => U64 as u64,
    usize => U64 as u64,
    f64 => F64,
    bool => Bool,
    DateTime<Local> => Time,
    Duration => Duration,
    ErrorValue => Error,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_owned())
    }
}

/// A key/value pair attached to a record.
#[derive(Debug, Clone, PartialEq)]
pub struct Attr {
    pub key: String,
    pub value: Value,
}

impl Attr {
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn string(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(key, Value::Str(value.into()))
    }

    pub fn int(key: impl Into<String>, value: i64) -> Self {
        Self::new(key, Value::I64(value))
    }

    pub fn uint(key: impl Into<String>, value: u64) -> Self {
        Self::new(key, Value::U64(value))
    }

    pub fn float(key: impl Into<String>, value: f64) -> Self {
        Self::new(key, Value::F64(value))
    }

    pub fn bool(key: impl Into<String>, value: bool) -> Self {
        Self::new(key, Value::Bool(value))
    }

    pub fn duration(key: impl Into<String>, value: Duration) -> Self {
        Self::new(key, Value::Duration(value))
    }

    /// Attach a concrete error value.
    pub fn error<E>(key: impl Into<String>, err: &E) -> Self
    where
        E: StdError + ?Sized,
    {
        Self::new(key, Value::Error(ErrorValue::new(err)))
    }

    pub fn group(key: impl Into<String>, attrs: Vec<Attr>) -> Self {
        Self::new(key, Value::Group(attrs))
    }
}

/// Insert `value` under a dotted `path`, creating or extending groups.
///
/// `insert_dotted(attrs, "requestDuration.millis", 12)` appends `millis` to
/// the existing `requestDuration` group or creates one at the end.
pub fn insert_dotted(attrs: &mut Vec<Attr>, path: &str, value: Value) {
    match path.split_once('.') {
        Some((head, rest)) if !head.is_empty() && !rest.is_empty() => {
            let existing = attrs
                .iter()
                .rposition(|a| a.key == head && a.value.is_group());
            if let Some(i) = existing {
                if let Value::Group(members) = &mut attrs[i].value {
                    insert_dotted(members, rest, value);
                    return;
                }
            }
            let mut members = Vec::new();
            insert_dotted(&mut members, rest, value);
            attrs.push(Attr::group(head, members));
        }
        _ => attrs.push(Attr::new(path, value)),
    }
}

/// Call-site information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub function: String,
    pub file: String,
    pub line: u32,
}

impl Source {
    /// Call site of the caller, without a function name.
    #[track_caller]
    pub fn caller() -> Self {
        let location = std::panic::Location::caller();
        Self {
            function: String::new(),
            file: location.file().to_owned(),
            line: location.line(),
        }
    }

    pub fn to_attr(&self) -> Attr {
        let mut members = Vec::with_capacity(3);
        if !self.function.is_empty() {
            members.push(Attr::string("function", self.function.clone()));
        }
        members.push(Attr::string("file", self.file.clone()));
        members.push(Attr::uint("line", u64::from(self.line)));
        Attr::group(SOURCE_KEY, members)
    }
}

/// One log event.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub time: DateTime<Local>,
    pub level: Level,
    pub message: String,
    pub attrs: Vec<Attr>,
    pub source: Option<Source>,
}

impl Record {
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            time: Local::now(),
            level,
            message: message.into(),
            attrs: Vec::new(),
            source: None,
        }
    }

    pub fn with_attrs(mut self, attrs: impl IntoIterator<Item = Attr>) -> Self {
        self.attrs.extend(attrs);
        self
    }

    pub fn add_attr(&mut self, attr: Attr) {
        self.attrs.push(attr);
    }

    /// Find a top-level attribute by key.
    pub fn attr(&self, key: &str) -> Option<&Value> {
        self.attrs.iter().find(|a| a.key == key).map(|a| &a.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_parses_case_insensitively() {
        assert_eq!("INFO".parse::<Level>(), Ok(Level::Info));
        assert_eq!("warning".parse::<Level>(), Ok(Level::Warn));
        assert_eq!(" debug ".parse::<Level>(), Ok(Level::Debug));
        assert!("verbose".parse::<Level>().is_err());
    }

    #[test]
    fn levels_are_ordered_by_severity() {
        assert!(Level::Trace < Level::Debug);
        assert!(Level::Info < Level::Warn);
        assert!(Level::Warn < Level::Error);
    }

    #[test]
    fn dotted_paths_nest_into_groups() {
        let mut attrs = vec![Attr::int("status", 200)];
        insert_dotted(&mut attrs, "requestDuration.millis", Value::I64(12));
        insert_dotted(&mut attrs, "requestDuration.seconds", Value::F64(0.012));
        insert_dotted(&mut attrs, "a.b.c", Value::Bool(true));

        assert_eq!(
            attrs,
            vec![
                Attr::int("status", 200),
                Attr::group(
                    "requestDuration",
                    vec![Attr::int("millis", 12), Attr::float("seconds", 0.012)]
                ),
                Attr::group("a", vec![Attr::group("b", vec![Attr::bool("c", true)])]),
            ]
        );
    }

    #[test]
    fn malformed_dotted_paths_stay_flat() {
        let mut attrs = Vec::new();
        insert_dotted(&mut attrs, ".hidden", Value::I64(1));
        insert_dotted(&mut attrs, "trailing.", Value::I64(2));
        assert_eq!(attrs[0].key, ".hidden");
        assert_eq!(attrs[1].key, "trailing.");
    }

    #[test]
    fn error_value_keeps_concrete_type_name() {
        let err = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let value = ErrorValue::new(&err);
        assert_eq!(value.message, "disk full");
        assert!(value.type_name.ends_with("io::error::Error"), "{}", value.type_name);
    }

    #[test]
    fn dyn_error_type_name_comes_from_debug_output() {
        let err = "x".parse::<u8>().unwrap_err();
        let value = ErrorValue::from_dyn(&err);
        assert_eq!(value.type_name, "ParseIntError");

        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        assert!(ErrorValue::from_dyn(&io).type_name.contains("io"));
    }
}
