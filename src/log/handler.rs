//! The [`LogHandler`] capability and the pieces shared by every encoder.
//!
//! Handlers compose by wrapping: an encoder renders records to a sink, the
//! correlating handler wraps any handler to add the request ID. Scoping calls
//! (`with_attrs`, `with_group`) return a new handler and never mutate the
//! receiver, so one configured logger can be shared by every request.

use std::{fmt, io, sync::Arc};

use crate::context::RequestContext;

use super::{
    record::{Attr, Level, Record, Value, LEVEL_KEY, MESSAGE_KEY, TIME_KEY},
    writer::RecordWriter,
};

/// A destination for log records.
pub trait LogHandler: Send + Sync {
    /// Whether a record at `level` would be handled.
    fn enabled(&self, ctx: Option<&RequestContext>, level: Level) -> bool;

    /// Handle one record. Errors come from the underlying sink.
    fn handle(&self, ctx: Option<&RequestContext>, record: Record) -> io::Result<()>;

    /// A handler whose records all carry `attrs`.
    fn with_attrs(&self, attrs: Vec<Attr>) -> Arc<dyn LogHandler>;

    /// A handler that nests all further attributes under `name`.
    fn with_group(&self, name: &str) -> Arc<dyn LogHandler>;
}

/// Per-attribute rewrite hook applied by the encoders.
///
/// `groups` is the path of enclosing group names, outermost first. Returning
/// an attribute with an empty key drops it.
pub trait ReplaceAttr: Send + Sync {
    fn replace(&self, groups: &[String], attr: Attr) -> Attr;
}

impl<F> ReplaceAttr for F
where
    F: Fn(&[String], Attr) -> Attr + Send + Sync,
{
    fn replace(&self, groups: &[String], attr: Attr) -> Attr {
        self(groups, attr)
    }
}

/// Options shared by the JSON, text and dev encoders.
#[derive(Clone, Default)]
pub struct HandlerOptions {
    /// Minimum level to emit.
    pub level: Level,
    /// Include call-site information under `source`.
    pub add_source: bool,
    pub replace_attr: Option<Arc<dyn ReplaceAttr>>,
}

impl fmt::Debug for HandlerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerOptions")
            .field("level", &self.level)
            .field("add_source", &self.add_source)
            .field("replace_attr", &self.replace_attr.is_some())
            .finish()
    }
}

impl HandlerOptions {
    pub fn enabled(&self, level: Level) -> bool {
        level >= self.level
    }

    /// Apply `replace_attr` to every non-group attribute, depth first.
    ///
    /// Groups left empty after rewriting are removed.
    pub fn rewrite(&self, groups: &mut Vec<String>, attrs: Vec<Attr>) -> Vec<Attr> {
        let mut out = Vec::with_capacity(attrs.len());
        for attr in attrs {
            match attr.value {
                Value::Group(members) => {
                    groups.push(attr.key.clone());
                    let members = self.rewrite(groups, members);
                    groups.pop();
                    if !members.is_empty() {
                        out.push(Attr::group(attr.key, members));
                    }
                }
                value => {
                    let attr = Attr { key: attr.key, value };
                    let attr = match &self.replace_attr {
                        Some(replace) => replace.replace(groups, attr),
                        None => attr,
                    };
                    if !attr.key.is_empty() {
                        out.push(attr);
                    }
                }
            }
        }
        out
    }
}

/// Attributes and groups accumulated through `with_attrs` / `with_group`.
#[derive(Debug, Clone, Default)]
pub struct AttrScope {
    preset: Vec<Attr>,
    groups: Vec<String>,
}

impl AttrScope {
    /// Attrs are placed inside the groups that are open right now.
    pub fn with_attrs(&self, attrs: Vec<Attr>) -> Self {
        let mut next = self.clone();
        if !attrs.is_empty() {
            insert_at(&mut next.preset, &self.groups, attrs);
        }
        next
    }

    pub fn with_group(&self, name: &str) -> Self {
        let mut next = self.clone();
        if !name.is_empty() {
            next.groups.push(name.to_owned());
        }
        next
    }

    /// Merge a record's attributes into the scope.
    pub fn resolve(&self, attrs: Vec<Attr>) -> Vec<Attr> {
        let mut out = self.preset.clone();
        if !attrs.is_empty() {
            insert_at(&mut out, &self.groups, attrs);
        }
        out
    }
}

fn insert_at(target: &mut Vec<Attr>, path: &[String], attrs: Vec<Attr>) {
    let Some((head, rest)) = path.split_first() else {
        target.extend(attrs);
        return;
    };
    let index = match target
        .iter()
        .rposition(|a| &a.key == head && a.value.is_group())
    {
        Some(index) => index,
        None => {
            target.push(Attr::group(head.clone(), Vec::new()));
            target.len() - 1
        }
    };
    if let Value::Group(members) = &mut target[index].value {
        insert_at(members, rest, attrs);
    }
}

/// A record after scoping and rewriting, ready to be rendered.
#[derive(Debug, Clone)]
pub struct Prepared {
    /// Built-in attributes in output order: time, level, source, msg.
    pub builtins: Vec<Attr>,
    pub attrs: Vec<Attr>,
}

impl Prepared {
    pub fn builtin(&self, key: &str) -> Option<&Value> {
        self.builtins.iter().find(|a| a.key == key).map(|a| &a.value)
    }
}

/// State common to the three encoders.
#[derive(Clone)]
pub struct EncoderCore {
    pub opts: HandlerOptions,
    pub scope: AttrScope,
    pub writer: Arc<dyn RecordWriter>,
}

impl EncoderCore {
    pub fn new(writer: Arc<dyn RecordWriter>, opts: HandlerOptions) -> Self {
        Self {
            opts,
            scope: AttrScope::default(),
            writer,
        }
    }

    pub fn with_attrs(&self, attrs: Vec<Attr>) -> Self {
        Self {
            scope: self.scope.with_attrs(attrs),
            ..self.clone()
        }
    }

    pub fn with_group(&self, name: &str) -> Self {
        Self {
            scope: self.scope.with_group(name),
            ..self.clone()
        }
    }

    pub fn prepare(&self, record: Record) -> Prepared {
        let mut builtins = vec![
            Attr::new(TIME_KEY, Value::Time(record.time)),
            Attr::string(LEVEL_KEY, record.level.as_str()),
        ];
        if self.opts.add_source {
            if let Some(source) = &record.source {
                builtins.push(source.to_attr());
            }
        }
        builtins.push(Attr::string(MESSAGE_KEY, record.message));

        let mut groups = Vec::new();
        let builtins = self.opts.rewrite(&mut groups, builtins);
        let attrs = self.opts.rewrite(&mut groups, self.scope.resolve(record.attrs));
        Prepared { builtins, attrs }
    }
}
