use crate::{
    compiler::{self, Compiler},
    error::Error,
    matcher::{Matcher, NodeId},
    value::Value,
};
use log::debug;
use regex::Regex;
use std::{any::Any, collections::HashMap, sync::Arc};

pub(crate) type BuilderFn = fn(&mut Compiler<'_>, &Value) -> Result<NodeId, Error>;

/// Regex support for `$regex` conditions and regex-valued literals.
///
/// The pattern handed to [`RegexAdapter::is_match`] is whatever
/// [`RegexAdapter::prepare`] returned at compile time, so an adapter can
/// compile `String` patterns once and fail early on bad ones.
pub trait RegexAdapter: Send + Sync {
    fn prepare(&self, pattern: &Value) -> Result<Value, Error> {
        Ok(pattern.clone())
    }

    fn is_match(&self, pattern: &Value, subject: &str) -> bool;

    fn stringify(&self, _pattern: &Value) -> String {
        "//".to_owned()
    }
}

/// The default adapter, backed by the `regex` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultRegexAdapter;

impl RegexAdapter for DefaultRegexAdapter {
    fn prepare(&self, pattern: &Value) -> Result<Value, Error> {
        match pattern {
            Value::String(source) => Regex::new(source)
                .map(|compiled| Value::Regex(Arc::new(compiled)))
                .map_err(|error| {
                    Error::InvalidArgument(format!("$regex pattern does not compile: {error}"))
                }),
            Value::Regex(_) => Ok(pattern.clone()),
            other => Err(Error::InvalidArgument(format!(
                "$regex condition must be a String or a Regex, got {}",
                other.type_name()
            ))),
        }
    }

    fn is_match(&self, pattern: &Value, subject: &str) -> bool {
        match pattern {
            Value::Regex(compiled) => compiled.is_match(subject),
            Value::String(source) => Regex::new(source)
                .map(|compiled| compiled.is_match(subject))
                .unwrap_or(false),
            _ => false,
        }
    }

    fn stringify(&self, pattern: &Value) -> String {
        match pattern {
            Value::Regex(compiled) => format!("/{}/", compiled.as_str()),
            Value::String(source) => format!("/{source}/"),
            _ => "//".to_owned(),
        }
    }
}

/// An adapter that never matches, for hosts whose regexes live entirely on
/// the binding side.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRegexAdapter;

impl RegexAdapter for NullRegexAdapter {
    fn is_match(&self, _pattern: &Value, _subject: &str) -> bool {
        false
    }
}

/// Host hook for operators discovered dynamically.
///
/// When the compiler meets a `$`-prefixed key with no built-in constructor,
/// it asks the installed adapter via [`CustomMatcher::lookup`]; on a hit the
/// built [`CustomPredicate`] becomes an external leaf of the tree.
pub trait CustomMatcher: Send + Sync {
    fn lookup(&self, key: &str) -> bool;

    fn build(&self, key: &str, condition: &Value) -> Result<Arc<dyn CustomPredicate>, Error>;
}

pub trait CustomPredicate: Send + Sync {
    /// `None` means the record value is missing at this position.
    fn is_match(&self, record: Option<&Value>) -> bool;
}

/// Conversion hooks for binding-owned values.
///
/// `shallow_convert` runs whenever field extraction yields an
/// [`Value::External`]; `deep_convert` and `recover` are offered to binding
/// layers that translate whole records at the boundary.
pub trait ValueConverter: Send + Sync {
    fn shallow_convert(&self, _external: &(dyn Any + Send + Sync)) -> Option<Value> {
        None
    }

    fn deep_convert(&self, _external: &(dyn Any + Send + Sync)) -> Option<Value> {
        None
    }

    fn recover(&self, _value: &Value) -> Option<Arc<dyn Any + Send + Sync>> {
        None
    }
}

/// The compilation environment: operator registry plus the pluggable
/// adapters.
///
/// The registry is populated with every built-in operator on construction
/// and frozen afterwards; custom operators go through
/// [`Engine::with_custom_matcher`]. An `Engine` is an ordinary value: share
/// it behind an `Arc` or build one per call site; nothing is process-global.
pub struct Engine {
    builders: HashMap<&'static str, BuilderFn>,
    regex: Arc<dyn RegexAdapter>,
    converter: Option<Arc<dyn ValueConverter>>,
    custom: Option<Arc<dyn CustomMatcher>>,
    colorful: bool,
}

impl Engine {
    pub fn new() -> Self {
        Self {
            builders: compiler::builtin_builders(),
            regex: Arc::new(DefaultRegexAdapter),
            converter: None,
            custom: None,
            colorful: true,
        }
    }

    pub fn with_regex_adapter(mut self, adapter: impl RegexAdapter + 'static) -> Self {
        self.regex = Arc::new(adapter);
        self
    }

    pub fn with_value_converter(mut self, converter: impl ValueConverter + 'static) -> Self {
        self.converter = Some(Arc::new(converter));
        self
    }

    pub fn with_custom_matcher(mut self, custom: impl CustomMatcher + 'static) -> Self {
        self.custom = Some(Arc::new(custom));
        self
    }

    /// Whether `trace` output colours match outcomes with ANSI escapes.
    pub fn with_colorful_trace(mut self, colorful: bool) -> Self {
        self.colorful = colorful;
        self
    }

    /// Compile a query document into a reusable [`Matcher`].
    ///
    /// The query must be a [`Value::Map`]; its entries are implicitly ANDed.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use docmatch::{Engine, Value};
    ///
    /// let engine = Engine::new();
    /// let query = Value::from_json_str(r#"{"age": {"$gte": 18}}"#).unwrap();
    /// let matcher = engine.compile(&query).unwrap();
    ///
    /// assert!(matcher.is_match(&Value::from_json_str(r#"{"age": 21}"#).unwrap()));
    /// assert!(!matcher.is_match(&Value::from_json_str(r#"{"age": 17}"#).unwrap()));
    /// ```
    pub fn compile(&self, query: &Value) -> Result<Matcher, Error> {
        let mut compiler = Compiler::new(self);
        let root = compiler.compile_query(query)?;
        let nodes = compiler.into_nodes();
        debug!("compiled query into {} matcher nodes", nodes.len());
        Ok(Matcher::from_parts(
            nodes,
            root,
            Arc::clone(&self.regex),
            self.converter.clone(),
            self.colorful,
        ))
    }

    /// Convert a binding-owned record wholesale, if a converter is installed.
    pub fn deep_convert(&self, external: &(dyn Any + Send + Sync)) -> Option<Value> {
        self.converter
            .as_ref()
            .and_then(|converter| converter.deep_convert(external))
    }

    /// Hand a value back to the binding layer, if a converter is installed.
    pub fn recover(&self, value: &Value) -> Option<Arc<dyn Any + Send + Sync>> {
        self.converter
            .as_ref()
            .and_then(|converter| converter.recover(value))
    }

    #[inline]
    pub(crate) fn builder(&self, key: &str) -> Option<BuilderFn> {
        self.builders.get(key).copied()
    }

    #[inline]
    pub(crate) fn custom_matcher(&self) -> Option<&Arc<dyn CustomMatcher>> {
        self.custom.as_ref()
    }

    #[inline]
    pub(crate) fn regex_adapter(&self) -> &Arc<dyn RegexAdapter> {
        &self.regex
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
