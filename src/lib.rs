//! An embeddable query matcher that decides whether a dynamically-typed
//! record (a JSON-like document) satisfies a MongoDB-style query expression.
//!
//! A query is itself a document built from field names and dollar-prefixed
//! operators. It is compiled once into an immutable tree of matcher nodes,
//! which can then be evaluated against any number of records.
//!
//! # Examples
//!
//! Matching records against a query:
//!
//! ```
//! use docmatch::{Matcher, Value};
//!
//! let query = Value::from_json_str(
//!     r#"{"age": {"$gte": 18}, "tags": {"$in": ["rust", "c"]}}"#,
//! ).unwrap();
//! let matcher = Matcher::compile(&query).unwrap();
//!
//! let record = Value::from_json_str(r#"{"age": 21, "tags": ["rust", "go"]}"#).unwrap();
//! assert!(matcher.is_match(&record));
//!
//! let record = Value::from_json_str(r#"{"age": 17, "tags": ["rust"]}"#).unwrap();
//! assert!(!matcher.is_match(&record));
//! ```
//!
//! Understanding why a record matched (or did not):
//!
//! ```
//! use docmatch::{Engine, Value};
//!
//! let engine = Engine::new().with_colorful_trace(false);
//! let query = Value::from_json_str(r#"{"name": {"$regex": "^b"}}"#).unwrap();
//! let matcher = engine.compile(&query).unwrap();
//!
//! // Prints the compiled tree, one node per line.
//! matcher.explain();
//! // Evaluates and prints every match decision along the way.
//! let matched = matcher.trace(&Value::from_json_str(r#"{"name": "bob"}"#).unwrap());
//! assert!(matched);
//! ```
//!
//! # Query grammar
//!
//! A query is a map. Each entry is either `"<field>": subcondition`, which
//! extracts the named field (or integer index, for array records) before
//! matching, or `"$op": condition`, which dispatches to an operator:
//!
//! * Comparison: `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`. Values of
//!   unrelated types are incomparable: they satisfy `$ne` and nothing else.
//! * Inclusion: `$in`, `$nin` with an array condition. An array record
//!   matches `$in` if the two arrays intersect.
//! * Existence: `$exists` (the field is there at all) and `$present` (the
//!   value is there *and* non-empty: `null`, `""`, `[]` and `{}` all count
//!   as absent).
//! * Arrays: `$elemMatch` (some element satisfies the condition map),
//!   `$every` (all elements do; an empty array satisfies neither), and
//!   `$size` (matches the array's length against a literal or a condition
//!   map).
//! * Logic: `$and`, `$or` over arrays of sub-queries, and `$not`.
//! * Strings: `$regex` with a string pattern or a [`Value::Regex`].
//!
//! A scalar subcondition on a field is an equality check; a `null`
//! subcondition also accepts a missing field; a map subcondition is an
//! implicit conjunction. When a scalar-shaped condition meets an
//! array-valued record, the condition is matched against the array's
//! elements instead (and an array condition also matches wholesale), which
//! is the MongoDB duality rule.
//!
//! # Design
//!
//! * Compilation walks the query once and stores the node tree in a slab;
//!   the compiled [`Matcher`] is immutable, cheap to share and safe to use
//!   from multiple threads.
//! * Siblings of a conjunction or disjunction are sorted by a static cost
//!   estimate (equality checks before set probes before regexes before
//!   element scans), so short-circuiting does the cheap work first.
//! * Evaluation cannot fail: ill-typed or missing record values simply do
//!   not match.
//! * Regex support, host-value conversion and unknown-operator handling are
//!   pluggable through the [`Engine`].

mod compiler;
mod engine;
mod error;
mod matcher;
#[cfg(test)]
mod test_utils;
mod trace;
mod value;

pub use crate::{
    engine::{
        CustomMatcher, CustomPredicate, DefaultRegexAdapter, Engine, NullRegexAdapter,
        RegexAdapter, ValueConverter,
    },
    error::Error,
    matcher::{Matcher, NodeRef},
    trace::TraceEntry,
    value::Value,
};
