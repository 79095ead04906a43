use crate::{
    engine::{CustomPredicate, Engine, RegexAdapter, ValueConverter},
    error::Error,
    trace::{NoProbe, Probe, TraceEntry, TraceProbe},
    value::Value,
};
use slab::Slab;
use std::{
    cmp::Ordering,
    fmt::{Debug, Formatter},
    sync::Arc,
};

pub(crate) type NodeId = usize;

/// A compiled query: an immutable tree of matcher nodes.
///
/// All nodes live in one slab owned by the `Matcher`; children are slab
/// indices, so the tree is `Send + Sync` and dropping the matcher releases
/// every node at once. Compile once, evaluate against any number of records.
#[derive(Clone)]
pub struct Matcher {
    pub(crate) nodes: Slab<Node>,
    pub(crate) root: NodeId,
    pub(crate) regex: Arc<dyn RegexAdapter>,
    pub(crate) converter: Option<Arc<dyn ValueConverter>>,
    pub(crate) colorful: bool,
}

#[derive(Clone)]
pub(crate) struct Node {
    pub(crate) kind: NodeKind,
    pub(crate) condition: Value,
    pub(crate) priority: f64,
}

#[derive(Clone)]
pub(crate) enum NodeKind {
    AlwaysTrue,
    AlwaysFalse,
    Compare(CompareOp),
    In,
    Nin,
    Exists,
    Present,
    Regex {
        /// The adapter-prepared pattern; `condition` keeps the original.
        pattern: Value,
    },
    External {
        name: String,
        predicate: Arc<dyn CustomPredicate>,
    },
    And {
        children: Vec<NodeId>,
    },
    Or {
        children: Vec<NodeId>,
    },
    /// Implicit AND over the entries of a query map.
    Condition {
        children: Vec<NodeId>,
    },
    ElemMatch {
        children: Vec<NodeId>,
    },
    Every {
        children: Vec<NodeId>,
    },
    Field {
        name: String,
        /// Pre-parsed integer form of `name`, for indexing array records.
        index: Option<i64>,
        delegate: NodeId,
        array_record: NodeId,
    },
    Not {
        delegate: NodeId,
        array_record: NodeId,
    },
    Size {
        delegate: NodeId,
        array_record: NodeId,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum CompareOp {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanEqual,
    LessThan,
    LessThanEqual,
}

impl CompareOp {
    fn evaluate(&self, record: Option<&Value>, condition: &Value) -> bool {
        let ordering = record.and_then(|value| value.partial_cmp(condition));
        match self {
            Self::Equal => ordering == Some(Ordering::Equal),
            // Unrelated types are unequal, so an incomparable pair matches.
            Self::NotEqual => ordering != Some(Ordering::Equal),
            Self::GreaterThan => ordering == Some(Ordering::Greater),
            Self::GreaterThanEqual => {
                matches!(ordering, Some(Ordering::Greater | Ordering::Equal))
            }
            Self::LessThan => ordering == Some(Ordering::Less),
            Self::LessThanEqual => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Equal => "Eq",
            Self::NotEqual => "Ne",
            Self::GreaterThan => "Gt",
            Self::GreaterThanEqual => "Gte",
            Self::LessThan => "Lt",
            Self::LessThanEqual => "Lte",
        }
    }

    #[inline]
    pub(crate) fn base_priority(&self) -> f64 {
        match self {
            Self::Equal | Self::NotEqual => 1.0,
            _ => 2.0,
        }
    }
}

impl Node {
    pub(crate) fn name(&self) -> &str {
        match &self.kind {
            NodeKind::AlwaysTrue => "AlwaysTrue",
            NodeKind::AlwaysFalse => "AlwaysFalse",
            NodeKind::Compare(op) => op.name(),
            NodeKind::In => "In",
            NodeKind::Nin => "Nin",
            NodeKind::Exists => "Exists",
            NodeKind::Present => "Present",
            NodeKind::Regex { .. } => "Regex",
            NodeKind::External { name, .. } => name,
            NodeKind::And { .. } => "And",
            NodeKind::Or { .. } => "Or",
            NodeKind::Condition { .. } => "Condition",
            NodeKind::ElemMatch { .. } => "ElemMatch",
            NodeKind::Every { .. } => "Every",
            NodeKind::Field { .. } => "Field",
            NodeKind::Not { .. } => "Not",
            NodeKind::Size { .. } => "Size",
        }
    }

    pub(crate) fn field_name(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Field { name, .. } => Some(name),
            _ => None,
        }
    }

    pub(crate) fn sub_count(&self) -> usize {
        self.walk_children().len()
    }

    /// The children visited by traversal and explain: composite children in
    /// their sorted order, and the scalar-path delegate of literal wrappers
    /// (the array twin is internal desugaring of the same condition).
    pub(crate) fn walk_children(&self) -> Vec<NodeId> {
        match &self.kind {
            NodeKind::And { children }
            | NodeKind::Or { children }
            | NodeKind::Condition { children }
            | NodeKind::ElemMatch { children }
            | NodeKind::Every { children } => children.clone(),
            NodeKind::Field { delegate, .. }
            | NodeKind::Not { delegate, .. }
            | NodeKind::Size { delegate, .. } => vec![*delegate],
            _ => Vec::new(),
        }
    }
}

/// A node handed to [`Matcher::traverse`] visitors.
pub struct NodeRef<'matcher> {
    node: &'matcher Node,
    level: usize,
}

impl NodeRef<'_> {
    pub fn name(&self) -> &str {
        self.node.name()
    }

    pub fn condition(&self) -> &Value {
        &self.node.condition
    }

    pub fn priority(&self) -> f64 {
        self.node.priority
    }

    /// Depth in the tree; the root is at level zero.
    pub fn level(&self) -> usize {
        self.level
    }

    pub fn sub_count(&self) -> usize {
        self.node.sub_count()
    }
}

impl Matcher {
    /// Compile `query` with a default [`Engine`].
    ///
    /// # Examples
    ///
    /// ```rust
    /// use docmatch::{Matcher, Value};
    ///
    /// let query = Value::from_json_str(r#"{"tags": {"$in": ["x", "y"]}}"#).unwrap();
    /// let matcher = Matcher::compile(&query).unwrap();
    ///
    /// assert!(matcher.is_match(&Value::from_json_str(r#"{"tags": ["y", "z"]}"#).unwrap()));
    /// ```
    pub fn compile(query: &Value) -> Result<Self, Error> {
        Engine::default().compile(query)
    }

    pub(crate) fn from_parts(
        nodes: Slab<Node>,
        root: NodeId,
        regex: Arc<dyn RegexAdapter>,
        converter: Option<Arc<dyn ValueConverter>>,
        colorful: bool,
    ) -> Self {
        Self {
            nodes,
            root,
            regex,
            converter,
            colorful,
        }
    }

    /// Evaluate the compiled query against `record`.
    #[inline]
    pub fn is_match(&self, record: &Value) -> bool {
        self.eval(self.root, Some(record), 0, &mut NoProbe)
    }

    /// Evaluate against `record` while collecting one [`TraceEntry`] per
    /// visited node, in pre-order.
    pub fn trace_with_entries(&self, record: &Value) -> (bool, Vec<TraceEntry>) {
        let mut probe = TraceProbe::new(self.colorful);
        let matched = self.eval(self.root, Some(record), 0, &mut probe);
        (matched, probe.into_entries())
    }

    /// Evaluate against `record` and print the per-node trace to stdout.
    pub fn trace(&self, record: &Value) -> bool {
        let (matched, entries) = self.trace_with_entries(record);
        for entry in &entries {
            println!("{:indent$}{}", "", entry.message, indent = entry.level * 2);
        }
        matched
    }

    /// Pre-order walk over the tree. The visitor returns `false` to stop.
    pub fn traverse<F>(&self, mut visitor: F)
    where
        F: FnMut(NodeRef<'_>) -> bool,
    {
        self.traverse_node(self.root, 0, &mut visitor);
    }

    fn traverse_node<F>(&self, id: NodeId, level: usize, visitor: &mut F) -> bool
    where
        F: FnMut(NodeRef<'_>) -> bool,
    {
        let node = &self.nodes[id];
        if !visitor(NodeRef { node, level }) {
            return false;
        }
        for child in node.walk_children() {
            if !self.traverse_node(child, level + 1, visitor) {
                return false;
            }
        }
        true
    }

    pub(crate) fn eval<P: Probe>(
        &self,
        id: NodeId,
        record: Option<&Value>,
        level: usize,
        probe: &mut P,
    ) -> bool {
        let slot = probe.enter(level);
        let matched = self.eval_node(id, record, level, probe);
        probe.exit(self, slot, id, record, matched, level);
        matched
    }

    fn eval_node<P: Probe>(
        &self,
        id: NodeId,
        record: Option<&Value>,
        level: usize,
        probe: &mut P,
    ) -> bool {
        let node = &self.nodes[id];
        match &node.kind {
            NodeKind::AlwaysTrue => true,
            NodeKind::AlwaysFalse => false,
            NodeKind::Compare(op) => op.evaluate(record, &node.condition),
            NodeKind::In => in_match(record, &node.condition),
            NodeKind::Nin => !in_match(record, &node.condition),
            NodeKind::Exists => {
                let expected = matches!(node.condition, Value::Bool(true));
                record.is_some() == expected
            }
            NodeKind::Present => {
                let expected = matches!(node.condition, Value::Bool(true));
                present_match(record, expected)
            }
            NodeKind::Regex { pattern } => match record {
                Some(Value::String(subject)) => self.regex.is_match(pattern, subject),
                _ => false,
            },
            NodeKind::External { predicate, .. } => predicate.is_match(record),
            NodeKind::And { children } | NodeKind::Condition { children } => {
                for child in children {
                    if !self.eval(*child, record, level + 1, probe) {
                        return false;
                    }
                }
                true
            }
            NodeKind::Or { children } => {
                for child in children {
                    if self.eval(*child, record, level + 1, probe) {
                        return true;
                    }
                }
                false
            }
            NodeKind::ElemMatch { children } => {
                let Some(Value::Array(items)) = record else {
                    return false;
                };
                for item in items {
                    if self.conjunction_holds(children, item, level, probe) {
                        return true;
                    }
                }
                false
            }
            NodeKind::Every { children } => {
                let Some(Value::Array(items)) = record else {
                    return false;
                };
                // Empty arrays satisfy neither $elemMatch nor $every.
                if items.is_empty() {
                    return false;
                }
                for item in items {
                    if !self.conjunction_holds(children, item, level, probe) {
                        return false;
                    }
                }
                true
            }
            NodeKind::Field {
                name,
                index,
                delegate,
                array_record,
            } => {
                let extracted = match record {
                    Some(Value::Map(entries)) => entries.get(name.as_str()),
                    Some(Value::Array(items)) => {
                        let Some(raw) = index else {
                            return false;
                        };
                        let Some(position) = resolve_index(*raw, items.len()) else {
                            return false;
                        };
                        Some(&items[position])
                    }
                    _ => return false,
                };
                // Binding-owned values become matchable at this boundary.
                let converted = match (extracted, &self.converter) {
                    (Some(Value::External(handle)), Some(converter)) => {
                        converter.shallow_convert(handle.as_ref())
                    }
                    _ => None,
                };
                let value = converted.as_ref().or(extracted);
                self.eval_wrapper(*delegate, *array_record, value, level, probe)
            }
            NodeKind::Not {
                delegate,
                array_record,
            } => !self.eval_wrapper(*delegate, *array_record, record, level, probe),
            NodeKind::Size {
                delegate,
                array_record,
            } => {
                let Some(Value::Array(items)) = record else {
                    return false;
                };
                let length = Value::Int(items.len() as i64);
                self.eval_wrapper(*delegate, *array_record, Some(&length), level, probe)
            }
        }
    }

    /// The literal-wrapper rule: array-shaped values take the array-record
    /// path, everything else goes to the scalar delegate.
    #[inline]
    fn eval_wrapper<P: Probe>(
        &self,
        delegate: NodeId,
        array_record: NodeId,
        value: Option<&Value>,
        level: usize,
        probe: &mut P,
    ) -> bool {
        match value {
            Some(array @ Value::Array(_)) => self.eval(array_record, Some(array), level + 1, probe),
            other => self.eval(delegate, other, level + 1, probe),
        }
    }

    fn conjunction_holds<P: Probe>(
        &self,
        children: &[NodeId],
        item: &Value,
        level: usize,
        probe: &mut P,
    ) -> bool {
        for child in children {
            if !self.eval(*child, Some(item), level + 1, probe) {
                return false;
            }
        }
        true
    }
}

impl Debug for Matcher {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Matcher")
            .field("nodes", &self.nodes.len())
            .field("root", &self.root)
            .field("condition", &self.nodes[self.root].condition)
            .finish()
    }
}

fn in_match(record: Option<&Value>, condition: &Value) -> bool {
    let Value::Array(set) = condition else {
        return false;
    };
    match record {
        Some(Value::Array(items)) => items.iter().any(|item| set.contains(item)),
        Some(item) => set.contains(item),
        None => false,
    }
}

fn present_match(record: Option<&Value>, expected: bool) -> bool {
    let Some(value) = record else {
        return !expected;
    };
    let present = match value {
        Value::Null => false,
        // A boolean is "present" exactly when it equals the condition.
        Value::Bool(own) => return *own == expected,
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Map(entries) => !entries.is_empty(),
        _ => true,
    };
    present == expected
}

fn resolve_index(index: i64, len: usize) -> Option<usize> {
    if index < 0 {
        let back = index.unsigned_abs() as usize;
        if back > len {
            return None;
        }
        Some(len - back)
    } else {
        let position = index as usize;
        (position < len).then_some(position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::queries::{matcher, record, value};
    use proptest::prelude::{proptest, *};

    #[test]
    fn compiled_matchers_are_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Matcher>();
    }

    #[test]
    fn an_empty_query_matches_everything() {
        let matcher = matcher!({});

        assert!(matcher.is_match(&record!({"anything": 1})));
        assert!(matcher.is_match(&record!({})));
        assert!(matcher.is_match(&Value::Int(5)));
    }

    #[test]
    fn can_match_a_greater_than_condition_on_a_field() {
        let matcher = matcher!({"age": {"$gt": 18}});

        assert!(matcher.is_match(&record!({"age": 21})));
        assert!(!matcher.is_match(&record!({"age": 17})));
        assert!(!matcher.is_match(&record!({})));
    }

    #[test]
    fn can_match_any_branch_of_an_or_condition() {
        let matcher = matcher!({"$or": [{"a": 1}, {"b": 2}]});

        assert!(matcher.is_match(&record!({"a": 1, "b": 99})));
        assert!(!matcher.is_match(&record!({"a": 99, "b": 99})));
    }

    #[test]
    fn inclusion_intersects_when_both_sides_are_arrays() {
        let matcher = matcher!({"tags": {"$in": ["x", "y"]}});

        assert!(matcher.is_match(&record!({"tags": ["y", "z"]})));
        assert!(matcher.is_match(&record!({"tags": "x"})));
        assert!(!matcher.is_match(&record!({"tags": "q"})));
        assert!(!matcher.is_match(&record!({"tags": ["q", "r"]})));
        assert!(!matcher.is_match(&record!({})));
    }

    #[test]
    fn elem_match_requires_one_element_to_satisfy_the_whole_conjunction() {
        let matcher = matcher!({"xs": {"$elemMatch": {"$gt": 3, "$lt": 10}}});

        assert!(matcher.is_match(&record!({"xs": [1, 2, 5, 20]})));
        assert!(!matcher.is_match(&record!({"xs": [1, 2, 20]})));
        assert!(!matcher.is_match(&record!({"xs": []})));
    }

    #[test]
    fn a_null_condition_matches_explicit_null_and_absence() {
        let matcher = matcher!({"name": null});

        assert!(matcher.is_match(&record!({"name": null})));
        assert!(matcher.is_match(&record!({})));
        assert!(!matcher.is_match(&record!({"name": "a"})));
    }

    #[test]
    fn size_wraps_the_array_length_as_a_condition_input() {
        let matcher = matcher!({"items": {"$size": {"$gte": 2}}});

        assert!(matcher.is_match(&record!({"items": [1, 2, 3]})));
        assert!(!matcher.is_match(&record!({"items": [1]})));
        assert!(!matcher.is_match(&record!({"items": "no"})));
    }

    #[test]
    fn size_also_accepts_a_literal_length() {
        let matcher = matcher!({"items": {"$size": 3}});

        assert!(matcher.is_match(&record!({"items": [1, 2, 3]})));
        assert!(!matcher.is_match(&record!({"items": [1, 2]})));
    }

    #[test]
    fn an_empty_and_matches_everything() {
        let matcher = matcher!({"$and": []});

        assert!(matcher.is_match(&record!({"a": 1})));
    }

    #[test]
    fn an_empty_or_matches_nothing() {
        let matcher = matcher!({"$or": []});

        assert!(!matcher.is_match(&record!({"a": 1})));
    }

    #[test]
    fn and_flattens_the_entries_of_every_branch() {
        let matcher = matcher!({"$and": [{"a": 1, "b": 2}, {"c": 3}]});

        assert!(matcher.is_match(&record!({"a": 1, "b": 2, "c": 3})));
        assert!(!matcher.is_match(&record!({"a": 1, "b": 2})));
        assert!(!matcher.is_match(&record!({"a": 1, "b": 9, "c": 3})));
    }

    #[test]
    fn every_requires_all_elements_to_satisfy_the_conjunction() {
        let matcher = matcher!({"xs": {"$every": {"$gt": 0}}});

        assert!(matcher.is_match(&record!({"xs": [1, 2, 3]})));
        assert!(!matcher.is_match(&record!({"xs": [1, -2, 3]})));
    }

    #[test]
    fn every_is_false_on_an_empty_array() {
        let matcher = matcher!({"xs": {"$every": {"$gt": 0}}});

        assert!(!matcher.is_match(&record!({"xs": []})));
    }

    #[test]
    fn not_negates_the_wrapped_condition() {
        let matcher = matcher!({"age": {"$not": {"$gt": 18}}});

        assert!(matcher.is_match(&record!({"age": 17})));
        assert!(!matcher.is_match(&record!({"age": 21})));
    }

    #[test]
    fn ne_is_true_on_incomparable_types() {
        let matcher = matcher!({"a": {"$ne": 5}});

        assert!(matcher.is_match(&record!({"a": "five"})));
        assert!(matcher.is_match(&record!({})));
        assert!(matcher.is_match(&record!({"a": 6})));
        assert!(!matcher.is_match(&record!({"a": 5})));
    }

    #[test]
    fn ordering_comparisons_are_false_on_incomparable_types() {
        let matcher = matcher!({"a": {"$lt": 5}});

        assert!(!matcher.is_match(&record!({"a": "four"})));
        assert!(!matcher.is_match(&record!({"a": true})));
        assert!(matcher.is_match(&record!({"a": 4})));
    }

    #[test]
    fn nin_is_the_complement_of_in() {
        let matcher = matcher!({"a": {"$nin": [1, 2]}});

        assert!(!matcher.is_match(&record!({"a": 1})));
        assert!(matcher.is_match(&record!({"a": 3})));
        assert!(matcher.is_match(&record!({})));
    }

    #[test]
    fn exists_reacts_to_missing_fields() {
        let positive = matcher!({"a": {"$exists": true}});
        let negative = matcher!({"a": {"$exists": false}});

        assert!(positive.is_match(&record!({"a": null})));
        assert!(!positive.is_match(&record!({})));
        assert!(negative.is_match(&record!({})));
        assert!(!negative.is_match(&record!({"a": 0})));
    }

    #[test]
    fn present_distinguishes_empty_content_from_missing_fields() {
        let positive = matcher!({"a": {"$present": true}});

        assert!(!positive.is_match(&record!({})));
        assert!(!positive.is_match(&record!({"a": null})));
        assert!(!positive.is_match(&record!({"a": ""})));
        assert!(!positive.is_match(&record!({"a": []})));
        assert!(!positive.is_match(&record!({"a": {}})));
        assert!(positive.is_match(&record!({"a": 0})));
        assert!(positive.is_match(&record!({"a": 1.5})));
        assert!(positive.is_match(&record!({"a": "x"})));
        assert!(positive.is_match(&record!({"a": [1]})));
        assert!(positive.is_match(&record!({"a": {"b": 1}})));
    }

    #[test]
    fn present_on_a_boolean_compares_the_boolean_itself() {
        let positive = matcher!({"a": {"$present": true}});
        let negative = matcher!({"a": {"$present": false}});

        assert!(positive.is_match(&record!({"a": true})));
        assert!(!positive.is_match(&record!({"a": false})));
        assert!(negative.is_match(&record!({"a": false})));
        assert!(!negative.is_match(&record!({"a": true})));
    }

    #[test]
    fn present_false_matches_missing_and_empty_content() {
        let negative = matcher!({"a": {"$present": false}});

        assert!(negative.is_match(&record!({})));
        assert!(negative.is_match(&record!({"a": null})));
        assert!(negative.is_match(&record!({"a": ""})));
        assert!(negative.is_match(&record!({"a": []})));
        assert!(!negative.is_match(&record!({"a": "x"})));
    }

    #[test]
    fn present_treats_regexes_and_externals_as_content() {
        let positive = matcher!({"a": {"$present": true}});

        let mut with_regex = indexmap::IndexMap::new();
        with_regex.insert("a".to_owned(), Value::regex("x").unwrap());
        assert!(positive.is_match(&Value::Map(with_regex)));

        let mut with_external = indexmap::IndexMap::new();
        with_external.insert("a".to_owned(), Value::external(7u8));
        assert!(positive.is_match(&Value::Map(with_external)));
    }

    #[test]
    fn in_accepts_null_as_a_set_member() {
        let matcher = matcher!({"a": {"$in": [null, 1]}});

        assert!(matcher.is_match(&record!({"a": null})));
        assert!(matcher.is_match(&record!({"a": 1})));
        assert!(!matcher.is_match(&record!({})));
    }

    #[test]
    fn nin_with_an_empty_set_matches_everything() {
        let matcher = matcher!({"a": {"$nin": []}});

        assert!(matcher.is_match(&record!({"a": 1})));
        assert!(matcher.is_match(&record!({})));
    }

    #[test]
    fn top_level_operators_see_the_whole_record() {
        let size = matcher!({"$size": 2});
        let gt = matcher!({"$gt": 10});

        assert!(size.is_match(&value!([1, 2])));
        assert!(!size.is_match(&value!([1])));
        assert!(gt.is_match(&Value::Int(11)));
        assert!(!gt.is_match(&Value::Int(9)));
    }

    #[test]
    fn regex_matches_string_records_only() {
        let matcher = matcher!({"name": {"$regex": "^bo+b$"}});

        assert!(matcher.is_match(&record!({"name": "boob"})));
        assert!(!matcher.is_match(&record!({"name": "bib"})));
        assert!(!matcher.is_match(&record!({"name": 5})));
        assert!(!matcher.is_match(&record!({})));
    }

    #[test]
    fn a_regex_literal_condition_behaves_like_an_explicit_regex_operator() {
        let mut entries = indexmap::IndexMap::new();
        entries.insert("name".to_owned(), Value::regex("^b").unwrap());
        let matcher = Matcher::compile(&Value::Map(entries)).unwrap();

        assert!(matcher.is_match(&record!({"name": "bob"})));
        assert!(!matcher.is_match(&record!({"name": "alice"})));
    }

    #[test]
    fn can_index_an_array_record_by_field_position() {
        let matcher = matcher!({"1": "b"});

        assert!(matcher.is_match(&value!(["a", "b"])));
        assert!(!matcher.is_match(&value!(["b", "a"])));
    }

    #[test]
    fn negative_indices_resolve_from_the_end() {
        let matcher = matcher!({"-1": "z"});

        assert!(matcher.is_match(&value!(["a", "z"])));
        assert!(!matcher.is_match(&value!(["z", "a"])));
    }

    #[test]
    fn out_of_range_indices_do_not_match() {
        let positive = matcher!({"5": {"$exists": false}});
        let negative = matcher!({"-3": "a"});

        // Out of range is "no match", not "missing".
        assert!(!positive.is_match(&value!(["a", "b"])));
        assert!(!negative.is_match(&value!(["a", "b"])));
    }

    #[test]
    fn non_integer_field_keys_do_not_match_array_records() {
        let matcher = matcher!({"name": "a"});

        assert!(!matcher.is_match(&value!(["a", "b"])));
    }

    #[test]
    fn scalar_records_do_not_match_field_conditions() {
        let matcher = matcher!({"a": 1});

        assert!(!matcher.is_match(&Value::Int(1)));
        assert!(!matcher.is_match(&Value::from("a")));
    }

    #[test]
    fn a_scalar_condition_matches_an_array_record_through_its_elements() {
        let matcher = matcher!({"tags": "x"});

        assert!(matcher.is_match(&record!({"tags": ["w", "x"]})));
        assert!(!matcher.is_match(&record!({"tags": ["w", "y"]})));
        assert!(matcher.is_match(&record!({"tags": "x"})));
    }

    #[test]
    fn an_array_condition_matches_whole_array_equality_or_containment() {
        let matcher = matcher!({"xs": [1, 2]});

        assert!(matcher.is_match(&record!({"xs": [1, 2]})));
        assert!(matcher.is_match(&record!({"xs": [[1, 2], [3]]})));
        assert!(!matcher.is_match(&record!({"xs": [1, 2, 3]})));
    }

    #[test]
    fn a_table_condition_against_an_array_applies_to_its_elements() {
        let matcher = matcher!({"users": {"name": "bob"}});

        assert!(matcher.is_match(&record!({"users": [{"name": "ann"}, {"name": "bob"}]})));
        assert!(!matcher.is_match(&record!({"users": [{"name": "ann"}]})));
    }

    #[test]
    fn indexed_keys_in_a_table_condition_address_array_positions() {
        let matcher = matcher!({"xs": {"0": {"$gt": 10}}});

        assert!(matcher.is_match(&record!({"xs": [11, 0]})));
        assert!(!matcher.is_match(&record!({"xs": [9, 100]})));
    }

    #[test]
    fn a_regex_condition_against_an_array_applies_to_its_elements() {
        let mut entries = indexmap::IndexMap::new();
        entries.insert("tags".to_owned(), Value::regex("^x").unwrap());
        let matcher = Matcher::compile(&Value::Map(entries)).unwrap();

        assert!(matcher.is_match(&record!({"tags": ["yy", "xy"]})));
        assert!(!matcher.is_match(&record!({"tags": ["yy", "zz"]})));
    }

    #[test]
    fn not_applied_to_an_array_record_negates_the_element_search() {
        let matcher = matcher!({"tags": {"$not": "x"}});

        assert!(!matcher.is_match(&record!({"tags": ["w", "x"]})));
        assert!(matcher.is_match(&record!({"tags": ["w", "y"]})));
    }

    #[test]
    fn nested_fields_reach_into_sub_documents() {
        let matcher = matcher!({"user": {"address": {"city": "Oslo"}}});

        assert!(matcher.is_match(&record!({"user": {"address": {"city": "Oslo"}}})));
        assert!(!matcher.is_match(&record!({"user": {"address": {"city": "Bergen"}}})));
        assert!(!matcher.is_match(&record!({"user": {}})));
    }

    #[test]
    fn matching_is_idempotent() {
        let matcher = matcher!({"a": {"$gt": 1}, "b": {"$in": [1, 2]}});
        let record = record!({"a": 2, "b": 2});

        assert_eq!(matcher.is_match(&record), matcher.is_match(&record));
    }

    #[test]
    fn a_field_map_query_equals_the_conjunction_of_its_fields() {
        let combined = matcher!({"a": 1, "b": {"$gt": 2}});
        let first = matcher!({"a": 1});
        let second = matcher!({"b": {"$gt": 2}});

        for record in [
            record!({"a": 1, "b": 3}),
            record!({"a": 1, "b": 1}),
            record!({"a": 2, "b": 3}),
            record!({}),
        ] {
            assert_eq!(
                first.is_match(&record) && second.is_match(&record),
                combined.is_match(&record)
            );
        }
    }

    #[test]
    fn traverse_visits_nodes_in_pre_order_with_levels() {
        let matcher = matcher!({"a": 1, "b": {"$gt": 2}});

        let mut seen = Vec::new();
        matcher.traverse(|node| {
            seen.push((node.name().to_owned(), node.level()));
            true
        });

        assert_eq!(
            vec![
                ("Condition".to_owned(), 0),
                ("Field".to_owned(), 1),
                ("Eq".to_owned(), 2),
                ("Field".to_owned(), 1),
                ("Gt".to_owned(), 2),
            ],
            seen
        );
    }

    #[test]
    fn traverse_stops_when_the_visitor_returns_false() {
        let matcher = matcher!({"a": 1, "b": 2});

        let mut count = 0;
        matcher.traverse(|_| {
            count += 1;
            false
        });

        assert_eq!(1, count);
    }

    proptest! {
        #[test]
        fn matching_is_idempotent_for_integer_conditions(condition in any::<i64>(), value in any::<i64>()) {
            let mut entries = indexmap::IndexMap::new();
            entries.insert("a".to_owned(), Value::Map(indexmap::IndexMap::from([
                ("$gt".to_owned(), Value::Int(condition)),
            ])));
            let matcher = Matcher::compile(&Value::Map(entries)).unwrap();
            let record = Value::Map(indexmap::IndexMap::from([("a".to_owned(), Value::Int(value))]));

            prop_assert_eq!(matcher.is_match(&record), matcher.is_match(&record));
            prop_assert_eq!(value > condition, matcher.is_match(&record));
        }

        #[test]
        fn not_eq_and_ne_agree_on_integer_records(condition in any::<i64>(), value in any::<i64>()) {
            let negated = Matcher::compile(&Value::Map(indexmap::IndexMap::from([(
                "a".to_owned(),
                Value::Map(indexmap::IndexMap::from([(
                    "$not".to_owned(),
                    Value::Map(indexmap::IndexMap::from([("$eq".to_owned(), Value::Int(condition))])),
                )])),
            )])))
            .unwrap();
            let unequal = Matcher::compile(&Value::Map(indexmap::IndexMap::from([(
                "a".to_owned(),
                Value::Map(indexmap::IndexMap::from([("$ne".to_owned(), Value::Int(condition))])),
            )])))
            .unwrap();
            let record = Value::Map(indexmap::IndexMap::from([("a".to_owned(), Value::Int(value))]));

            prop_assert_eq!(negated.is_match(&record), unequal.is_match(&record));
        }

        #[test]
        fn a_scalar_condition_on_an_array_record_is_an_element_search(
            needle in any::<i64>(),
            items in prop::collection::vec(any::<i64>(), 0..8),
        ) {
            let matcher = Matcher::compile(&Value::Map(indexmap::IndexMap::from([(
                "xs".to_owned(),
                Value::Int(needle),
            )])))
            .unwrap();
            let record = Value::Map(indexmap::IndexMap::from([(
                "xs".to_owned(),
                Value::Array(items.iter().copied().map(Value::Int).collect()),
            )]));

            prop_assert_eq!(items.contains(&needle), matcher.is_match(&record));
        }
    }
}
