use crate::{
    engine::{BuilderFn, Engine},
    error::Error,
    matcher::{CompareOp, Node, NodeId, NodeKind},
    value::Value,
};
use indexmap::IndexMap;
use itertools::Itertools;
use slab::Slab;

const ALWAYS_PRIORITY: f64 = 1.0;
const EXISTENCE_PRIORITY: f64 = 2.0;
const REGEX_PRIORITY: f64 = 20.0;
const EXTERNAL_PRIORITY: f64 = 20.0;
/// Base added by AND/OR/implicit-AND composites on top of their children.
const BRANCH_PRIORITY: f64 = 2.0;
/// Base added by the element-wise composites; they scale with record size.
const ELEMENT_PRIORITY: f64 = 3.0;
const INCLUSION_LOG_BASE: f64 = 1.5;

/// Walks a query document once and produces the node tree.
///
/// Every builder appends nodes to the slab and returns the id of the subtree
/// root; the finished slab moves into the [`crate::Matcher`].
pub(crate) struct Compiler<'engine> {
    engine: &'engine Engine,
    nodes: Slab<Node>,
}

macro_rules! builder_thunk {
    ($name:ident, $method:ident) => {
        fn $name(compiler: &mut Compiler<'_>, condition: &Value) -> Result<NodeId, Error> {
            compiler.$method(condition)
        }
    };
}

builder_thunk!(eq_builder, build_eq);
builder_thunk!(ne_builder, build_ne);
builder_thunk!(gt_builder, build_gt);
builder_thunk!(gte_builder, build_gte);
builder_thunk!(lt_builder, build_lt);
builder_thunk!(lte_builder, build_lte);
builder_thunk!(in_builder, build_in);
builder_thunk!(nin_builder, build_nin);
builder_thunk!(exists_builder, build_exists);
builder_thunk!(present_builder, build_present);
builder_thunk!(regex_builder, build_regex);
builder_thunk!(and_builder, build_and);
builder_thunk!(or_builder, build_or);
builder_thunk!(elem_match_builder, build_elem_match);
builder_thunk!(every_builder, build_every);
builder_thunk!(not_builder, build_not);
builder_thunk!(size_builder, build_size);

pub(crate) fn builtin_builders() -> std::collections::HashMap<&'static str, BuilderFn> {
    std::collections::HashMap::from([
        ("$eq", eq_builder as BuilderFn),
        ("$ne", ne_builder),
        ("$gt", gt_builder),
        ("$gte", gte_builder),
        ("$lt", lt_builder),
        ("$lte", lte_builder),
        ("$in", in_builder),
        ("$nin", nin_builder),
        ("$exists", exists_builder),
        ("$present", present_builder),
        ("$regex", regex_builder),
        ("$and", and_builder),
        ("$or", or_builder),
        ("$elemMatch", elem_match_builder),
        ("$every", every_builder),
        ("$not", not_builder),
        ("$size", size_builder),
    ])
}

impl<'engine> Compiler<'engine> {
    pub(crate) fn new(engine: &'engine Engine) -> Self {
        Self {
            engine,
            nodes: Slab::new(),
        }
    }

    pub(crate) fn into_nodes(self) -> Slab<Node> {
        self.nodes
    }

    /// The entry point: a query is a map whose entries are implicitly ANDed.
    pub(crate) fn compile_query(&mut self, query: &Value) -> Result<NodeId, Error> {
        if query.as_map().is_none() {
            return Err(Error::InvalidType(format!(
                "query must be a Map, got {}",
                query.type_name()
            )));
        }
        self.table_condition(query)
    }

    fn insert(&mut self, kind: NodeKind, condition: Value, priority: f64) -> NodeId {
        self.nodes.insert(Node {
            kind,
            condition,
            priority,
        })
    }

    #[inline]
    fn priority_of(&self, id: NodeId) -> f64 {
        self.nodes[id].priority
    }

    /// Stable ascending sort on the integer priority key, so cheap siblings
    /// short-circuit their composite first and ties keep insertion order.
    fn sort_by_priority(&self, children: Vec<NodeId>) -> Vec<NodeId> {
        children
            .into_iter()
            .sorted_by_key(|id| (self.priority_of(*id) * 10_000.0) as i64)
            .collect()
    }

    fn table_condition(&mut self, condition: &Value) -> Result<NodeId, Error> {
        let Some(entries) = condition.as_map() else {
            return Err(Error::InvalidType(format!(
                "condition must be a Map, got {}",
                condition.type_name()
            )));
        };
        if entries.is_empty() {
            return Ok(self.insert(NodeKind::AlwaysTrue, condition.clone(), ALWAYS_PRIORITY));
        }
        let mut children = Vec::with_capacity(entries.len());
        for (key, subcondition) in entries {
            children.push(self.entry(key, subcondition)?);
        }
        Ok(self.conjoin(
            |children| NodeKind::Condition { children },
            children,
            condition.clone(),
        ))
    }

    fn entry(&mut self, key: &str, subcondition: &Value) -> Result<NodeId, Error> {
        if key.starts_with('$') {
            self.operator(key, subcondition)
        } else {
            self.field(key, subcondition)
        }
    }

    fn operator(&mut self, key: &str, condition: &Value) -> Result<NodeId, Error> {
        if let Some(builder) = self.engine.builder(key) {
            return builder(self, condition);
        }
        if let Some(custom) = self.engine.custom_matcher() {
            if custom.lookup(key) {
                let predicate = custom.build(key, condition)?;
                return Ok(self.insert(
                    NodeKind::External {
                        name: key.to_owned(),
                        predicate,
                    },
                    condition.clone(),
                    EXTERNAL_PRIORITY,
                ));
            }
        }
        Err(Error::InvalidArgument(format!("unknown operator {key:?}")))
    }

    /// A field node pairs the extraction key with a delegate for scalar
    /// values and an array-record twin for array values.
    fn field(&mut self, name: &str, condition: &Value) -> Result<NodeId, Error> {
        let (delegate, array_record) = self.literal_pair(condition)?;
        let priority = 1.0 + self.priority_of(delegate);
        Ok(self.insert(
            NodeKind::Field {
                name: name.to_owned(),
                index: name.parse().ok(),
                delegate,
                array_record,
            },
            condition.clone(),
            priority,
        ))
    }

    /// Collapses single children and otherwise builds a sorted composite
    /// whose priority is the branch base plus its children's.
    fn conjoin(
        &mut self,
        make: fn(Vec<NodeId>) -> NodeKind,
        children: Vec<NodeId>,
        condition: Value,
    ) -> NodeId {
        if children.len() == 1 {
            return children[0];
        }
        let children = self.sort_by_priority(children);
        let priority =
            BRANCH_PRIORITY + children.iter().map(|id| self.priority_of(*id)).sum::<f64>();
        self.insert(make(children), condition, priority)
    }

    fn compare(&mut self, op: CompareOp, condition: &Value) -> NodeId {
        self.insert(
            NodeKind::Compare(op),
            condition.clone(),
            op.base_priority(),
        )
    }

    fn build_eq(&mut self, condition: &Value) -> Result<NodeId, Error> {
        Ok(self.compare(CompareOp::Equal, condition))
    }

    fn build_ne(&mut self, condition: &Value) -> Result<NodeId, Error> {
        Ok(self.compare(CompareOp::NotEqual, condition))
    }

    fn build_gt(&mut self, condition: &Value) -> Result<NodeId, Error> {
        Ok(self.compare(CompareOp::GreaterThan, condition))
    }

    fn build_gte(&mut self, condition: &Value) -> Result<NodeId, Error> {
        Ok(self.compare(CompareOp::GreaterThanEqual, condition))
    }

    fn build_lt(&mut self, condition: &Value) -> Result<NodeId, Error> {
        Ok(self.compare(CompareOp::LessThan, condition))
    }

    fn build_lte(&mut self, condition: &Value) -> Result<NodeId, Error> {
        Ok(self.compare(CompareOp::LessThanEqual, condition))
    }

    fn build_in(&mut self, condition: &Value) -> Result<NodeId, Error> {
        let priority = Self::inclusion_priority("$in", condition)?;
        Ok(self.insert(NodeKind::In, condition.clone(), priority))
    }

    fn build_nin(&mut self, condition: &Value) -> Result<NodeId, Error> {
        let priority = Self::inclusion_priority("$nin", condition)?;
        Ok(self.insert(NodeKind::Nin, condition.clone(), priority))
    }

    fn inclusion_priority(operator: &str, condition: &Value) -> Result<f64, Error> {
        let Some(set) = condition.as_array() else {
            return Err(Error::InvalidType(format!(
                "{operator} condition must be an Array, got {}",
                condition.type_name()
            )));
        };
        Ok(1.0 + ((set.len() + 1) as f64).log(INCLUSION_LOG_BASE))
    }

    fn build_exists(&mut self, condition: &Value) -> Result<NodeId, Error> {
        Self::require_bool("$exists", condition)?;
        Ok(self.insert(NodeKind::Exists, condition.clone(), EXISTENCE_PRIORITY))
    }

    fn build_present(&mut self, condition: &Value) -> Result<NodeId, Error> {
        Self::require_bool("$present", condition)?;
        Ok(self.insert(NodeKind::Present, condition.clone(), EXISTENCE_PRIORITY))
    }

    fn require_bool(operator: &str, condition: &Value) -> Result<(), Error> {
        match condition {
            Value::Bool(_) => Ok(()),
            other => Err(Error::InvalidArgument(format!(
                "{operator} condition must be a Bool, got {}",
                other.type_name()
            ))),
        }
    }

    fn build_regex(&mut self, condition: &Value) -> Result<NodeId, Error> {
        if !matches!(condition, Value::String(_) | Value::Regex(_)) {
            return Err(Error::InvalidArgument(format!(
                "$regex condition must be a String or a Regex, got {}",
                condition.type_name()
            )));
        }
        let pattern = self.engine.regex_adapter().prepare(condition)?;
        Ok(self.insert(
            NodeKind::Regex { pattern },
            condition.clone(),
            REGEX_PRIORITY,
        ))
    }

    /// `$and` flattens: every entry of every branch map becomes a direct
    /// child of one conjunction.
    fn build_and(&mut self, condition: &Value) -> Result<NodeId, Error> {
        let branches = Self::condition_maps("$and", condition)?;
        let mut children = Vec::new();
        for entries in branches {
            for (key, subcondition) in entries {
                children.push(self.entry(key, subcondition)?);
            }
        }
        if children.is_empty() {
            return Ok(self.insert(NodeKind::AlwaysTrue, condition.clone(), ALWAYS_PRIORITY));
        }
        Ok(self.conjoin(
            |children| NodeKind::And { children },
            children,
            condition.clone(),
        ))
    }

    /// `$or` keeps each branch map as an independent sub-matcher.
    fn build_or(&mut self, condition: &Value) -> Result<NodeId, Error> {
        let Some(branches) = condition.as_array() else {
            return Err(Error::InvalidType(format!(
                "$or condition must be an Array of Maps, got {}",
                condition.type_name()
            )));
        };
        let mut children = Vec::with_capacity(branches.len());
        for branch in branches {
            if branch.as_map().is_none() {
                return Err(Error::InvalidType(format!(
                    "$or branches must be Maps, got {}",
                    branch.type_name()
                )));
            }
            children.push(self.table_condition(branch)?);
        }
        if children.is_empty() {
            return Ok(self.insert(NodeKind::AlwaysFalse, condition.clone(), ALWAYS_PRIORITY));
        }
        Ok(self.conjoin(
            |children| NodeKind::Or { children },
            children,
            condition.clone(),
        ))
    }

    fn condition_maps<'a>(
        operator: &str,
        condition: &'a Value,
    ) -> Result<Vec<&'a IndexMap<String, Value>>, Error> {
        let Some(items) = condition.as_array() else {
            return Err(Error::InvalidType(format!(
                "{operator} condition must be an Array of Maps, got {}",
                condition.type_name()
            )));
        };
        items
            .iter()
            .map(|item| {
                item.as_map().ok_or_else(|| {
                    Error::InvalidType(format!(
                        "{operator} branches must be Maps, got {}",
                        item.type_name()
                    ))
                })
            })
            .collect()
    }

    fn build_elem_match(&mut self, condition: &Value) -> Result<NodeId, Error> {
        let children = self.element_conjunction("$elemMatch", condition)?;
        let priority =
            ELEMENT_PRIORITY + children.iter().map(|id| self.priority_of(*id)).sum::<f64>();
        Ok(self.insert(
            NodeKind::ElemMatch { children },
            condition.clone(),
            priority,
        ))
    }

    fn build_every(&mut self, condition: &Value) -> Result<NodeId, Error> {
        let children = self.element_conjunction("$every", condition)?;
        let priority =
            ELEMENT_PRIORITY + children.iter().map(|id| self.priority_of(*id)).sum::<f64>();
        Ok(self.insert(NodeKind::Every { children }, condition.clone(), priority))
    }

    fn element_conjunction(
        &mut self,
        operator: &str,
        condition: &Value,
    ) -> Result<Vec<NodeId>, Error> {
        let Some(entries) = condition.as_map() else {
            return Err(Error::InvalidType(format!(
                "{operator} condition must be a Map, got {}",
                condition.type_name()
            )));
        };
        let mut children = Vec::with_capacity(entries.len());
        for (key, subcondition) in entries {
            children.push(self.entry(key, subcondition)?);
        }
        Ok(self.sort_by_priority(children))
    }

    fn build_not(&mut self, condition: &Value) -> Result<NodeId, Error> {
        let (delegate, array_record) = self.literal_pair(condition)?;
        let priority = 1.0 + self.priority_of(delegate);
        Ok(self.insert(
            NodeKind::Not {
                delegate,
                array_record,
            },
            condition.clone(),
            priority,
        ))
    }

    fn build_size(&mut self, condition: &Value) -> Result<NodeId, Error> {
        let (delegate, array_record) = self.literal_pair(condition)?;
        let priority = 1.0 + self.priority_of(delegate);
        Ok(self.insert(
            NodeKind::Size {
                delegate,
                array_record,
            },
            condition.clone(),
            priority,
        ))
    }

    fn literal_pair(&mut self, condition: &Value) -> Result<(NodeId, NodeId), Error> {
        let delegate = self.literal_delegate(condition)?;
        let array_record = self.array_record(condition)?;
        Ok((delegate, array_record))
    }

    /// The scalar-path matcher for a literal condition: maps become implicit
    /// conjunctions, regexes regex matchers, `null` the or of explicit null
    /// and absence, everything else an equality check.
    fn literal_delegate(&mut self, condition: &Value) -> Result<NodeId, Error> {
        match condition {
            Value::Map(_) => self.table_condition(condition),
            Value::Regex(_) => self.build_regex(condition),
            Value::Null => {
                let desugared = Value::Array(vec![
                    Value::Map(IndexMap::from([("$eq".to_owned(), Value::Null)])),
                    Value::Map(IndexMap::from([(
                        "$exists".to_owned(),
                        Value::Bool(false),
                    )])),
                ]);
                self.build_or(&desugared)
            }
            _ => Ok(self.compare(CompareOp::Equal, condition)),
        }
    }

    /// The array-path matcher, derived from the same condition.
    ///
    /// A map condition splits: explicit `$elemMatch` contents and plain field
    /// names form the element conjunction, while operator keys and numeric
    /// indices re-enter the compiler against the array itself. Array
    /// conditions match wholesale or as a contained element; regexes and
    /// scalars search the elements.
    fn array_record(&mut self, condition: &Value) -> Result<NodeId, Error> {
        match condition {
            Value::Map(entries) => {
                let mut parsed = IndexMap::new();
                let mut element = IndexMap::new();
                for (key, value) in entries {
                    if key == "$elemMatch" {
                        if let Value::Map(inner) = value {
                            for (inner_key, inner_value) in inner {
                                element.insert(inner_key.clone(), inner_value.clone());
                            }
                            continue;
                        }
                    }
                    if key.starts_with('$') || key.parse::<i64>().is_ok() {
                        parsed.insert(key.clone(), value.clone());
                    } else {
                        element.insert(key.clone(), value.clone());
                    }
                }
                if !element.is_empty() {
                    parsed.insert("$elemMatch".to_owned(), Value::Map(element));
                }
                self.table_condition(&Value::Map(parsed))
            }
            Value::Array(_) => {
                let desugared = Value::Array(vec![
                    Value::Map(IndexMap::from([("$eq".to_owned(), condition.clone())])),
                    Value::Map(IndexMap::from([(
                        "$elemMatch".to_owned(),
                        Value::Map(IndexMap::from([("$eq".to_owned(), condition.clone())])),
                    )])),
                ]);
                self.build_or(&desugared)
            }
            Value::Regex(_) => {
                let desugared = Value::Map(IndexMap::from([(
                    "$regex".to_owned(),
                    condition.clone(),
                )]));
                self.build_elem_match(&desugared)
            }
            _ => {
                let desugared = Value::Map(IndexMap::from([("$eq".to_owned(), condition.clone())]));
                self.build_elem_match(&desugared)
            }
        }
    }
}
