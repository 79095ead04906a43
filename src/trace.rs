use crate::{
    matcher::{Matcher, Node, NodeId, NodeKind},
    value::Value,
};

/// One recorded match decision: the node's depth in the tree and a rendered
/// line naming the node, its condition, the record value it saw and the
/// outcome. Entries come out in pre-order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEntry {
    pub level: usize,
    pub message: String,
}

/// Evaluation observer threaded through `Matcher::eval`. The no-op
/// implementation monomorphises away for plain matching.
pub(crate) trait Probe {
    fn enter(&mut self, level: usize) -> usize;

    fn exit(
        &mut self,
        matcher: &Matcher,
        slot: usize,
        id: NodeId,
        record: Option<&Value>,
        matched: bool,
        level: usize,
    );
}

pub(crate) struct NoProbe;

impl Probe for NoProbe {
    #[inline]
    fn enter(&mut self, _level: usize) -> usize {
        0
    }

    #[inline]
    fn exit(
        &mut self,
        _matcher: &Matcher,
        _slot: usize,
        _id: NodeId,
        _record: Option<&Value>,
        _matched: bool,
        _level: usize,
    ) {
    }
}

/// Reserves an entry per visited node on the way down and fills the message
/// in once the outcome is known, so the buffer is the pre-order
/// linearisation of the run with no reordering pass.
pub(crate) struct TraceProbe {
    entries: Vec<TraceEntry>,
    colorful: bool,
}

impl TraceProbe {
    pub(crate) fn new(colorful: bool) -> Self {
        Self {
            entries: Vec::new(),
            colorful,
        }
    }

    pub(crate) fn into_entries(self) -> Vec<TraceEntry> {
        self.entries
    }
}

impl Probe for TraceProbe {
    fn enter(&mut self, level: usize) -> usize {
        self.entries.push(TraceEntry {
            level,
            message: String::new(),
        });
        self.entries.len() - 1
    }

    fn exit(
        &mut self,
        matcher: &Matcher,
        slot: usize,
        id: NodeId,
        record: Option<&Value>,
        matched: bool,
        _level: usize,
    ) {
        let node = &matcher.nodes[id];
        let outcome = match (matched, self.colorful) {
            (true, true) => "\x1b[30;42mMatched\x1b[0m",
            (true, false) => "Matched",
            (false, true) => "\x1b[30;41mDismatch\x1b[0m",
            (false, false) => "Dismatch",
        };
        let condition = condition_text(matcher, node);
        let record_text = match record {
            Some(value) => value.to_string(),
            None => "Nothing".to_owned(),
        };
        self.entries[slot].message = match node.field_name() {
            Some(field) => format!(
                "{}: {outcome}, field: {field:?}, condition: {condition}, record: {record_text}",
                node.name()
            ),
            None => format!(
                "{}: {outcome}, condition: {condition}, record: {record_text}",
                node.name()
            ),
        };
    }
}

/// Regex conditions render through the adapter; everything else through the
/// value's own display.
fn condition_text(matcher: &Matcher, node: &Node) -> String {
    match &node.condition {
        pattern @ Value::Regex(_) => matcher.regex.stringify(pattern),
        other => other.to_string(),
    }
}

fn connection(count: usize, total: usize) -> &'static str {
    if total == 0 {
        ""
    } else if total - count == 1 {
        "└─ "
    } else {
        "├─ "
    }
}

fn indent(count: usize, total: usize) -> &'static str {
    if total == 0 {
        ""
    } else if total - count == 1 {
        "   "
    } else {
        "│  "
    }
}

impl Matcher {
    /// Render the compiled tree, one node per line, with box-drawing
    /// connectors.
    pub fn explain_to_string(&self) -> String {
        let mut out = String::new();
        self.explain_node(self.root, "", 0, 0, &mut out);
        out
    }

    /// Print [`Matcher::explain_to_string`] to stdout.
    pub fn explain(&self) {
        print!("{}", self.explain_to_string());
    }

    fn explain_node(&self, id: NodeId, prefix: &str, count: usize, total: usize, out: &mut String) {
        let node = &self.nodes[id];
        let title = match &node.kind {
            NodeKind::Field { name, .. } => {
                format!("Field: {name:?}, to match: {}", condition_text(self, node))
            }
            _ => format!("{}: {}", node.name(), condition_text(self, node)),
        };
        out.push_str(prefix);
        out.push_str(connection(count, total));
        out.push_str(&title);
        out.push('\n');

        let children = node.walk_children();
        let child_prefix = format!("{prefix}{}", indent(count, total));
        for (position, child) in children.iter().enumerate() {
            self.explain_node(*child, &child_prefix, position, children.len(), out);
        }
    }
}
