use crate::boxes::{BoxHeader, NodeId};
use crate::issues::{contains_guard_issues, ParseIssue, ValidationIssue};
use crate::known_boxes::{self, BoxDescriptor};
use crate::pipeline::{ParseEvent, ParseEventKind};
use crate::placeholders::{
    missing_child_issue, PlaceholderCatalog, PlaceholderIdGenerator,
};
use crate::registry::ParsedPayload;
use crate::store::IssueStore;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Valid,
    Partial,
    Corrupt,
    Skipped,
    Invalid,
    Empty,
    Trimmed,
}

/// Node under construction. Owned exclusively by the builder: open nodes
/// live on its stack and attach to their parent when they close, so the
/// finished tree has plain parent-owns-children ownership and no
/// back-pointers.
#[derive(Debug)]
struct MutableNode {
    id: NodeId,
    header: BoxHeader,
    metadata: Option<BoxDescriptor>,
    payload: Option<ParsedPayload>,
    validation_issues: Vec<ValidationIssue>,
    issues: Vec<ParseIssue>,
    status: NodeStatus,
    depth: usize,
    children: Vec<MutableNode>,
}

impl MutableNode {
    fn snapshot(&self) -> ParseTreeNode {
        ParseTreeNode {
            id: self.id,
            header: self.header.clone(),
            metadata: self.metadata.clone(),
            payload: self.payload.clone(),
            validation_issues: self.validation_issues.clone(),
            issues: self.issues.clone(),
            status: self.status,
            depth: self.depth,
            children: self.children.iter().map(MutableNode::snapshot).collect(),
        }
    }
}

/// Immutable snapshot of one parsed box and its subtree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseTreeNode {
    pub id: NodeId,
    pub header: BoxHeader,
    pub metadata: Option<BoxDescriptor>,
    pub payload: Option<ParsedPayload>,
    pub validation_issues: Vec<ValidationIssue>,
    pub issues: Vec<ParseIssue>,
    pub status: NodeStatus,
    pub depth: usize,
    pub children: Vec<ParseTreeNode>,
}

impl ParseTreeNode {
    pub fn is_placeholder(&self) -> bool {
        self.id < 0
    }
}

/// The finished artifact: root nodes plus every validation issue seen
/// while they were built.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct ParseTree {
    pub roots: Vec<ParseTreeNode>,
    pub validation_issues: Vec<ValidationIssue>,
}

/// Incrementally materializes a tree from the event sequence.
///
/// The builder mirrors the nesting the events imply without trusting it:
/// a finish event that matches no open frame closes the frames above the
/// match (or, with no match anywhere, is dropped after the open frames
/// drain), so a corrupted event stream still yields a well-formed tree.
pub struct TreeBuilder {
    roots: Vec<MutableNode>,
    stack: Vec<MutableNode>,
    aggregated_issues: Vec<ValidationIssue>,
    placeholder_ids: PlaceholderIdGenerator,
    catalog: PlaceholderCatalog,
    store: Option<Arc<IssueStore>>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        TreeBuilder {
            roots: Vec::new(),
            stack: Vec::new(),
            aggregated_issues: Vec::new(),
            placeholder_ids: PlaceholderIdGenerator::default(),
            catalog: PlaceholderCatalog::default(),
            store: None,
        }
    }

    pub fn with_catalog(mut self, catalog: PlaceholderCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Placeholder-synthesis issues are mirrored into `store` as they are
    /// fabricated.
    pub fn with_issue_store(mut self, store: Arc<IssueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn consume(&mut self, event: &ParseEvent) {
        self.aggregated_issues.extend(event.validation_issues.iter().cloned());
        match &event.kind {
            ParseEventKind::StartBox { header, depth } => {
                self.start_box(header.clone(), event, *depth);
            }
            ParseEventKind::FinishBox { header, .. } => self.finish_box(header, event),
        }
    }

    fn start_box(&mut self, header: BoxHeader, event: &ParseEvent, depth: usize) {
        let mut node = MutableNode {
            id: header.node_id(),
            header,
            metadata: event.metadata.clone(),
            payload: event.payload.clone(),
            validation_issues: event.validation_issues.clone(),
            issues: Vec::new(),
            status: NodeStatus::Valid,
            depth,
            children: Vec::new(),
        };
        if !event.issues.is_empty() {
            if contains_guard_issues(&event.issues) {
                node.status = NodeStatus::Partial;
            }
            node.issues.extend(event.issues.iter().cloned());
        }
        self.stack.push(node);
    }

    fn finish_box(&mut self, header: &BoxHeader, event: &ParseEvent) {
        loop {
            // Emptied without a match: the event is dropped (its problem was
            // already reported upstream as a guard issue).
            let Some(node) = self.stack.pop() else { return };
            if node.header != *header {
                self.attach(node);
                continue;
            }

            let mut node = node;
            // Each field arrives once: an incoming value wins, an absent
            // one never clears what the start event supplied.
            if event.metadata.is_some() {
                node.metadata = event.metadata.clone();
            }
            if event.payload.is_some() {
                node.payload = event.payload.clone();
            }
            node.validation_issues.extend(event.validation_issues.iter().cloned());
            if !event.issues.is_empty() {
                if contains_guard_issues(&event.issues) && node.status != NodeStatus::Corrupt {
                    node.status = NodeStatus::Partial;
                }
                node.issues.extend(event.issues.iter().cloned());
            }
            self.synthesize_placeholders(&mut node);
            self.attach(node);
            return;
        }
    }

    fn attach(&mut self, node: MutableNode) {
        match self.stack.last_mut() {
            Some(parent) => parent.children.push(node),
            None => self.roots.push(node),
        }
    }

    /// Repair a freshly closed container that is missing mandatory
    /// children. Never fails: each missing type becomes a corrupt
    /// placeholder child plus a guard issue on both nodes.
    fn synthesize_placeholders(&mut self, node: &mut MutableNode) {
        let existing: HashSet<_> = node.children.iter().map(|c| c.header.fourcc).collect();
        let missing = self.catalog.missing_requirements(&node.header, &existing);
        if missing.is_empty() {
            return;
        }

        if node.status != NodeStatus::Corrupt {
            node.status = NodeStatus::Partial;
        }
        for fourcc in missing {
            let id = self.placeholder_ids.next_id();
            let header = BoxHeader::placeholder(fourcc);
            let issue = missing_child_issue(&node.header, node.id, fourcc, id);
            if let Some(store) = &self.store {
                store.record(issue.clone(), Some(node.depth + 1));
            }
            node.issues.push(issue.clone());
            node.children.push(MutableNode {
                id,
                header,
                metadata: known_boxes::descriptor(fourcc),
                payload: None,
                validation_issues: Vec::new(),
                issues: vec![issue],
                status: NodeStatus::Corrupt,
                depth: node.depth + 1,
                children: Vec::new(),
            });
        }
    }

    /// Snapshot the accumulated state, open boxes included, so a consumer
    /// can render progress mid-stream.
    pub fn make_tree(&self) -> ParseTree {
        let mut roots: Vec<ParseTreeNode> =
            self.roots.iter().map(MutableNode::snapshot).collect();
        let mut open: Option<ParseTreeNode> = None;
        for node in self.stack.iter().rev() {
            let mut snap = node.snapshot();
            if let Some(child) = open.take() {
                snap.children.push(child);
            }
            open = Some(snap);
        }
        if let Some(open) = open {
            roots.push(open);
        }
        ParseTree { roots, validation_issues: self.aggregated_issues.clone() }
    }
}

impl Default for TreeBuilder {
    fn default() -> Self {
        TreeBuilder::new()
    }
}
