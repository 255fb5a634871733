use crate::store::{IssueStore, IssueSummary};
use crate::tree::{NodeStatus, ParseTree, ParseTreeNode};
use serde::Serialize;

/// A JSON-serializable view of a single tree node.
///
/// Flattened for UIs and tools: string type codes, hex UUIDs, issue codes
/// instead of full issue records.
#[derive(Serialize)]
pub struct JsonNode {
    /// Node identity: start byte offset, or a negative id for placeholders.
    pub id: i64,
    pub offset: u64,
    pub size: u64,
    pub header_size: u64,
    pub typ: String,
    pub uuid: Option<String>,
    pub name: Option<&'static str>,
    pub status: NodeStatus,
    pub placeholder: bool,
    pub issue_codes: Vec<String>,
    pub validation_issue_count: usize,
    pub children: Vec<JsonNode>,
}

impl JsonNode {
    fn from_node(node: &ParseTreeNode) -> JsonNode {
        JsonNode {
            id: node.id,
            offset: node.header.range.start,
            size: node.header.total_size,
            header_size: node.header.header_size,
            typ: node.header.fourcc.to_string(),
            uuid: node.header.uuid.map(hex::encode),
            name: node.metadata.as_ref().map(|m| m.name),
            status: node.status,
            placeholder: node.is_placeholder(),
            issue_codes: node.issues.iter().map(|i| i.code.clone()).collect(),
            validation_issue_count: node.validation_issues.len(),
            children: node.children.iter().map(JsonNode::from_node).collect(),
        }
    }
}

#[derive(Serialize)]
struct JsonTree<'a> {
    roots: Vec<JsonNode>,
    validation_issue_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<&'a str>,
}

/// Serialize a parse tree to pretty JSON.
pub fn export_tree(tree: &ParseTree, source: Option<&str>) -> anyhow::Result<String> {
    let doc = JsonTree {
        roots: tree.roots.iter().map(JsonNode::from_node).collect(),
        validation_issue_count: tree.validation_issues.len(),
        source,
    };
    Ok(serde_json::to_string_pretty(&doc)?)
}

#[derive(Serialize)]
struct JsonIssueReport {
    summary: IssueSummary,
    issues: Vec<crate::issues::ParseIssue>,
}

/// Serialize the store's current issues and metrics to pretty JSON.
pub fn export_issues(store: &IssueStore) -> anyhow::Result<String> {
    let report = JsonIssueReport {
        summary: store.summary(),
        issues: store.issues_snapshot(),
    };
    Ok(serde_json::to_string_pretty(&report)?)
}
