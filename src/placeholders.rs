use crate::boxes::{BoxHeader, FourCC, NodeId};
use crate::issues::{codes, ParseIssue, Severity};
use std::collections::HashSet;
use std::ops::Range;

/// Which container types must carry which direct children.
///
/// This is configuration data, not logic: the default table covers the
/// header-bearing containers, and callers can extend it as the format
/// knowledge grows.
#[derive(Debug, Clone)]
pub struct PlaceholderCatalog {
    requirements: Vec<(FourCC, Vec<FourCC>)>,
}

impl PlaceholderCatalog {
    pub fn empty() -> Self {
        PlaceholderCatalog { requirements: Vec::new() }
    }

    /// Return a new catalog with `children` required under `parent`.
    pub fn with_requirement(mut self, parent: FourCC, children: &[FourCC]) -> Self {
        self.requirements.push((parent, children.to_vec()));
        self
    }

    /// Required-but-absent direct child types for this container, in catalog
    /// order. Empty for non-container types and satisfied containers.
    pub fn missing_requirements(
        &self,
        parent: &BoxHeader,
        existing_child_types: &HashSet<FourCC>,
    ) -> Vec<FourCC> {
        self.requirements
            .iter()
            .find(|(fourcc, _)| *fourcc == parent.fourcc)
            .map(|(_, children)| {
                children
                    .iter()
                    .filter(|child| !existing_child_types.contains(child))
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Default for PlaceholderCatalog {
    fn default() -> Self {
        PlaceholderCatalog::empty()
            .with_requirement(FourCC(*b"moov"), &[FourCC(*b"mvhd")])
            .with_requirement(FourCC(*b"trak"), &[FourCC(*b"tkhd")])
            .with_requirement(FourCC(*b"mdia"), &[FourCC(*b"mdhd")])
            .with_requirement(FourCC(*b"minf"), &[FourCC(*b"stbl")])
            .with_requirement(FourCC(*b"stbl"), &[FourCC(*b"stsd")])
            .with_requirement(FourCC(*b"traf"), &[FourCC(*b"tfhd")])
    }
}

/// Hands out synthetic node identities: -1, -2, ... in synthesis order.
/// Identifiers depend only on the sequence, never on timing, so a given
/// input always produces the same ids.
#[derive(Debug, Default)]
pub struct PlaceholderIdGenerator {
    last: NodeId,
}

impl PlaceholderIdGenerator {
    pub fn next_id(&mut self) -> NodeId {
        self.last -= 1;
        self.last
    }
}

/// Issue describing a mandatory child that was absent from `parent`.
pub fn missing_child_issue(
    parent: &BoxHeader,
    parent_id: NodeId,
    missing: FourCC,
    placeholder_id: NodeId,
) -> ParseIssue {
    ParseIssue {
        severity: Severity::Error,
        code: codes::MISSING_CHILD.to_string(),
        message: format!("{} missing required child {}", parent.label(), missing),
        byte_range: anchor_range(parent),
        affected_nodes: vec![parent_id, placeholder_id],
    }
}

/// Bytes the missing-child issue points at: the parent's payload when it
/// has one, the header bytes otherwise, nothing for a degenerate parent.
fn anchor_range(parent: &BoxHeader) -> Option<Range<u64>> {
    if parent.payload.start < parent.payload.end {
        Some(parent.payload.clone())
    } else if parent.range.start < parent.range.end {
        Some(parent.range.clone())
    } else {
        None
    }
}
