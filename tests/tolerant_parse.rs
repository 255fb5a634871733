use isoinspect::boxes::FourCC;
use isoinspect::issues::codes;
use isoinspect::pipeline::{ParseContext, ParseOptions, ParsePipeline, PipelineError};
use isoinspect::reader::MemorySource;
use isoinspect::store::IssueStore;
use isoinspect::tree::NodeStatus;
use std::sync::Arc;

fn boxed(typ: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut v = Vec::new();
    v.extend_from_slice(&((8 + payload.len()) as u32).to_be_bytes());
    v.extend_from_slice(typ);
    v.extend_from_slice(payload);
    v
}

fn parse(data: Vec<u8>, options: ParseOptions) -> (Result<isoinspect::tree::ParseTree, PipelineError>, Arc<IssueStore>) {
    let store = Arc::new(IssueStore::new());
    let context = ParseContext {
        source_name: Some("fixture.mp4".into()),
        issue_store: Some(Arc::clone(&store)),
        cancel: None,
    };
    let src = MemorySource::new(data);
    let result = ParsePipeline::new(options).parse_tree(&src, context);
    (result, store)
}

#[test]
fn minimal_valid_file_parses_clean() {
    // 20 bytes: size + "ftyp" + 12 payload bytes
    let mut payload = Vec::new();
    payload.extend_from_slice(b"isom");
    payload.extend_from_slice(&512u32.to_be_bytes());
    payload.extend_from_slice(b"isom");
    let data = boxed(b"ftyp", &payload);
    assert_eq!(data.len(), 20);

    let (result, store) = parse(data, ParseOptions::tolerant());
    let tree = result.expect("clean parse");

    assert_eq!(tree.roots.len(), 1);
    let root = &tree.roots[0];
    assert_eq!(root.header.fourcc, FourCC(*b"ftyp"));
    assert_eq!(root.status, NodeStatus::Valid);
    assert!(root.issues.is_empty());
    assert!(tree.validation_issues.is_empty());
    assert_eq!(store.metrics_snapshot().total(), 0);
}

#[test]
fn empty_moov_is_repaired_end_to_end() {
    let data = boxed(b"moov", &[]);
    let (result, store) = parse(data, ParseOptions::tolerant());
    let tree = result.expect("tolerant parse");

    let moov = &tree.roots[0];
    assert_eq!(moov.status, NodeStatus::Partial);
    assert_eq!(moov.children.len(), 1);
    let placeholder = &moov.children[0];
    assert!(placeholder.is_placeholder());
    assert_eq!(placeholder.header.fourcc, FourCC(*b"mvhd"));
    assert_eq!(placeholder.status, NodeStatus::Corrupt);

    // the synthesis issue is queryable without walking the tree
    assert_eq!(store.issues_for_node(-1).len(), 1);
    assert_eq!(store.issues_for_node(-1)[0].code, codes::MISSING_CHILD);
    assert_eq!(store.metrics_snapshot().error_count, 1);
}

#[test]
fn oversized_child_leaves_partial_parent_in_tree() {
    // moov declares 24 bytes; its mvhd child claims 100
    let mut child = Vec::new();
    child.extend_from_slice(&100u32.to_be_bytes());
    child.extend_from_slice(b"mvhd");
    child.extend_from_slice(&[0u8; 8]);
    let mut data = Vec::new();
    data.extend_from_slice(&((8 + child.len()) as u32).to_be_bytes());
    data.extend_from_slice(b"moov");
    data.extend_from_slice(&child);

    let (result, store) = parse(data, ParseOptions::tolerant());
    let tree = result.expect("tolerant parse");

    let moov = &tree.roots[0];
    assert_eq!(moov.status, NodeStatus::Partial);
    assert_eq!(moov.children.len(), 1, "clamped child still present, no placeholder");
    let mvhd = &moov.children[0];
    assert_eq!(mvhd.status, NodeStatus::Partial);
    assert!(mvhd.issues.iter().any(|i| i.code == codes::EXCEEDS_PARENT));

    // indexed under both the child and the parent it damaged
    assert!(!store.issues_for_node(mvhd.id).is_empty());
    assert!(!store.issues_for_node(moov.id).is_empty());
}

#[test]
fn oversized_child_is_fatal_under_strict_options() {
    let mut child = Vec::new();
    child.extend_from_slice(&100u32.to_be_bytes());
    child.extend_from_slice(b"mvhd");
    child.extend_from_slice(&[0u8; 8]);
    let mut data = Vec::new();
    data.extend_from_slice(&((8 + child.len()) as u32).to_be_bytes());
    data.extend_from_slice(b"moov");
    data.extend_from_slice(&child);

    let (result, _store) = parse(data, ParseOptions::strict());
    assert!(matches!(result, Err(PipelineError::Structural { .. })));
}

#[test]
fn sibling_after_corrupt_region_still_parses() {
    // a valid file followed by garbage that cannot decode
    let mut data = boxed(b"ftyp", b"isomxxxxisom");
    data.extend_from_slice(&boxed(b"free", &[0u8; 4]));
    data.extend_from_slice(&[0, 0, 0, 1]); // truncated extended-size header

    let (result, store) = parse(data, ParseOptions::tolerant());
    let tree = result.expect("tolerant parse");

    assert_eq!(tree.roots.len(), 2);
    assert!(tree.roots.iter().all(|n| n.status == NodeStatus::Valid));
    assert!(store
        .issues_snapshot()
        .iter()
        .all(|i| i.code == codes::HEADER_DECODE));
    assert!(store.metrics_snapshot().error_count > 0);
}

#[test]
fn nested_track_chain_is_repaired_at_every_level() {
    // trak { mdia { minf { } } } — missing tkhd, mdhd, and stbl
    let minf = boxed(b"minf", &[]);
    let mdia = boxed(b"mdia", &minf);
    let trak = boxed(b"trak", &mdia);

    let (result, store) = parse(trak, ParseOptions::tolerant());
    let tree = result.expect("tolerant parse");

    let trak_node = &tree.roots[0];
    let mdia_node = &trak_node.children[0];
    let minf_node = &mdia_node.children[0];

    assert_eq!(trak_node.status, NodeStatus::Partial);
    assert_eq!(mdia_node.status, NodeStatus::Partial);
    assert_eq!(minf_node.status, NodeStatus::Partial);

    // innermost container closed first: stbl -1, then mdhd -2, then tkhd -3
    let ids: Vec<i64> = [
        (minf_node, *b"stbl"),
        (mdia_node, *b"mdhd"),
        (trak_node, *b"tkhd"),
    ]
    .iter()
    .map(|(node, typ)| {
        node.children
            .iter()
            .find(|c| c.header.fourcc == FourCC(*typ))
            .expect("placeholder present")
            .id
    })
    .collect();
    assert_eq!(ids, vec![-1, -2, -3]);

    assert_eq!(store.metrics_snapshot().error_count, 3);
}

#[test]
fn issue_ranges_are_queryable_after_the_parse() {
    // moov declares 24 bytes; its mvhd child claims 100
    let mut child = Vec::new();
    child.extend_from_slice(&100u32.to_be_bytes());
    child.extend_from_slice(b"mvhd");
    child.extend_from_slice(&[0u8; 8]);
    let mut data = Vec::new();
    data.extend_from_slice(&((8 + child.len()) as u32).to_be_bytes());
    data.extend_from_slice(b"moov");
    data.extend_from_slice(&child);

    let (result, store) = parse(data, ParseOptions::tolerant());
    result.expect("tolerant parse");

    // the guard issue anchors at the child's declared range 8..108
    assert!(!store.issues_in_range(8..9).is_empty());
    assert!(store.issues_in_range(0..8).is_empty());
}
