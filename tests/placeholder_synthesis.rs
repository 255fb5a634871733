use isoinspect::boxes::{BoxHeader, FourCC};
use isoinspect::issues::codes;
use isoinspect::pipeline::{ParseEvent, ParseEventKind};
use isoinspect::placeholders::PlaceholderCatalog;
use isoinspect::store::IssueStore;
use isoinspect::tree::{NodeStatus, TreeBuilder};
use std::collections::HashSet;
use std::sync::Arc;

fn header_at(offset: u64, size: u64, typ: &[u8; 4]) -> BoxHeader {
    BoxHeader {
        fourcc: FourCC(*typ),
        total_size: size,
        header_size: 8,
        payload: offset + 8..offset + size,
        range: offset..offset + size,
        uuid: None,
    }
}

fn start(header: &BoxHeader, depth: usize) -> ParseEvent {
    ParseEvent {
        kind: ParseEventKind::StartBox { header: header.clone(), depth },
        metadata: None,
        payload: None,
        validation_issues: Vec::new(),
        issues: Vec::new(),
    }
}

fn finish(header: &BoxHeader, depth: usize) -> ParseEvent {
    ParseEvent {
        kind: ParseEventKind::FinishBox { header: header.clone(), depth },
        metadata: None,
        payload: None,
        validation_issues: Vec::new(),
        issues: Vec::new(),
    }
}

#[test]
fn empty_moov_gains_a_movie_header_placeholder() {
    let moov = header_at(0, 8, b"moov");

    let mut builder = TreeBuilder::new();
    builder.consume(&start(&moov, 0));
    builder.consume(&finish(&moov, 0));

    let tree = builder.make_tree();
    assert_eq!(tree.roots.len(), 1);
    let root = &tree.roots[0];
    assert_eq!(root.status, NodeStatus::Partial);
    assert_eq!(root.children.len(), 1);

    let placeholder = &root.children[0];
    assert_eq!(placeholder.header.fourcc, FourCC(*b"mvhd"));
    assert_eq!(placeholder.id, -1);
    assert!(placeholder.is_placeholder());
    assert_eq!(placeholder.status, NodeStatus::Corrupt);
    assert_eq!(placeholder.header.total_size, 0);
    assert_eq!(placeholder.header.range, 0..0);
    assert_eq!(placeholder.depth, 1);

    // the issue lands on the placeholder and on the parent
    assert_eq!(placeholder.issues.len(), 1);
    assert_eq!(placeholder.issues[0].code, codes::MISSING_CHILD);
    assert!(root.issues.iter().any(|i| i.code == codes::MISSING_CHILD));
    assert_eq!(placeholder.issues[0].affected_nodes, vec![0, -1]);
}

#[test]
fn satisfied_container_gets_no_placeholders() {
    let moov = header_at(0, 40, b"moov");
    let mvhd = header_at(8, 32, b"mvhd");

    let mut builder = TreeBuilder::new();
    builder.consume(&start(&moov, 0));
    builder.consume(&start(&mvhd, 1));
    builder.consume(&finish(&mvhd, 1));
    builder.consume(&finish(&moov, 0));

    let tree = builder.make_tree();
    let root = &tree.roots[0];
    assert_eq!(root.status, NodeStatus::Valid);
    assert_eq!(root.children.len(), 1);
    assert!(root.issues.is_empty());
}

#[test]
fn synthetic_ids_decrease_across_the_run() {
    // trak { mdia } — mdia is missing mdhd, trak is missing tkhd
    let trak = header_at(0, 48, b"trak");
    let mdia = header_at(8, 40, b"mdia");

    let mut builder = TreeBuilder::new();
    builder.consume(&start(&trak, 0));
    builder.consume(&start(&mdia, 1));
    builder.consume(&finish(&mdia, 1));
    builder.consume(&finish(&trak, 0));

    let tree = builder.make_tree();
    let trak_node = &tree.roots[0];
    let mdia_node = &trak_node.children[0];

    // mdia closed first, so its placeholder got -1; trak's got -2
    assert_eq!(mdia_node.children[0].id, -1);
    assert_eq!(mdia_node.children[0].header.fourcc, FourCC(*b"mdhd"));
    let trak_placeholder = trak_node
        .children
        .iter()
        .find(|c| c.is_placeholder())
        .expect("trak placeholder");
    assert_eq!(trak_placeholder.id, -2);
    assert_eq!(trak_placeholder.header.fourcc, FourCC(*b"tkhd"));

    let ids: HashSet<_> = [mdia_node.children[0].id, trak_placeholder.id].into();
    assert_eq!(ids.len(), 2, "synthetic ids never collide");
}

#[test]
fn synthesis_is_deterministic() {
    let run = || {
        let moov = header_at(0, 8, b"moov");
        let mut builder = TreeBuilder::new();
        builder.consume(&start(&moov, 0));
        builder.consume(&finish(&moov, 0));
        builder.make_tree()
    };
    assert_eq!(run(), run());
}

#[test]
fn custom_catalog_drives_multiple_placeholders() {
    let catalog = PlaceholderCatalog::empty().with_requirement(
        FourCC(*b"grp "),
        &[FourCC(*b"hdr "), FourCC(*b"idx ")],
    );
    let grp = header_at(0, 8, b"grp ");

    let mut builder = TreeBuilder::new().with_catalog(catalog);
    builder.consume(&start(&grp, 0));
    builder.consume(&finish(&grp, 0));

    let tree = builder.make_tree();
    let root = &tree.roots[0];
    assert_eq!(root.status, NodeStatus::Partial);
    assert_eq!(root.children.len(), 2);
    // catalog order, decreasing ids
    assert_eq!(root.children[0].header.fourcc, FourCC(*b"hdr "));
    assert_eq!(root.children[0].id, -1);
    assert_eq!(root.children[1].header.fourcc, FourCC(*b"idx "));
    assert_eq!(root.children[1].id, -2);
    assert_eq!(root.issues.len(), 2);
}

#[test]
fn placeholder_issues_reach_the_issue_store() {
    let store = Arc::new(IssueStore::new());
    let moov = header_at(16, 8, b"moov");

    let mut builder = TreeBuilder::new().with_issue_store(Arc::clone(&store));
    builder.consume(&start(&moov, 0));
    builder.consume(&finish(&moov, 0));

    let issues = store.issues_snapshot();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].code, codes::MISSING_CHILD);
    // indexed under both the parent and the synthetic child
    assert_eq!(store.issues_for_node(16).len(), 1);
    assert_eq!(store.issues_for_node(-1).len(), 1);
}

#[test]
fn placeholder_carries_catalog_metadata() {
    let moov = header_at(0, 8, b"moov");
    let mut builder = TreeBuilder::new();
    builder.consume(&start(&moov, 0));
    builder.consume(&finish(&moov, 0));

    let tree = builder.make_tree();
    let placeholder = &tree.roots[0].children[0];
    assert_eq!(
        placeholder.metadata.as_ref().map(|m| m.name),
        Some("Movie Header Box")
    );
}
