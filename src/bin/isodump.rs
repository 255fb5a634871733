use clap::{ArgAction, Parser};
use isoinspect::{
    json_api,
    reader::{MemorySource, RandomAccessSource},
    store::IssueStore,
    tree::{NodeStatus, ParseTreeNode},
    FourCC, ParseContext, ParseOptions, ParsePipeline,
};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(version, about = "Tolerant MP4/ISOBMFF box explorer")]
struct Args {
    /// MP4/ISOBMFF file path
    path: String,

    /// Abort on the first structural error instead of recovering
    #[arg(long, action = ArgAction::SetTrue)]
    strict: bool,

    /// Limit recursion depth
    #[arg(long, default_value_t = 64)]
    max_depth: usize,

    /// Dump raw payload bytes of every box with this 4CC (e.g. --raw stsd)
    #[arg(long = "raw")]
    raw: Option<String>,

    /// Byte count when dumping raw (0 means the entire payload)
    #[arg(long, default_value_t = 0)]
    bytes: usize,

    /// Emit JSON instead of a human-readable tree
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let source = MemorySource::new(std::fs::read(&args.path)?);

    let mut options = if args.strict { ParseOptions::strict() } else { ParseOptions::tolerant() };
    options.max_depth = args.max_depth;

    let store = Arc::new(IssueStore::new());
    let context = ParseContext {
        source_name: Some(args.path.clone()),
        issue_store: Some(Arc::clone(&store)),
        cancel: None,
    };

    let pipeline = ParsePipeline::new(options);
    let tree = pipeline.parse_tree(&source, context)?;

    if args.json {
        println!("{}", json_api::export_tree(&tree, Some(&args.path))?);
        return Ok(());
    }

    for node in &tree.roots {
        print_node(node, 0);
    }

    let metrics = store.metrics_snapshot();
    if metrics.total() > 0 {
        println!(
            "\n{} issues ({} errors, {} warnings, {} info), deepest affected depth {}",
            metrics.total(),
            metrics.error_count,
            metrics.warning_count,
            metrics.info_count,
            metrics.deepest_affected_depth
        );
    }

    if let Some(sel) = args.raw.as_deref() {
        dump_raw(&source, &tree.roots, sel, args.bytes)?;
    }

    Ok(())
}

fn print_node(node: &ParseTreeNode, indent: usize) {
    let pad = "  ".repeat(indent);
    let status = match node.status {
        NodeStatus::Valid => String::new(),
        other => format!(" [{:?}]", other).to_lowercase(),
    };
    let name = node.metadata.as_ref().map(|m| m.name).unwrap_or("");
    if node.is_placeholder() {
        println!("{pad}     -          - {} (placeholder){status}", node.header.fourcc);
    } else {
        println!(
            "{pad}{:>6} {:>10} {} {}{status}",
            format!("{:#x}", node.header.range.start),
            node.header.total_size,
            node.header.fourcc,
            name
        );
    }
    for issue in &node.issues {
        println!("{pad}        ! {} {}", issue.code, issue.message);
    }
    for child in &node.children {
        print_node(child, indent + 1);
    }
}

fn dump_raw(
    source: &MemorySource,
    roots: &[ParseTreeNode],
    sel: &str,
    limit: usize,
) -> anyhow::Result<()> {
    let Some(fourcc) = FourCC::from_str(sel) else {
        anyhow::bail!("--raw expects a 4-character box type, got {sel:?}");
    };

    let mut matches = Vec::new();
    collect_matches(roots, fourcc, &mut matches);
    for (i, node) in matches.into_iter().enumerate() {
        let off = node.header.payload.start;
        let len = node.header.payload_len();
        let to_read = if limit == 0 || limit as u64 > len { len } else { limit as u64 };
        let data = source.read(off, to_read as usize)?;
        println!(
            "\n== Dump {} ({}) payload: offset={:#x}, len={} ==",
            i,
            node.header.fourcc,
            off,
            to_read
        );
        print!("{}", hex_dump(&data, off));
    }
    Ok(())
}

fn collect_matches<'a>(
    nodes: &'a [ParseTreeNode],
    fourcc: FourCC,
    out: &mut Vec<&'a ParseTreeNode>,
) {
    for node in nodes {
        if node.header.fourcc == fourcc && !node.is_placeholder() {
            out.push(node);
        }
        collect_matches(&node.children, fourcc, out);
    }
}

fn hex_dump(bytes: &[u8], start_offset: u64) -> String {
    let mut out = String::new();
    for (i, chunk) in bytes.chunks(16).enumerate() {
        let offs = start_offset + (i as u64) * 16;
        let hexs: String = chunk.iter().map(|b| format!("{:02x} ", b)).collect();
        let ascii: String = chunk
            .iter()
            .map(|b| if (32..=126).contains(b) { *b as char } else { '.' })
            .collect();
        out.push_str(&format!("{:08x}  {:<48}  |{}|\n", offs, hexs, ascii));
    }
    out
}
