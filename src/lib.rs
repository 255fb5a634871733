pub mod boxes;
pub mod issues;
pub mod json_api;
pub mod known_boxes;
pub mod parser;
pub mod pipeline;
pub mod placeholders;
pub mod reader;
pub mod registry;
pub mod store;
pub mod tree;

pub use boxes::{BoxHeader, FourCC, NodeId};
pub use issues::{ParseIssue, Severity, ValidationIssue};
pub use known_boxes::{BoxCategory, BoxDescriptor, KnownBox};
pub use parser::{read_box_header, HeaderDecodeError};
pub use pipeline::{
    ParseContext, ParseEvent, ParseEventKind, ParseOptions, ParsePipeline, PayloadValidation,
    PipelineError,
};
pub use placeholders::PlaceholderCatalog;
pub use reader::{MemorySource, RandomAccessSource, ReadError};
pub use store::{IssueMetrics, IssueStore, IssueSummary};
pub use tree::{NodeStatus, ParseTree, ParseTreeNode, TreeBuilder};
