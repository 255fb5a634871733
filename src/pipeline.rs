use crate::boxes::BoxHeader;
use crate::issues::{codes, ParseIssue, Severity, ValidationIssue};
use crate::known_boxes::{self, BoxDescriptor, KnownBox};
use crate::parser::{read_box_header, HeaderDecodeError};
use crate::reader::{RandomAccessSource, ReadError, SourceExt};
use crate::registry::{default_registry, BoxKey, DecodedPayload, ParsedPayload, Registry};
use crate::store::IssueStore;
use crate::tree::{ParseTree, TreeBuilder};
use std::collections::VecDeque;
use std::io::Cursor;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// How much payload interpretation the traversal performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadValidation {
    /// Decode known payloads and validate their fields.
    Full,
    /// Confirm byte-range consistency only; skip field-level decoding.
    StructureOnly,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptions {
    /// Stop the whole traversal on the first structural problem instead of
    /// recording an issue and recovering.
    pub abort_on_structural_error: bool,
    /// Malformed boxes tolerated before the traversal gives up.
    pub max_corruption_events: u32,
    pub payload_validation: PayloadValidation,
    /// Boxes nested deeper than this are kept as leaves.
    pub max_depth: usize,
}

impl ParseOptions {
    pub fn strict() -> Self {
        ParseOptions {
            abort_on_structural_error: true,
            max_corruption_events: 0,
            payload_validation: PayloadValidation::Full,
            max_depth: 64,
        }
    }

    pub fn tolerant() -> Self {
        ParseOptions {
            abort_on_structural_error: false,
            max_corruption_events: 500,
            payload_validation: PayloadValidation::StructureOnly,
            max_depth: 64,
        }
    }
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions::tolerant()
    }
}

/// Per-traversal collaborators: an optional diagnostics sink, a label for
/// log lines, and an optional flag another thread can set to stop the
/// traversal at the next box boundary.
#[derive(Clone, Default)]
pub struct ParseContext {
    pub source_name: Option<String>,
    pub issue_store: Option<Arc<IssueStore>>,
    pub cancel: Option<Arc<AtomicBool>>,
}

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("header decode failed at offset {offset:#x}: {source}")]
    HeaderDecode {
        offset: u64,
        #[source]
        source: HeaderDecodeError,
    },
    #[error("corruption budget of {budget} exceeded at offset {offset:#x}")]
    CorruptionBudget { offset: u64, budget: u32 },
    #[error("structural violation ({code}) at offset {offset:#x}: {message}")]
    Structural { code: &'static str, offset: u64, message: String },
    #[error("io: {0}")]
    Io(#[from] ReadError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParseEventKind {
    StartBox { header: BoxHeader, depth: usize },
    FinishBox { header: BoxHeader, depth: usize },
}

/// One step of the traversal. Start and finish events are strictly nested:
/// a box's start precedes all events of its descendants, which precede its
/// own finish; siblings follow byte offset order.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseEvent {
    pub kind: ParseEventKind,
    pub metadata: Option<BoxDescriptor>,
    pub payload: Option<ParsedPayload>,
    pub validation_issues: Vec<ValidationIssue>,
    pub issues: Vec<ParseIssue>,
}

impl ParseEvent {
    pub fn header(&self) -> &BoxHeader {
        match &self.kind {
            ParseEventKind::StartBox { header, .. } => header,
            ParseEventKind::FinishBox { header, .. } => header,
        }
    }

    pub fn depth(&self) -> usize {
        match &self.kind {
            ParseEventKind::StartBox { depth, .. } => *depth,
            ParseEventKind::FinishBox { depth, .. } => *depth,
        }
    }
}

/// Streaming traversal engine over a random-access source.
pub struct ParsePipeline {
    options: ParseOptions,
    registry: Registry,
}

impl ParsePipeline {
    pub fn new(options: ParseOptions) -> Self {
        ParsePipeline { options, registry: default_registry() }
    }

    pub fn with_registry(options: ParseOptions, registry: Registry) -> Self {
        ParsePipeline { options, registry }
    }

    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    /// Lazily walk `source`, yielding one event per pull. At most one read
    /// is outstanding at a time; dropping the iterator (or setting the
    /// context's cancel flag) stops the traversal at the next box boundary.
    pub fn events<'a>(
        &'a self,
        source: &'a dyn RandomAccessSource,
        context: ParseContext,
    ) -> ParseEvents<'a> {
        let root = Frame {
            header: None,
            depth: 0,
            payload: 0..source.len(),
            cursor: 0,
            descend: true,
            interpret: false,
            finish_issues: Vec::new(),
        };
        ParseEvents {
            source,
            options: &self.options,
            registry: &self.registry,
            context,
            stack: vec![root],
            pending: VecDeque::new(),
            corruption_events: 0,
            finished: false,
        }
    }

    /// Drive a full traversal into a [`TreeBuilder`] and snapshot the
    /// result. The context's issue store (if any) receives diagnostics from
    /// both the traversal and placeholder synthesis.
    pub fn parse_tree(
        &self,
        source: &dyn RandomAccessSource,
        context: ParseContext,
    ) -> Result<ParseTree, PipelineError> {
        let mut builder = TreeBuilder::new();
        if let Some(store) = &context.issue_store {
            builder = builder.with_issue_store(Arc::clone(store));
        }
        let mut events = self.events(source, context);
        while let Some(event) = events.next() {
            builder.consume(&event?);
        }
        Ok(builder.make_tree())
    }
}

struct Frame {
    /// `None` for the virtual frame spanning the whole source.
    header: Option<BoxHeader>,
    depth: usize,
    /// Clamped payload range; for containers this is the child scan range.
    payload: Range<u64>,
    cursor: u64,
    descend: bool,
    interpret: bool,
    /// Guard issues raised by children that damaged this box's contents;
    /// they ride along on its finish event so the node closes as partial.
    finish_issues: Vec<ParseIssue>,
}

impl Frame {
    fn child_depth(&self) -> usize {
        if self.header.is_some() { self.depth + 1 } else { 0 }
    }
}

/// Pull-based event sequence produced by [`ParsePipeline::events`].
pub struct ParseEvents<'a> {
    source: &'a dyn RandomAccessSource,
    options: &'a ParseOptions,
    registry: &'a Registry,
    context: ParseContext,
    stack: Vec<Frame>,
    pending: VecDeque<Result<ParseEvent, PipelineError>>,
    corruption_events: u32,
    finished: bool,
}

impl Iterator for ParseEvents<'_> {
    type Item = Result<ParseEvent, PipelineError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if let Some(item) = self.pending.pop_front() {
            if item.is_err() {
                self.finished = true;
            }
            return Some(item);
        }
        if self.cancelled() {
            self.finished = true;
            return None;
        }
        loop {
            let Some(frame) = self.stack.last() else {
                self.finished = true;
                return None;
            };

            if !frame.descend || frame.cursor >= frame.payload.end {
                let Some(finished) = self.stack.pop() else {
                    self.finished = true;
                    return None;
                };
                match finished.header.clone() {
                    Some(header) => return Some(Ok(self.finish_event(header, finished))),
                    None => {
                        self.finished = true;
                        return None;
                    }
                }
            }

            let offset = frame.cursor;
            let parent_range = frame.payload.clone();
            match read_box_header(self.source, offset, &parent_range) {
                Ok(header) => return Some(Ok(self.start_box(header))),
                Err(err) => {
                    if let Some(fatal) = self.handle_decode_failure(offset, err) {
                        self.finished = true;
                        return Some(Err(fatal));
                    }
                }
            }
        }
    }
}

impl ParseEvents<'_> {
    fn cancelled(&self) -> bool {
        self.context
            .cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    fn source_label(&self) -> &str {
        self.context.source_name.as_deref().unwrap_or("<source>")
    }

    fn record(&self, issue: &ParseIssue, depth: usize) {
        if let Some(store) = &self.context.issue_store {
            store.record(issue.clone(), Some(depth));
        }
    }

    /// Recover from a failed header decode, or return the fatal error that
    /// ends the traversal.
    fn handle_decode_failure(
        &mut self,
        offset: u64,
        err: HeaderDecodeError,
    ) -> Option<PipelineError> {
        // A violated source contract is fatal no matter what the options
        // say; only malformed content is recoverable.
        if matches!(err, HeaderDecodeError::Read(_)) || self.options.abort_on_structural_error {
            return Some(PipelineError::HeaderDecode { offset, source: err });
        }

        let skip = self.recovery_skip(offset);
        self.corruption_events += 1;

        let Some(frame) = self.stack.last_mut() else {
            return Some(PipelineError::HeaderDecode { offset, source: err });
        };
        let depth = frame.child_depth();
        let affected = frame.header.as_ref().map(|h| h.node_id()).into_iter().collect();
        let issue = ParseIssue {
            severity: Severity::Error,
            code: codes::HEADER_DECODE.to_string(),
            message: format!("header decode failed at {offset:#x} ({err}); skipped {skip} bytes"),
            byte_range: Some(offset..offset.saturating_add(skip)),
            affected_nodes: affected,
        };
        frame.cursor = offset.saturating_add(skip);
        log::warn!("{}: {}", self.source_label(), issue.message);
        self.record(&issue, depth);

        if self.corruption_events > self.options.max_corruption_events {
            let budget = self.options.max_corruption_events;
            let escalation = ParseIssue {
                severity: Severity::Error,
                code: codes::CORRUPTION_BUDGET.to_string(),
                message: format!("gave up after {} corrupt boxes", self.corruption_events),
                byte_range: Some(offset..offset.saturating_add(skip)),
                affected_nodes: Vec::new(),
            };
            self.record(&escalation, depth);
            return Some(PipelineError::CorruptionBudget { offset, budget });
        }
        None
    }

    /// Skip distance after a failed decode: the declared size when it looks
    /// plausible, else one byte and re-attempt.
    fn recovery_skip(&self, offset: u64) -> u64 {
        let Some(frame) = self.stack.last() else { return 1 };
        if let Ok(size32) = self.source.read_u32_be(offset) {
            let declared = size32 as u64;
            if declared >= 8 && offset.saturating_add(declared) <= frame.payload.end {
                return declared;
            }
        }
        1
    }

    fn start_box(&mut self, header: BoxHeader) -> ParseEvent {
        let Some(frame) = self.stack.last_mut() else {
            // next() only calls with a frame on the stack
            return ParseEvent {
                kind: ParseEventKind::StartBox { header, depth: 0 },
                metadata: None,
                payload: None,
                validation_issues: Vec::new(),
                issues: Vec::new(),
            };
        };
        let depth = frame.child_depth();
        let at_root = frame.header.is_none();
        let parent_end = frame.payload.end;
        let parent_id = frame.header.as_ref().map(|h| h.node_id());

        let mut issues = Vec::new();
        let mut effective_end = header.range.end;
        let mut violated = false;
        if header.range.end > parent_end {
            violated = true;
            effective_end = parent_end;
            let (code, message) = if at_root {
                (
                    codes::TRUNCATED,
                    format!(
                        "{} declares {} bytes but the source ends at {:#x}",
                        header.label(),
                        header.total_size,
                        parent_end
                    ),
                )
            } else {
                (
                    codes::EXCEEDS_PARENT,
                    format!(
                        "{} declares {} bytes but its parent ends at {:#x}",
                        header.label(),
                        header.total_size,
                        parent_end
                    ),
                )
            };
            let mut affected = vec![header.node_id()];
            affected.extend(parent_id);
            let issue = ParseIssue {
                severity: Severity::Error,
                code: code.to_string(),
                message,
                byte_range: Some(header.range.clone()),
                affected_nodes: affected,
            };
            // The overrun damages the parent's contents too.
            frame.finish_issues.push(issue.clone());
            issues.push(issue);
        }
        frame.cursor = effective_end;

        let payload_end = header.payload.end.min(effective_end);
        let payload_start = header.payload.start.min(payload_end);
        let payload_range = payload_start..payload_end;

        let kb = KnownBox::from(header.fourcc);
        let mut descend =
            kb.is_container() && !violated && payload_range.start < payload_range.end;
        if descend && depth + 1 > self.options.max_depth {
            descend = false;
            issues.push(ParseIssue {
                severity: Severity::Warning,
                code: codes::DEPTH_EXCEEDED.to_string(),
                message: format!(
                    "{} at depth {} exceeds the traversal depth limit {}; contents kept as opaque bytes",
                    header.label(),
                    depth,
                    self.options.max_depth
                ),
                byte_range: Some(header.range.clone()),
                affected_nodes: vec![header.node_id()],
            });
        }

        let interpret = !descend
            && !violated
            && self.options.payload_validation == PayloadValidation::Full
            && payload_range.start < payload_range.end
            && self.registry.contains(&BoxKey::for_header(&header));

        for issue in &issues {
            self.record(issue, depth);
        }

        let abort = violated && self.options.abort_on_structural_error;
        if abort {
            let first = &issues[0];
            self.pending.push_back(Err(PipelineError::Structural {
                code: if at_root { codes::TRUNCATED } else { codes::EXCEEDS_PARENT },
                offset: header.range.start,
                message: first.message.clone(),
            }));
        } else {
            self.stack.push(Frame {
                header: Some(header.clone()),
                depth,
                payload: payload_range,
                cursor: payload_start,
                descend,
                interpret,
                finish_issues: Vec::new(),
            });
        }

        ParseEvent {
            kind: ParseEventKind::StartBox {
                header: header.clone(),
                depth,
            },
            metadata: known_boxes::descriptor(header.fourcc),
            payload: None,
            validation_issues: Vec::new(),
            issues,
        }
    }

    fn finish_event(&mut self, header: BoxHeader, frame: Frame) -> ParseEvent {
        let mut payload = None;
        let mut validation_issues = Vec::new();
        if frame.interpret {
            match self.interpret_payload(&header, &frame.payload) {
                Ok(Some(decoded)) => {
                    payload = Some(decoded.payload);
                    validation_issues = decoded.issues;
                }
                Ok(None) => {}
                Err(issue) => validation_issues.push(issue),
            }
        }
        ParseEvent {
            kind: ParseEventKind::FinishBox { header, depth: frame.depth },
            metadata: None,
            payload,
            validation_issues,
            issues: frame.finish_issues,
        }
    }

    fn interpret_payload(
        &self,
        header: &BoxHeader,
        payload_range: &Range<u64>,
    ) -> Result<Option<DecodedPayload>, ValidationIssue> {
        let key = BoxKey::for_header(header);
        let mut offset = payload_range.start;
        let mut version = None;
        let mut flags = None;

        if KnownBox::from(header.fourcc).is_full_box() {
            if payload_range.end - offset < 4 {
                return Err(ValidationIssue::new(
                    Severity::Error,
                    format!("{} payload shorter than its version/flags", header.label()),
                ));
            }
            let bytes = self
                .source
                .read(offset, 4)
                .map_err(|e| ValidationIssue::new(Severity::Warning, format!("payload read failed: {e}")))?;
            version = Some(bytes[0]);
            flags = Some(((bytes[1] as u32) << 16) | ((bytes[2] as u32) << 8) | bytes[3] as u32);
            offset += 4;
        }

        let len = (payload_range.end - offset) as usize;
        let bytes = self
            .source
            .read(offset, len)
            .map_err(|e| ValidationIssue::new(Severity::Warning, format!("payload read failed: {e}")))?;
        let mut cur = Cursor::new(bytes);
        match self.registry.decode(&key, &mut cur, header, version, flags) {
            Some(Ok(decoded)) => Ok(Some(decoded)),
            Some(Err(e)) => Err(ValidationIssue::new(
                Severity::Warning,
                format!("payload decode failed: {e}"),
            )),
            None => Ok(None),
        }
    }
}
