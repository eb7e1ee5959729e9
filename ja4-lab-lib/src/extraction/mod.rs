//! Signature extraction.
//!
//! Capture artifacts are handed to the external JA4 tool one at a time; its
//! stdout is decoded incrementally ([`JsonStreamDecoder`]) and every session
//! is annotated with where it came from and the run context in the manifest.

pub mod decoder;
pub mod extractor;
pub mod manifest;
pub mod record;
pub mod tool;

pub use decoder::{decode_all, DecodeStats, JsonStreamDecoder};
pub use extractor::{
    annotate, discover_artifacts, into_sessions, write_ja4_results, ArtifactFailure,
    ExtractionReport, SignatureExtractor,
};
pub use manifest::load_manifest;
pub use record::{SignatureRecord, StreamId, ToolSession};
pub use tool::{detect_style, locate_tool, locate_tool_in, InvocationStyle, ToolCommand};
