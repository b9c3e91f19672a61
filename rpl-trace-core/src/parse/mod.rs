//! Log line grammars and event extraction
//!
//! The classifier recognises individual lines; the extractor turns a sequence
//! of classified lines into events.

pub mod classifier;
pub mod extractor;

// Re-export parser types
pub use classifier::{ClassifiedLine, LineClassifier, LinePayload};
pub use extractor::{EventExtractor, ExtractStats, ExtractedEvent, ExtractedKind, TableState};
