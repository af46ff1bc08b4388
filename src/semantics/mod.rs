// This module groups the front half of the middle end: declaration discovery, which
// fills the symbol tables before anything is analysed, and the two-pass semantic
// analyser together with the pure helpers it relies on (accessibility decisions,
// operand-kind validation, literal evaluation and folding).

//! Declaration discovery and semantic analysis.

pub mod access;
pub mod analyser;
pub mod discovery;
pub mod literals;
pub mod operators;

pub use access::is_accessible;
pub use analyser::{AnalysisPass, SemanticAnalyser};
pub use discovery::DeclarationDiscovery;
