//! Pipeline stages for one input file.
//!
//! Each submodule implements exactly one step, so each is testable on its
//! own and the orchestrator in [`crate::batch`] only sequences them.
//!
//! ## Data Flow
//!
//! ```text
//! input file ──▶ ocr ──▶ llm ──▶ write
//!   (path)     (stdin→   (chat   (temp file
//!               stdout)   POST)   + rename)
//! ```
//!
//! 1. [`ocr`]: pipe the file through the external OCR program; the only
//!    stage serialised across files, via [`ocr::OcrGate`]
//! 2. [`llm`]: one chat-completion round trip; the only stage with
//!    network I/O
//! 3. [`write`]: derive the output path and commit the text all-or-nothing

pub mod llm;
pub mod ocr;
pub mod write;
