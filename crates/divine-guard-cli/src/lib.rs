// crates/divine-guard-cli/src/lib.rs
// ============================================================================
// Module: Divine Guard CLI Library
// Description: Shared helpers for the Divine Guard CLI binary.
// Purpose: Keep bounded input reads and rule file handling testable.
// Dependencies: divine-guard-config, divine-guard-core, divine-guard-server
// ============================================================================

//! ## Overview
//! Library half of the `divine-guard` binary. The binary owns argument
//! parsing and output; this crate owns reading rule files under a size cap,
//! validating them as a batch, and running them through a control plane.
//!
//! Security posture: CLI inputs are untrusted; reads are bounded and batches
//! fail closed before any write.

pub mod input;
pub mod rules;

pub use input::MAX_INPUT_BYTES;
pub use input::ReadLimitError;
pub use input::read_bytes_with_limit;
pub use rules::RuleFileError;
pub use rules::compile_offline;
pub use rules::import_rules;
pub use rules::parse_rule_file;
