//! Deepmind Block Machine
//!
//! This crate turns the deterministic trace stream emitted by an EOSIO-style
//! node (the "deep mind" log) into fully decoded, structured block records.
//! The stream is line-oriented, tag-prefixed, and produced strictly in
//! execution order; rebuilding blocks from it means assembling nested
//! block / transaction / action structures while simultaneously resolving
//! every action's binary payload to JSON using the historically correct
//! version of that contract's ABI, which itself changes over time and must be
//! rewound whenever the producing node forks.
//!
//! The parsing core is sans-IO: [`state_machine::ParseCtx`] is fed one line
//! at a time and hands back a finished [`types::Block`] whenever a line
//! completes one. The [`console`] module provides an async driver around it,
//! and the [`scanner`] module the thread that filters the raw byte stream
//! down to marked lines.
//!
//! # The trace stream
//!
//! Every line of interest starts with the `DMLOG ` marker followed by a tag
//! and a fixed, space-separated field layout:
//!
//! ```text
//! DMLOG START_BLOCK 1000
//! DMLOG CREATION_OP ROOT 0
//! DMLOG RAM_OP 0 eosio.token:tbl code add primary_index_add alice 2048 120
//! DMLOG APPLIED_TRANSACTION 1000 0eab...
//! DMLOG ACCEPTED_BLOCK 1000 1d42...
//! ```
//!
//! Ops accumulate against the transaction being traced until its
//! `APPLIED_TRANSACTION` directive closes it; `ACCEPTED_BLOCK` closes the
//! whole block and carries the node's authoritative block-state envelope.
//! Two protocol majors (12 and 13) are supported; where their field layouts
//! differ the parser branches on field count, never on tag name.
//!
//! # ABI resolution
//!
//! Contracts publish new ABI versions on chain through `setabi` actions. The
//! [`abi_cache`] keeps, per contract, the full history of published versions
//! keyed by the publishing action's global sequence, so any later action can
//! be decoded with the version that was active when it executed. The
//! [`abi_decoder`] watches block-number continuity: a break means the node
//! switched forks, and ABI versions recorded on the abandoned branch are
//! truncated away as soon as the new branch reveals its first global
//! sequence.
//!
//! # Reading blocks
//!
//! ```ignore
//! let file = std::fs::File::open("node.dmlog")?;
//! let mut reader = ConsoleReader::new(
//!     std::io::BufReader::new(file),
//!     Box::new(MyBinaryHydrator::default()),
//! )?;
//!
//! while let Some(block) = reader.read_block().await? {
//!     tracing::info!(
//!         num = block.number,
//!         traces = block.transaction_trace_count,
//!         "block assembled"
//!     );
//! }
//! ```
//!
//! Everything that differs between node major versions, the binary envelopes
//! of `ACCEPTED_BLOCK`, `APPLIED_TRANSACTION`, and packed transactions, sits
//! behind the [`hydrator::Hydrator`] trait; the core's tag dispatch never
//! looks at a version number. A JSON-envelope implementation backs the test
//! suite and replay tooling.
//!
//! # Custom drivers
//!
//! [`state_machine::ParseCtx`] has no opinion about where lines come from.
//! Feed it from any source and in return it emits blocks, in the exact order
//! the stream presented them:
//!
//! ```ignore
//! let mut ctx = ParseCtx::new(Box::new(MyBinaryHydrator::default()));
//! for line in lines {
//!     if let Some(block) = ctx.process_line(&line)? {
//!         sink.publish(block)?;
//!     }
//! }
//! ```
pub mod abi;
pub mod abi_cache;
pub mod abi_decoder;
pub mod console;
pub mod creation_tree;
pub mod directive;
pub mod hydrator;
pub mod scanner;
pub mod state_machine;
#[cfg(test)]
pub mod testkit;
pub mod types;
