use {
    crate::{
        abi_decoder::{AbiDecoder, AbiDecoderError},
        creation_tree::{compute_creation_tree, CreationTreeError},
        directive::{parse_directive, Directive, DirectiveError},
        hydrator::{HydrationError, Hydrator},
        types::{
            Block, CreationOp, DbOp, DtrxOp, FeatureOp, PermOp, RamCorrectionOp, RamOp, RlimitOp,
            TableOp, TransactionReceiptHeader, TransactionStatus, TransactionTrace, TrxOp,
        },
    },
};

/// Trace-stream protocol majors this assembler understands. Field layouts
/// differ slightly between the two; the directive parser branches on field
/// count to disambiguate.
pub const SUPPORTED_PROTOCOL_MAJORS: [u64; 2] = [12, 13];

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error(transparent)]
    Directive(#[from] DirectiveError),
    #[error("unsupported trace protocol major version {major}")]
    UnsupportedVersion { major: u64 },
    #[error(transparent)]
    Hydration(#[from] HydrationError),
    #[error(transparent)]
    AbiDecoder(#[from] AbiDecoderError),
    #[error(transparent)]
    CreationTree(#[from] CreationTreeError),
    #[error("{tag} directive for block {got} while block {active} is active")]
    BlockMismatch {
        tag: &'static str,
        active: u64,
        got: u64,
    },
    #[error("ABIDUMP ABI directive outside of a START/END dump window")]
    AbiOutsideDump,
}

/// Ops gathered for the transaction currently being traced. Drained into the
/// trace when its `APPLIED_TRANSACTION` directive arrives.
#[derive(Debug, Default)]
struct TrxAccumulator {
    creation_ops: Vec<CreationOp>,
    db_ops: Vec<DbOp>,
    dtrx_ops: Vec<DtrxOp>,
    feature_ops: Vec<FeatureOp>,
    perm_ops: Vec<PermOp>,
    ram_ops: Vec<RamOp>,
    ram_correction_ops: Vec<RamCorrectionOp>,
    rlimit_ops: Vec<RlimitOp>,
    table_ops: Vec<TableOp>,
}

/// Block-global accumulation: finished traces plus the ops that belong to the
/// block rather than to any one transaction.
#[derive(Debug, Default)]
struct BlockAccumulator {
    rlimit_ops: Vec<RlimitOp>,
    implicit_transaction_ops: Vec<TrxOp>,
    transaction_traces: Vec<TransactionTrace>,
}

///
/// The streaming block assembler.
///
/// Consumes one trace-stream line at a time and moves through
/// no-active-block, block-open, and transaction-open states, accumulating ops
/// until an `ACCEPTED_BLOCK` directive finalizes and emits the whole block.
///
/// Entirely sans-IO: it never reads, writes, or awaits. Feed it lines from
/// any source and drain emitted blocks as [`Self::process_line`] returns
/// them; the async driver in the console module is one such harness.
///
pub struct ParseCtx {
    hydrator: Box<dyn Hydrator>,
    decoder: AbiDecoder,

    block: BlockAccumulator,
    trx: TrxAccumulator,

    /// Block number from the last `START_BLOCK`; 0 means no active block.
    /// Chain-bootstrap ops arrive before any `START_BLOCK` and attach to
    /// block 1 without special casing.
    active_block_num: i64,

    /// Whether any block was ever opened. A fork signal during bootstrap
    /// resets only the transaction accumulator.
    seen_first_block: bool,

    /// Global sequence announced by an in-progress `ABIDUMP START`, if any.
    abi_dump_sequence: Option<u64>,
}

impl ParseCtx {
    pub fn new(hydrator: Box<dyn Hydrator>) -> Self {
        Self::with_decoder(hydrator, AbiDecoder::new())
    }

    /// Builds a context around an existing decoder, letting callers share or
    /// inspect its ABI cache.
    pub fn with_decoder(hydrator: Box<dyn Hydrator>, decoder: AbiDecoder) -> Self {
        Self {
            hydrator,
            decoder,
            block: BlockAccumulator::default(),
            trx: TrxAccumulator::default(),
            active_block_num: 0,
            seen_first_block: false,
            abi_dump_sequence: None,
        }
    }

    pub fn abi_decoder(&self) -> &AbiDecoder {
        &self.decoder
    }

    /// Processes one line (marker prefix already stripped). Returns the
    /// finished block when the line completes one, `None` otherwise.
    pub fn process_line(&mut self, line: &str) -> Result<Option<Block>, ParseError> {
        match parse_directive(line)? {
            Directive::DeepMindVersion { major, minor } => {
                if !SUPPORTED_PROTOCOL_MAJORS.contains(&major) {
                    return Err(ParseError::UnsupportedVersion { major });
                }
                tracing::info!(major, minor, "trace stream announced its protocol version");
                // The producer restarted; any version-specific decoding state
                // held by the hydrator is stale.
                self.hydrator.reset();
                Ok(None)
            }

            Directive::AbiDumpStart {
                block_num,
                global_sequence,
            } => {
                tracing::info!(block_num, global_sequence, "initial abi dump started");
                self.decoder.reset_cache()?;
                self.abi_dump_sequence = Some(global_sequence);
                Ok(None)
            }
            Directive::AbiDumpAbi { contract, abi } => {
                let Some(global_sequence) = self.abi_dump_sequence else {
                    return Err(ParseError::AbiOutsideDump);
                };
                let abi = self.hydrator.decode_abi(&abi)?;
                self.decoder
                    .add_initial_abi(&contract, global_sequence, abi)?;
                Ok(None)
            }
            Directive::AbiDumpEnd => {
                tracing::info!("initial abi dump finished");
                self.abi_dump_sequence = None;
                Ok(None)
            }

            Directive::StartBlock { block_num } => {
                self.active_block_num = block_num as i64;
                self.seen_first_block = true;
                self.decoder.start_block(block_num);
                Ok(None)
            }
            Directive::SwitchFork => {
                tracing::info!("fork signal, discarding in-flight accumulation");
                self.trx = TrxAccumulator::default();
                if self.seen_first_block {
                    self.block = BlockAccumulator::default();
                }
                Ok(None)
            }

            Directive::AppliedTransaction { block_num, payload } => {
                self.check_active_block("APPLIED_TRANSACTION", block_num)?;
                let trace = self.hydrator.hydrate_transaction_trace(&payload)?;
                self.record_transaction(trace)?;
                Ok(None)
            }
            Directive::AcceptedBlock { block_num, payload } => {
                self.check_active_block("ACCEPTED_BLOCK", block_num)?;
                self.finalize_block(&payload).map(Some)
            }

            Directive::CreationOp(op) => {
                self.trx.creation_ops.push(op);
                Ok(None)
            }
            Directive::DbOp(op) => {
                self.trx.db_ops.push(op);
                Ok(None)
            }
            Directive::DtrxOp { mut op, packed_trx } => {
                if let Some(bytes) = packed_trx {
                    op.transaction = Some(self.hydrator.hydrate_signed_transaction(&bytes)?);
                }
                self.trx.dtrx_ops.push(op);
                Ok(None)
            }
            Directive::FeatureOp(op) => {
                self.trx.feature_ops.push(op);
                Ok(None)
            }
            Directive::PermOp(op) => {
                self.trx.perm_ops.push(op);
                Ok(None)
            }
            Directive::RamOp(op) => {
                self.trx.ram_ops.push(op);
                Ok(None)
            }
            Directive::RamCorrectionOp(op) => {
                self.trx.ram_correction_ops.push(op);
                Ok(None)
            }
            Directive::RlimitOp(op) => {
                if op.kind.is_global() {
                    self.block.rlimit_ops.push(op);
                } else {
                    self.trx.rlimit_ops.push(op);
                }
                Ok(None)
            }
            Directive::TableOp(op) => {
                self.trx.table_ops.push(op);
                Ok(None)
            }
            Directive::TrxOp {
                name,
                transaction_id,
                packed_trx,
            } => {
                let transaction = self.hydrator.hydrate_signed_transaction(&packed_trx)?;
                self.block.implicit_transaction_ops.push(TrxOp {
                    name,
                    transaction_id,
                    transaction,
                });
                Ok(None)
            }

            Directive::Unknown { tag } => {
                tracing::info!(tag = tag.as_str(), "skipping unrecognized directive");
                Ok(None)
            }
        }
    }

    /// The block ops are currently attached to: the active block, or block 1
    /// during chain bootstrap.
    fn expected_block_num(&self) -> u64 {
        if self.active_block_num == 0 {
            1
        } else {
            self.active_block_num as u64
        }
    }

    fn check_active_block(&self, tag: &'static str, got: u64) -> Result<(), ParseError> {
        let active = self.expected_block_num();
        if active != got {
            return Err(ParseError::BlockMismatch { tag, active, got });
        }
        Ok(())
    }

    /// Closes out one traced transaction: deferred-failure restructuring,
    /// creation-tree stitching, op attachment, ABI decoding, accumulator
    /// reset.
    fn record_transaction(&mut self, mut trace: TransactionTrace) -> Result<(), ParseError> {
        if let Some(failed) = trace.failed_dtrx_trace.take() {
            self.record_failed_dtrx(*failed)?;

            // A hard-failed onerror handler rolls back everything it did,
            // except resource billing.
            if trace.is_hard_failure() {
                let rlimit_ops = std::mem::take(&mut self.trx.rlimit_ops);
                self.trx = TrxAccumulator {
                    rlimit_ops,
                    ..TrxAccumulator::default()
                };
            }
        }

        let acc = std::mem::take(&mut self.trx);
        trace.creation_tree = compute_creation_tree(&acc.creation_ops)?;
        trace.db_ops = acc.db_ops;
        trace.dtrx_ops = acc.dtrx_ops;
        trace.feature_ops = acc.feature_ops;
        trace.perm_ops = acc.perm_ops;
        trace.ram_ops = acc.ram_ops;
        trace.ram_correction_ops = acc.ram_correction_ops;
        trace.rlimit_ops = acc.rlimit_ops;
        trace.table_ops = acc.table_ops;

        self.decoder
            .process_transaction(&mut trace, self.hydrator.as_ref())?;
        self.block.transaction_traces.push(trace);
        Ok(())
    }

    /// The deferred transaction whose failure triggered this `onerror` run
    /// becomes its own trace in the block. The node rolls back everything the
    /// failed execution did except the removal of the deferred entry itself,
    /// so that one RAM op moves over from the current accumulation.
    fn record_failed_dtrx(&mut self, mut failed: TransactionTrace) -> Result<(), ParseError> {
        let (transferred, kept) = std::mem::take(&mut self.trx.ram_ops)
            .into_iter()
            .partition(|op: &RamOp| op.is_deferred_removal());
        failed.ram_ops = transferred;
        self.trx.ram_ops = kept;

        if failed.receipt.is_none() {
            failed.receipt = Some(TransactionReceiptHeader {
                status: TransactionStatus::SoftFail,
                cpu_usage_micro_seconds: 0,
                net_usage_words: 0,
            });
        }

        self.decoder
            .process_transaction(&mut failed, self.hydrator.as_ref())?;
        self.block.transaction_traces.push(failed);
        Ok(())
    }

    /// `ACCEPTED_BLOCK`: decode the authoritative block-state envelope, stamp
    /// every accumulated trace with its position and block identity, total up
    /// action counts, and emit the finished block.
    fn finalize_block(&mut self, payload: &[u8]) -> Result<Block, ParseError> {
        let state = self.hydrator.hydrate_block_state(payload)?;
        let acc = std::mem::take(&mut self.block);

        let mut block = Block {
            id: state.block_id,
            number: state.block_num,
            header: state.header,
            producer_signature: state.producer_signature,
            active_schedule: state.active_schedule,
            blockroot_merkle: state.blockroot_merkle,
            dpos_proposed_irreversible_blocknum: state.dpos_proposed_irreversible_blocknum,
            dpos_irreversible_blocknum: state.dpos_irreversible_blocknum,
            validated: state.validated,
            transaction_trace_count: acc.transaction_traces.len() as u64,
            executed_input_action_count: 0,
            executed_total_action_count: 0,
            rlimit_ops: acc.rlimit_ops,
            implicit_transaction_ops: acc.implicit_transaction_ops,
            transaction_traces: acc.transaction_traces,
        };

        let mut total_actions = 0u64;
        let mut input_actions = 0u64;
        for (index, trace) in block.transaction_traces.iter_mut().enumerate() {
            trace.index = index as u64;
            trace.block_num = block.number;
            trace.producer_block_id = block.id.clone();
            trace.block_time = block.header.timestamp.clone();
            for action_trace in &mut trace.action_traces {
                action_trace.transaction_id = trace.id.clone();
                action_trace.block_num = block.number;
                action_trace.producer_block_id = block.id.clone();
                action_trace.block_time = block.header.timestamp.clone();
                total_actions += 1;
                if action_trace.is_input() {
                    input_actions += 1;
                }
            }
        }
        block.executed_total_action_count = total_actions;
        block.executed_input_action_count = input_actions;

        tracing::debug!(
            block_num = block.number,
            transaction_traces = block.transaction_trace_count,
            actions = total_actions,
            "block assembled"
        );

        self.decoder.end_block(block.block_ref());
        self.active_block_num = 0;
        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            hydrator::JsonHydrator,
            testkit::setup_tracing_test,
            types::{
                Action, ActionReceipt, ActionTrace, BlockState, DbOpKind, RamOpAction,
                RamOpNamespace, SignedTransaction,
            },
        },
        base64::{engine::general_purpose::STANDARD as B64, Engine as _},
        serde::Serialize,
    };

    fn ctx() -> ParseCtx {
        ParseCtx::new(Box::new(JsonHydrator))
    }

    fn hex_json<T: Serialize>(value: &T) -> String {
        hex::encode(serde_json::to_vec(value).unwrap())
    }

    fn action_trace(account: &str, name: &str, creator_ordinal: u32, seq: u64) -> ActionTrace {
        ActionTrace {
            receiver: account.to_owned(),
            action: Action {
                account: account.to_owned(),
                name: name.to_owned(),
                ..Default::default()
            },
            receipt: Some(ActionReceipt {
                receiver: account.to_owned(),
                global_sequence: seq,
                ..Default::default()
            }),
            action_ordinal: 1,
            creator_action_ordinal: creator_ordinal,
            ..Default::default()
        }
    }

    fn block_state(num: u64, id: &str) -> BlockState {
        BlockState {
            block_num: num,
            block_id: id.to_owned(),
            header: crate::types::BlockHeader {
                timestamp: "2024-01-01T00:00:00.000".to_owned(),
                producer: "eosio".to_owned(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn feed(ctx: &mut ParseCtx, lines: &[&str]) -> Vec<Block> {
        let mut blocks = vec![];
        for line in lines {
            if let Some(block) = ctx.process_line(line).unwrap() {
                blocks.push(block);
            }
        }
        blocks
    }

    #[test]
    fn assembles_a_block_with_stamped_traces_and_counts() {
        setup_tracing_test();
        let mut ctx = ctx();

        let trace = TransactionTrace {
            id: "trx1".to_owned(),
            action_traces: vec![
                action_trace("eosio.token", "transfer", 0, 100),
                action_trace("bob", "transfer", 1, 101),
            ],
            ..Default::default()
        };

        let lines = [
            "DEEP_MIND_VERSION 13 0".to_owned(),
            "START_BLOCK 5".to_owned(),
            "CREATION_OP ROOT 0".to_owned(),
            "CREATION_OP NOTIFY 0".to_owned(),
            "RAM_OP 0 key table_row add primary_index_add alice 100 100".to_owned(),
            "TBL_OP INS 0 code scope tbl alice".to_owned(),
            format!("APPLIED_TRANSACTION 5 {}", hex_json(&trace)),
            format!("ACCEPTED_BLOCK 5 {}", hex_json(&block_state(5, "b5"))),
        ];
        let line_refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let blocks = feed(&mut ctx, &line_refs);

        assert_eq!(blocks.len(), 1);
        let block = &blocks[0];
        assert_eq!(block.number, 5);
        assert_eq!(block.id, "b5");
        assert_eq!(block.transaction_trace_count, 1);
        assert_eq!(block.executed_total_action_count, 2);
        assert_eq!(block.executed_input_action_count, 1);

        let trace = &block.transaction_traces[0];
        assert_eq!(trace.index, 0);
        assert_eq!(trace.block_num, 5);
        assert_eq!(trace.producer_block_id, "b5");
        assert_eq!(trace.ram_ops.len(), 1);
        assert_eq!(trace.table_ops.len(), 1);
        assert_eq!(trace.creation_tree.len(), 2);
        assert_eq!(trace.creation_tree[1].creator_walk_index, 0);
        assert_eq!(trace.action_traces[0].transaction_id, "trx1");
        assert_eq!(trace.action_traces[0].block_time, "2024-01-01T00:00:00.000");
    }

    #[test]
    fn global_rlimit_ops_land_on_the_block_account_ops_on_the_transaction() {
        setup_tracing_test();
        let mut ctx = ctx();
        ctx.process_line("START_BLOCK 1").unwrap();
        ctx.process_line(r#"RLIMIT_OP STATE UPD {"height": 1}"#).unwrap();
        ctx.process_line(r#"RLIMIT_OP ACCOUNT_USAGE UPD {"owner": "a"}"#)
            .unwrap();

        let trace = TransactionTrace {
            id: "trx1".to_owned(),
            ..Default::default()
        };
        ctx.process_line(&format!("APPLIED_TRANSACTION 1 {}", hex_json(&trace)))
            .unwrap();
        let block = ctx
            .process_line(&format!(
                "ACCEPTED_BLOCK 1 {}",
                hex_json(&block_state(1, "b1"))
            ))
            .unwrap()
            .unwrap();

        assert_eq!(block.rlimit_ops.len(), 1);
        assert_eq!(block.transaction_traces[0].rlimit_ops.len(), 1);
    }

    #[test]
    fn hard_failed_onerror_keeps_only_rlimit_and_deferred_removal_ops() {
        setup_tracing_test();
        let mut ctx = ctx();
        ctx.process_line("START_BLOCK 2").unwrap();

        // Ops recorded while the onerror handler executed.
        ctx.process_line("DB_OP INS 0 alice code scope tbl pk aa").unwrap();
        ctx.process_line("TBL_OP INS 0 code scope tbl alice").unwrap();
        ctx.process_line(r#"RLIMIT_OP ACCOUNT_USAGE UPD {"owner": "a"}"#)
            .unwrap();
        ctx.process_line("RAM_OP 0 k1 deferred_trx remove deferred_trx_removed alice 10 -10")
            .unwrap();
        ctx.process_line("RAM_OP 0 k2 table_row add primary_index_add alice 20 20")
            .unwrap();

        let onerror = TransactionTrace {
            id: "onerror".to_owned(),
            receipt: Some(TransactionReceiptHeader {
                status: TransactionStatus::HardFail,
                cpu_usage_micro_seconds: 0,
                net_usage_words: 0,
            }),
            failed_dtrx_trace: Some(Box::new(TransactionTrace {
                id: "failed-dtrx".to_owned(),
                ..Default::default()
            })),
            ..Default::default()
        };
        ctx.process_line(&format!("APPLIED_TRANSACTION 2 {}", hex_json(&onerror)))
            .unwrap();
        let block = ctx
            .process_line(&format!(
                "ACCEPTED_BLOCK 2 {}",
                hex_json(&block_state(2, "b2"))
            ))
            .unwrap()
            .unwrap();

        // The failed deferred trace precedes its onerror handler.
        assert_eq!(block.transaction_traces.len(), 2);
        let failed = &block.transaction_traces[0];
        assert_eq!(failed.id, "failed-dtrx");
        assert_eq!(
            failed.receipt.as_ref().unwrap().status,
            TransactionStatus::SoftFail
        );
        assert_eq!(failed.ram_ops.len(), 1);
        assert!(failed.ram_ops[0].is_deferred_removal());

        let handler = &block.transaction_traces[1];
        assert_eq!(handler.id, "onerror");
        assert_eq!(handler.rlimit_ops.len(), 1);
        assert!(handler.db_ops.is_empty());
        assert!(handler.table_ops.is_empty());
        assert!(handler.ram_ops.is_empty());
    }

    #[test]
    fn soft_failed_onerror_keeps_its_own_ops() {
        setup_tracing_test();
        let mut ctx = ctx();
        ctx.process_line("START_BLOCK 2").unwrap();
        ctx.process_line("DB_OP INS 0 alice code scope tbl pk aa").unwrap();
        ctx.process_line("RAM_OP 0 k1 deferred_trx remove deferred_trx_removed alice 10 -10")
            .unwrap();

        let onerror = TransactionTrace {
            id: "onerror".to_owned(),
            receipt: Some(TransactionReceiptHeader {
                status: TransactionStatus::SoftFail,
                cpu_usage_micro_seconds: 0,
                net_usage_words: 0,
            }),
            failed_dtrx_trace: Some(Box::new(TransactionTrace {
                id: "failed-dtrx".to_owned(),
                ..Default::default()
            })),
            ..Default::default()
        };
        ctx.process_line(&format!("APPLIED_TRANSACTION 2 {}", hex_json(&onerror)))
            .unwrap();
        let block = ctx
            .process_line(&format!(
                "ACCEPTED_BLOCK 2 {}",
                hex_json(&block_state(2, "b2"))
            ))
            .unwrap()
            .unwrap();

        // A soft failure commits the handler's own ops.
        let handler = &block.transaction_traces[1];
        assert_eq!(handler.receipt.as_ref().unwrap().status, TransactionStatus::SoftFail);
        assert_eq!(handler.db_ops.len(), 1);
        assert!(handler.ram_ops.is_empty());
        assert_eq!(block.transaction_traces[0].ram_ops.len(), 1);
    }

    #[test]
    fn fork_signal_discards_in_flight_accumulation() {
        setup_tracing_test();
        let mut ctx = ctx();
        ctx.process_line("START_BLOCK 3").unwrap();
        ctx.process_line("DB_OP INS 0 alice code scope tbl pk aa").unwrap();
        ctx.process_line(r#"RLIMIT_OP CONFIG UPD {"cpu": 1}"#).unwrap();

        ctx.process_line("SWITCH_FORK").unwrap();

        ctx.process_line("START_BLOCK 3").unwrap();
        let trace = TransactionTrace {
            id: "trx1".to_owned(),
            ..Default::default()
        };
        ctx.process_line(&format!("APPLIED_TRANSACTION 3 {}", hex_json(&trace)))
            .unwrap();
        let block = ctx
            .process_line(&format!(
                "ACCEPTED_BLOCK 3 {}",
                hex_json(&block_state(3, "b3"))
            ))
            .unwrap()
            .unwrap();

        assert!(block.rlimit_ops.is_empty());
        assert!(block.transaction_traces[0].db_ops.is_empty());
    }

    #[test]
    fn bootstrap_ops_attach_to_block_one() {
        setup_tracing_test();
        let mut ctx = ctx();

        // No START_BLOCK was ever seen; the chain's genesis ops still flow.
        ctx.process_line(r#"RLIMIT_OP CONFIG INS {"cpu": 1}"#).unwrap();
        let trace = TransactionTrace {
            id: "genesis".to_owned(),
            ..Default::default()
        };
        ctx.process_line(&format!("APPLIED_TRANSACTION 1 {}", hex_json(&trace)))
            .unwrap();
        let block = ctx
            .process_line(&format!(
                "ACCEPTED_BLOCK 1 {}",
                hex_json(&block_state(1, "b1"))
            ))
            .unwrap()
            .unwrap();
        assert_eq!(block.transaction_traces[0].id, "genesis");
        assert_eq!(block.rlimit_ops.len(), 1);
    }

    #[test]
    fn block_number_mismatches_are_rejected() {
        setup_tracing_test();
        let mut ctx = ctx();
        ctx.process_line("START_BLOCK 7").unwrap();

        let trace = TransactionTrace::default();
        let err = ctx
            .process_line(&format!("APPLIED_TRANSACTION 8 {}", hex_json(&trace)))
            .unwrap_err();
        assert!(matches!(
            err,
            ParseError::BlockMismatch {
                active: 7,
                got: 8,
                ..
            }
        ));
    }

    #[test]
    fn unsupported_protocol_version_is_fatal() {
        setup_tracing_test();
        let mut ctx = ctx();
        assert!(ctx.process_line("DEEP_MIND_VERSION 13").unwrap().is_none());
        let err = ctx.process_line("DEEP_MIND_VERSION 11").unwrap_err();
        assert!(matches!(err, ParseError::UnsupportedVersion { major: 11 }));
    }

    #[test]
    fn abi_dump_seeds_the_cache_and_decodes_later_actions() {
        setup_tracing_test();
        let mut ctx = ctx();

        let abi = serde_json::json!({
            "version": "eosio::abi/1.1",
            "structs": [{
                "name": "ping",
                "base": "",
                "fields": [{"name": "value", "type": "uint8"}],
            }],
            "actions": [{"name": "ping", "type": "ping"}],
        });
        let abi_b64 = B64.encode(serde_json::to_vec(&abi).unwrap());

        ctx.process_line("ABIDUMP START 9 1000").unwrap();
        ctx.process_line(&format!("ABIDUMP ABI hello {abi_b64}")).unwrap();
        ctx.process_line("ABIDUMP END").unwrap();

        ctx.process_line("START_BLOCK 10").unwrap();
        let mut trace = TransactionTrace {
            id: "trx1".to_owned(),
            action_traces: vec![action_trace("hello", "ping", 0, 2000)],
            ..Default::default()
        };
        trace.action_traces[0].action.raw_data = vec![7];
        ctx.process_line(&format!("APPLIED_TRANSACTION 10 {}", hex_json(&trace)))
            .unwrap();
        let block = ctx
            .process_line(&format!(
                "ACCEPTED_BLOCK 10 {}",
                hex_json(&block_state(10, "b10"))
            ))
            .unwrap()
            .unwrap();

        let action = &block.transaction_traces[0].action_traces[0].action;
        assert_eq!(action.json_data, Some(serde_json::json!({"value": 7})));
        assert!(action.raw_data.is_empty());
    }

    #[test]
    fn abi_outside_a_dump_window_is_rejected() {
        setup_tracing_test();
        let mut ctx = ctx();
        let abi_b64 = B64.encode(br#"{"version":"eosio::abi/1.1"}"#);
        let err = ctx
            .process_line(&format!("ABIDUMP ABI hello {abi_b64}"))
            .unwrap_err();
        assert!(matches!(err, ParseError::AbiOutsideDump));
    }

    #[test]
    fn implicit_transactions_and_dtrx_payloads_are_hydrated() {
        setup_tracing_test();
        let mut ctx = ctx();
        ctx.process_line("START_BLOCK 4").unwrap();

        let signed = SignedTransaction {
            expiration: "2024-01-01T00:01:00".to_owned(),
            ..Default::default()
        };
        ctx.process_line(&format!(
            "TRX_OP CREATE onblock trxid {}",
            hex_json(&signed)
        ))
        .unwrap();
        ctx.process_line(&format!(
            "DTRX_OP CREATE 0 alice 42 alice p d e dtrxid {}",
            hex_json(&signed)
        ))
        .unwrap();

        let trace = TransactionTrace {
            id: "trx1".to_owned(),
            ..Default::default()
        };
        ctx.process_line(&format!("APPLIED_TRANSACTION 4 {}", hex_json(&trace)))
            .unwrap();
        let block = ctx
            .process_line(&format!(
                "ACCEPTED_BLOCK 4 {}",
                hex_json(&block_state(4, "b4"))
            ))
            .unwrap()
            .unwrap();

        assert_eq!(block.implicit_transaction_ops.len(), 1);
        assert_eq!(block.implicit_transaction_ops[0].name, "onblock");
        assert_eq!(
            block.implicit_transaction_ops[0].transaction.expiration,
            "2024-01-01T00:01:00"
        );
        let dtrx = &block.transaction_traces[0].dtrx_ops[0];
        assert_eq!(
            dtrx.transaction.as_ref().unwrap().expiration,
            "2024-01-01T00:01:00"
        );
    }

    #[test]
    fn unknown_directives_are_skipped() {
        setup_tracing_test();
        let mut ctx = ctx();
        assert!(ctx
            .process_line("SOME_FUTURE_TAG anything goes")
            .unwrap()
            .is_none());

        // Malformed known tags are not skipped.
        assert!(ctx.process_line("START_BLOCK abc").is_err());
    }

    #[test]
    fn accumulators_reset_between_transactions_and_blocks() {
        setup_tracing_test();
        let mut ctx = ctx();
        ctx.process_line("START_BLOCK 1").unwrap();
        ctx.process_line("DB_OP INS 0 alice code scope tbl pk aa").unwrap();

        let first = TransactionTrace {
            id: "t1".to_owned(),
            ..Default::default()
        };
        let second = TransactionTrace {
            id: "t2".to_owned(),
            ..Default::default()
        };
        ctx.process_line(&format!("APPLIED_TRANSACTION 1 {}", hex_json(&first)))
            .unwrap();
        ctx.process_line(&format!("APPLIED_TRANSACTION 1 {}", hex_json(&second)))
            .unwrap();
        let block = ctx
            .process_line(&format!(
                "ACCEPTED_BLOCK 1 {}",
                hex_json(&block_state(1, "b1"))
            ))
            .unwrap()
            .unwrap();

        assert_eq!(block.transaction_traces[0].db_ops.len(), 1);
        assert!(block.transaction_traces[1].db_ops.is_empty());

        // Next block starts clean.
        ctx.process_line("START_BLOCK 2").unwrap();
        let block = ctx
            .process_line(&format!(
                "ACCEPTED_BLOCK 2 {}",
                hex_json(&block_state(2, "b2"))
            ))
            .unwrap()
            .unwrap();
        assert!(block.transaction_traces.is_empty());
        assert_eq!(block.transaction_trace_count, 0);
    }

    #[test]
    fn db_op_kinds_survive_assembly() {
        setup_tracing_test();
        let mut ctx = ctx();
        ctx.process_line("START_BLOCK 1").unwrap();
        ctx.process_line("DB_OP UPD 0 a:b code scope tbl pk 00:ff").unwrap();

        let trace = TransactionTrace {
            id: "t1".to_owned(),
            ..Default::default()
        };
        ctx.process_line(&format!("APPLIED_TRANSACTION 1 {}", hex_json(&trace)))
            .unwrap();
        let block = ctx
            .process_line(&format!(
                "ACCEPTED_BLOCK 1 {}",
                hex_json(&block_state(1, "b1"))
            ))
            .unwrap()
            .unwrap();

        let op = &block.transaction_traces[0].db_ops[0];
        assert_eq!(op.operation, DbOpKind::Update);
        assert_eq!(op.old_payer, "a");
        assert_eq!(op.new_payer, "b");
    }

    #[test]
    fn ram_namespaces_parse_through_the_pipeline() {
        setup_tracing_test();
        let mut ctx = ctx();
        ctx.process_line("START_BLOCK 1").unwrap();
        ctx.process_line("RAM_OP 0 key secondary_index add secondary_index_add alice 64 64")
            .unwrap();

        let trace = TransactionTrace {
            id: "t1".to_owned(),
            ..Default::default()
        };
        ctx.process_line(&format!("APPLIED_TRANSACTION 1 {}", hex_json(&trace)))
            .unwrap();
        let block = ctx
            .process_line(&format!(
                "ACCEPTED_BLOCK 1 {}",
                hex_json(&block_state(1, "b1"))
            ))
            .unwrap()
            .unwrap();

        let op = &block.transaction_traces[0].ram_ops[0];
        assert_eq!(op.namespace, RamOpNamespace::SecondaryIndex);
        assert_eq!(op.action, RamOpAction::Add);
    }
}
