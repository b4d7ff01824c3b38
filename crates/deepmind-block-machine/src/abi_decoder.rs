use {
    crate::{
        abi::Abi,
        abi_cache::{AbiCache, SequenceViolation},
        hydrator::{HydrationError, Hydrator},
        types::{ActionTrace, BlockRef, TransactionTrace},
    },
    std::sync::{Arc, RwLock},
};

/// Account and action name under which contracts publish ABI updates.
const SETABI_ACCOUNT: &str = "eosio";
const SETABI_ACTION: &str = "setabi";

#[derive(Debug, thiserror::Error)]
pub enum AbiDecoderError {
    /// A regression on the sequence axis: either a producer bug or a fork
    /// that never triggered truncation. Stops forward progress rather than
    /// silently corrupting ABI history.
    #[error(transparent)]
    Sequence(#[from] SequenceViolation),
    #[error("undecodable setabi envelope in transaction {trx_id}")]
    SetAbiEnvelope {
        trx_id: String,
        #[source]
        source: HydrationError,
    },
    #[error("abi cache lock poisoned")]
    Poisoned,
}

///
/// Orchestrates ABI bookkeeping across the life of a parsing session: fork
/// detection through block-number continuity, cache truncation, extraction of
/// new ABI versions from `setabi` actions, and in-place decoding of action
/// payloads at their historically correct ABI version.
///
/// Single-writer by design: the parser thread is the only caller, so the
/// cache lock is coarse. All ABI additions for a transaction happen under one
/// exclusive acquisition; lookups take the shared lock.
///
pub struct AbiDecoder {
    cache: Arc<RwLock<AbiCache>>,
    active_block_num: Option<u64>,
    last_seen_block: Option<BlockRef>,
    truncate_on_next_global_sequence: bool,
}

impl Default for AbiDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl AbiDecoder {
    pub fn new() -> Self {
        Self::with_cache(Arc::new(RwLock::new(AbiCache::new())))
    }

    /// Builds a decoder over an explicitly shared cache instance.
    pub fn with_cache(cache: Arc<RwLock<AbiCache>>) -> Self {
        Self {
            cache,
            active_block_num: None,
            last_seen_block: None,
            truncate_on_next_global_sequence: false,
        }
    }

    pub fn cache(&self) -> Arc<RwLock<AbiCache>> {
        Arc::clone(&self.cache)
    }

    pub fn truncation_pending(&self) -> bool {
        self.truncate_on_next_global_sequence
    }

    pub fn last_seen_block(&self) -> Option<&BlockRef> {
        self.last_seen_block.as_ref()
    }

    /// Records the new active block and watches for continuity breaks.
    ///
    /// This is the sole fork detector: block numbers are strictly sequential
    /// in the absence of forks, so any jump means previously recorded ABI
    /// versions may sit on an abandoned branch and must be truncated once the
    /// new branch reveals its first global sequence.
    pub fn start_block(&mut self, block_num: u64) {
        if let Some(last_seen) = &self.last_seen_block {
            if last_seen.num + 1 != block_num {
                tracing::info!(
                    last_seen_block = last_seen.num,
                    new_block = block_num,
                    "block continuity broken, abi cache will truncate at next global sequence"
                );
                self.truncate_on_next_global_sequence = true;
            }
        }
        self.active_block_num = Some(block_num);
    }

    /// Marks the active block fully processed. Call exactly once per block,
    /// after all of its transactions went through [`Self::process_transaction`].
    pub fn end_block(&mut self, block: BlockRef) {
        self.active_block_num = None;
        self.last_seen_block = Some(block);
    }

    /// Runs one transaction trace through ABI bookkeeping: deferred fork
    /// truncation, `setabi` extraction, and in-place payload decoding.
    pub fn process_transaction(
        &mut self,
        trace: &mut TransactionTrace,
        hydrator: &dyn Hydrator,
    ) -> Result<(), AbiDecoderError> {
        if self.truncate_on_next_global_sequence {
            // A reverted or action-less transaction cannot have advanced the
            // chain's global sequence counter, so deferring to a later
            // transaction is safe.
            match trace.first_executed_action() {
                Some(action) => {
                    let pivot = action.global_sequence();
                    self.write_cache()?.truncate_after_or_equal(pivot);
                    self.truncate_on_next_global_sequence = false;
                    tracing::info!(pivot, trx_id = trace.id.as_str(), "abi cache truncated");
                }
                None => {
                    tracing::debug!(
                        trx_id = trace.id.as_str(),
                        "truncation deferred, transaction has no executed action"
                    );
                }
            }
        }

        let updates = self.collect_abi_updates(trace, hydrator)?;
        if !updates.is_empty() {
            // One exclusive acquisition for the whole batch.
            let mut cache = self.write_cache()?;
            for (account, global_sequence, abi) in updates {
                cache.add_abi(&account, global_sequence, abi)?;
            }
        }

        for action_trace in &mut trace.action_traces {
            self.decode_action_in_place(action_trace)?;
        }
        Ok(())
    }

    /// Drops every recorded ABI version. Used when the producer re-emits its
    /// authoritative initial ABI set (`ABIDUMP` after a node restart).
    pub fn reset_cache(&mut self) -> Result<(), AbiDecoderError> {
        *self.write_cache()? = AbiCache::new();
        Ok(())
    }

    /// Records one entry of an authoritative initial ABI dump.
    pub fn add_initial_abi(
        &mut self,
        contract: &str,
        global_sequence: u64,
        abi: Abi,
    ) -> Result<(), AbiDecoderError> {
        self.write_cache()?.add_abi(contract, global_sequence, abi)?;
        Ok(())
    }

    fn collect_abi_updates(
        &self,
        trace: &TransactionTrace,
        hydrator: &dyn Hydrator,
    ) -> Result<Vec<(String, u64, Abi)>, AbiDecoderError> {
        let mut updates = vec![];
        for action_trace in &trace.action_traces {
            let action = &action_trace.action;
            if action.account != SETABI_ACCOUNT || action.name != SETABI_ACTION {
                continue;
            }
            if action_trace.receipt.is_none() {
                // Reverted setabi never took effect on chain.
                continue;
            }

            let payload = hydrator.decode_set_abi(&action.raw_data).map_err(|source| {
                AbiDecoderError::SetAbiEnvelope {
                    trx_id: trace.id.clone(),
                    source,
                }
            })?;

            // Arbitrary garbage can be published in the embedded ABI field;
            // tolerated, the previous version simply stays active.
            match hydrator.decode_abi(&payload.abi) {
                Ok(abi) => {
                    updates.push((payload.account, action_trace.global_sequence(), abi));
                }
                Err(error) => {
                    tracing::warn!(
                        account = payload.account.as_str(),
                        trx_id = trace.id.as_str(),
                        %error,
                        "skipping undecodable abi published by setabi"
                    );
                }
            }
        }
        Ok(updates)
    }

    fn decode_action_in_place(&self, action_trace: &mut ActionTrace) -> Result<(), AbiDecoderError> {
        let action = &mut action_trace.action;
        if action.json_data.is_some() || action.raw_data.is_empty() {
            // Already decoded on a previous pass, or nothing to decode.
            return Ok(());
        }

        let global_sequence = action_trace
            .receipt
            .as_ref()
            .map(|r| r.global_sequence)
            .unwrap_or(u64::MAX);

        let Some(abi) = self
            .read_cache()?
            .find_abi(&action.account, global_sequence)
        else {
            tracing::debug!(
                account = action.account.as_str(),
                global_sequence,
                "no abi active at this sequence, keeping raw payload"
            );
            return Ok(());
        };

        let Some(type_name) = abi.action_type_for(&action.name) else {
            tracing::debug!(
                account = action.account.as_str(),
                action = action.name.as_str(),
                "abi defines no type for this action, keeping raw payload"
            );
            return Ok(());
        };

        match abi.decode_action(type_name, &action.raw_data) {
            Ok(json) => {
                action.json_data = Some(json);
                action.raw_data.clear();
            }
            Err(error) => {
                tracing::debug!(
                    account = action.account.as_str(),
                    action = action.name.as_str(),
                    %error,
                    "action payload does not decode under the active abi"
                );
            }
        }
        Ok(())
    }

    fn read_cache(&self) -> Result<std::sync::RwLockReadGuard<'_, AbiCache>, AbiDecoderError> {
        self.cache.read().map_err(|_| AbiDecoderError::Poisoned)
    }

    fn write_cache(&self) -> Result<std::sync::RwLockWriteGuard<'_, AbiCache>, AbiDecoderError> {
        self.cache.write().map_err(|_| AbiDecoderError::Poisoned)
    }
}
