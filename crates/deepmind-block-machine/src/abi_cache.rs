use {crate::abi::Abi, rustc_hash::FxHashMap, std::sync::Arc};

#[derive(Debug, thiserror::Error)]
#[error(
    "abi for {contract} at global sequence {attempted} is not newer than the \
     latest recorded sequence {latest}"
)]
pub struct SequenceViolation {
    pub contract: String,
    pub latest: u64,
    pub attempted: u64,
}

///
/// Per-contract ordered store of ABI versions, keyed by the global sequence
/// of the action that published each version.
///
/// Additions must be monotonically increasing per contract; lookups resolve
/// the version that was active at a given sequence; truncation rewinds the
/// store past a fork point. Lookups never mutate.
///
#[derive(Debug, Default)]
pub struct AbiCache {
    abis: FxHashMap<String, Vec<(u64, Arc<Abi>)>>,
}

impl AbiCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a new ABI version for `contract` published at `global_sequence`.
    ///
    /// Rejects, without mutating, any addition that is not strictly newer than
    /// the contract's latest recorded sequence: the sequence axis is what
    /// makes point-in-time lookups sound, so a regression here means either a
    /// producer bug or a fork that was never truncated.
    pub fn add_abi(
        &mut self,
        contract: &str,
        global_sequence: u64,
        abi: Abi,
    ) -> Result<(), SequenceViolation> {
        let entries = self.abis.entry(contract.to_owned()).or_default();
        if let Some(&(latest, _)) = entries.last() {
            if global_sequence <= latest {
                return Err(SequenceViolation {
                    contract: contract.to_owned(),
                    latest,
                    attempted: global_sequence,
                });
            }
        }
        entries.push((global_sequence, Arc::new(abi)));
        Ok(())
    }

    /// Resolves the ABI that was active for `contract` at `global_sequence`:
    /// the entry with the greatest recorded sequence `<=` the query.
    pub fn find_abi(&self, contract: &str, global_sequence: u64) -> Option<Arc<Abi>> {
        let entries = self.abis.get(contract)?;
        let index = entries.partition_point(|&(seq, _)| seq <= global_sequence);
        let (_, abi) = entries.get(index.checked_sub(1)?)?;
        Some(Arc::clone(abi))
    }

    /// Discards, for every contract, all versions recorded at or after
    /// `global_sequence`. Contracts left with no versions are removed.
    /// Idempotent: truncating again at the same or a higher pivot is a no-op.
    pub fn truncate_after_or_equal(&mut self, global_sequence: u64) {
        self.abis.retain(|contract, entries| {
            let keep = entries.partition_point(|&(seq, _)| seq < global_sequence);
            if keep < entries.len() {
                tracing::debug!(
                    contract = contract.as_str(),
                    dropped = entries.len() - keep,
                    pivot = global_sequence,
                    "truncated abi history"
                );
                entries.truncate(keep);
            }
            !entries.is_empty()
        });
    }

    pub fn contract_count(&self) -> usize {
        self.abis.len()
    }

    #[cfg(test)]
    fn sequences_for(&self, contract: &str) -> Vec<u64> {
        self.abis
            .get(contract)
            .map(|entries| entries.iter().map(|&(seq, _)| seq).collect())
            .unwrap_or_default()
    }
}
