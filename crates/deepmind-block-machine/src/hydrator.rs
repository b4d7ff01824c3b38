use {
    crate::{
        abi::Abi,
        types::{BlockState, SignedTransaction, TransactionTrace},
    },
    base64::{engine::general_purpose::STANDARD as B64, Engine as _},
    serde::Deserialize,
};

#[derive(Debug, thiserror::Error)]
pub enum HydrationError {
    #[error("malformed {what} envelope: {reason}")]
    MalformedEnvelope { what: &'static str, reason: String },
}

impl HydrationError {
    pub(crate) fn envelope(what: &'static str, reason: impl ToString) -> Self {
        Self::MalformedEnvelope {
            what,
            reason: reason.to_string(),
        }
    }
}

/// The two halves of a `setabi` action payload: which account publishes, and
/// the raw ABI bytes being published.
#[derive(Debug, Clone)]
pub struct SetAbiPayload {
    pub account: String,
    pub abi: Vec<u8>,
}

///
/// Decodes the node-version-specific binary envelopes into the
/// version-independent structures the core operates on.
///
/// Everything that differs between supported node major versions lives behind
/// this trait, keeping the tag-dispatch logic version-blind. Implementations
/// are resettable because the producing node re-emits its authoritative state
/// after a restart.
///
pub trait Hydrator: Send {
    /// Forgets any per-session decoding state. Called when the producer
    /// announces itself anew (`DEEP_MIND_VERSION`).
    fn reset(&mut self);

    /// Decodes the `ACCEPTED_BLOCK` block-state envelope.
    fn hydrate_block_state(&self, bytes: &[u8]) -> Result<BlockState, HydrationError>;

    /// Decodes the `APPLIED_TRANSACTION` transaction-trace envelope.
    fn hydrate_transaction_trace(&self, bytes: &[u8]) -> Result<TransactionTrace, HydrationError>;

    /// Decodes a packed signed transaction (`TRX_OP`, `DTRX_OP` payloads).
    fn hydrate_signed_transaction(&self, bytes: &[u8])
        -> Result<SignedTransaction, HydrationError>;

    /// Splits a `setabi` action payload into account + raw ABI bytes.
    fn decode_set_abi(&self, raw: &[u8]) -> Result<SetAbiPayload, HydrationError>;

    /// Decodes raw ABI bytes (from a `setabi` payload or an `ABIDUMP ABI`
    /// directive) into the structured form.
    fn decode_abi(&self, raw: &[u8]) -> Result<Abi, HydrationError>;
}

///
/// Reference hydrator over JSON envelopes.
///
/// Used by the integration tests and by tooling that replays captured
/// streams; production deployments plug in a binary hydrator matching their
/// node major version.
///
#[derive(Debug, Default)]
pub struct JsonHydrator;

#[derive(Deserialize)]
struct JsonSetAbi {
    account: String,
    /// Base64, mirroring how the dump directives carry ABI bytes.
    abi: String,
}

impl Hydrator for JsonHydrator {
    fn reset(&mut self) {}

    fn hydrate_block_state(&self, bytes: &[u8]) -> Result<BlockState, HydrationError> {
        serde_json::from_slice(bytes).map_err(|e| HydrationError::envelope("block state", e))
    }

    fn hydrate_transaction_trace(&self, bytes: &[u8]) -> Result<TransactionTrace, HydrationError> {
        serde_json::from_slice(bytes).map_err(|e| HydrationError::envelope("transaction trace", e))
    }

    fn hydrate_signed_transaction(
        &self,
        bytes: &[u8],
    ) -> Result<SignedTransaction, HydrationError> {
        serde_json::from_slice(bytes).map_err(|e| HydrationError::envelope("signed transaction", e))
    }

    fn decode_set_abi(&self, raw: &[u8]) -> Result<SetAbiPayload, HydrationError> {
        let envelope: JsonSetAbi =
            serde_json::from_slice(raw).map_err(|e| HydrationError::envelope("setabi", e))?;
        let abi = B64
            .decode(envelope.abi)
            .map_err(|e| HydrationError::envelope("setabi", e))?;
        Ok(SetAbiPayload {
            account: envelope.account,
            abi,
        })
    }

    fn decode_abi(&self, raw: &[u8]) -> Result<Abi, HydrationError> {
        serde_json::from_slice(raw).map_err(|e| HydrationError::envelope("abi", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_abi_envelope_round_trip() {
        let hydrator = JsonHydrator;
        let abi_json = br#"{"version":"eosio::abi/1.1"}"#;
        let raw = serde_json::json!({
            "account": "eosio.token",
            "abi": B64.encode(abi_json),
        });
        let payload = hydrator
            .decode_set_abi(serde_json::to_vec(&raw).unwrap().as_slice())
            .unwrap();
        assert_eq!(payload.account, "eosio.token");

        let abi = hydrator.decode_abi(&payload.abi).unwrap();
        assert_eq!(abi.version, "eosio::abi/1.1");
    }

    #[test]
    fn garbage_envelopes_are_reported() {
        let hydrator = JsonHydrator;
        assert!(hydrator.decode_set_abi(b"not json").is_err());
        assert!(hydrator.hydrate_block_state(b"{").is_err());
    }
}
