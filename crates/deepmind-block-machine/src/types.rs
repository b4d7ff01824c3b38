use serde::{Deserialize, Serialize};

/// A block identity: id plus number. Used to track stream continuity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRef {
    pub id: String,
    pub num: u64,
}

impl BlockRef {
    pub fn new(id: impl Into<String>, num: u64) -> Self {
        Self { id: id.into(), num }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub timestamp: String,
    pub producer: String,
    pub confirmed: u32,
    pub previous: String,
    pub transaction_mroot: String,
    pub action_mroot: String,
    pub schedule_version: u32,
    /// Only present when the block carries a producer-schedule change.
    /// Version-specific: handled as a presence check, never dispatch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_producers: Option<serde_json::Value>,
}

///
/// The fully assembled output record, one per `ACCEPTED_BLOCK` directive.
///
/// Transaction traces appear in the exact order the trace stream presented
/// them; action payloads are decoded to JSON wherever an ABI was resolvable
/// at the action's global sequence.
///
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: String,
    pub number: u64,
    pub header: BlockHeader,
    pub producer_signature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_schedule: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blockroot_merkle: Option<serde_json::Value>,
    pub dpos_proposed_irreversible_blocknum: u64,
    pub dpos_irreversible_blocknum: u64,
    pub validated: bool,

    pub transaction_trace_count: u64,
    pub executed_input_action_count: u64,
    pub executed_total_action_count: u64,

    /// Resource-limit config/state ops, global to the block.
    pub rlimit_ops: Vec<RlimitOp>,
    /// Implicit transactions (`onblock`, `onerror`) created by the node itself.
    pub implicit_transaction_ops: Vec<TrxOp>,
    pub transaction_traces: Vec<TransactionTrace>,
}

impl Block {
    pub fn block_ref(&self) -> BlockRef {
        BlockRef::new(self.id.clone(), self.number)
    }
}

/// Authoritative block-state envelope decoded by the hydrator from the
/// `ACCEPTED_BLOCK` payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockState {
    pub block_num: u64,
    pub block_id: String,
    pub header: BlockHeader,
    pub producer_signature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_schedule: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blockroot_merkle: Option<serde_json::Value>,
    pub dpos_proposed_irreversible_blocknum: u64,
    pub dpos_irreversible_blocknum: u64,
    #[serde(default)]
    pub validated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Executed,
    SoftFail,
    HardFail,
    Delayed,
    Expired,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionReceiptHeader {
    pub status: TransactionStatus,
    pub cpu_usage_micro_seconds: u32,
    pub net_usage_words: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignedTransaction {
    #[serde(default)]
    pub expiration: String,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub context_free_actions: Vec<Action>,
    #[serde(default)]
    pub signatures: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionLevel {
    pub actor: String,
    pub permission: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub account: String,
    pub name: String,
    #[serde(default)]
    pub authorization: Vec<PermissionLevel>,
    /// Binary payload as emitted by the node. Cleared once `json_data` is
    /// populated; the two representations are mutually exclusive long-term.
    #[serde(default, with = "hex_bytes")]
    pub raw_data: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionReceipt {
    pub receiver: String,
    pub digest: String,
    pub global_sequence: u64,
    pub recv_sequence: u64,
    #[serde(default)]
    pub auth_sequence: Vec<(String, u64)>,
    pub code_sequence: u64,
    pub abi_sequence: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionTrace {
    pub receiver: String,
    pub action: Action,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt: Option<ActionReceipt>,
    /// One-based ordinal of this action within the transaction's execution.
    pub action_ordinal: u32,
    /// Ordinal of the creating action; 0 for input actions.
    pub creator_action_ordinal: u32,
    #[serde(default)]
    pub closest_unnotified_ancestor_action_ordinal: u32,
    #[serde(default)]
    pub context_free: bool,
    #[serde(default)]
    pub elapsed: i64,
    #[serde(default)]
    pub console: String,
    #[serde(default)]
    pub transaction_id: String,
    #[serde(default)]
    pub block_num: u64,
    #[serde(default)]
    pub producer_block_id: String,
    #[serde(default)]
    pub block_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<u64>,
}

impl ActionTrace {
    /// Input actions are the ones declared in the signed transaction itself,
    /// as opposed to notifications and inline actions spawned by execution.
    pub fn is_input(&self) -> bool {
        self.creator_action_ordinal == 0
    }

    /// The action's chain-wide sequence, or `u64::MAX` when the action never
    /// executed (no receipt), placing it after anything in the ABI cache.
    pub fn global_sequence(&self) -> u64 {
        self.receipt
            .as_ref()
            .map(|r| r.global_sequence)
            .unwrap_or(u64::MAX)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionTrace {
    pub id: String,
    /// Position of this trace within its block, assigned at block finalization.
    #[serde(default)]
    pub index: u64,
    #[serde(default)]
    pub block_num: u64,
    #[serde(default)]
    pub producer_block_id: String,
    #[serde(default)]
    pub block_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt: Option<TransactionReceiptHeader>,
    #[serde(default)]
    pub elapsed: i64,
    #[serde(default)]
    pub net_usage: u64,
    #[serde(default)]
    pub scheduled: bool,
    #[serde(default)]
    pub action_traces: Vec<ActionTrace>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_dtrx_trace: Option<Box<TransactionTrace>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<u64>,

    #[serde(default)]
    pub db_ops: Vec<DbOp>,
    #[serde(default)]
    pub dtrx_ops: Vec<DtrxOp>,
    #[serde(default)]
    pub feature_ops: Vec<FeatureOp>,
    #[serde(default)]
    pub perm_ops: Vec<PermOp>,
    #[serde(default)]
    pub ram_ops: Vec<RamOp>,
    #[serde(default)]
    pub ram_correction_ops: Vec<RamCorrectionOp>,
    #[serde(default)]
    pub rlimit_ops: Vec<RlimitOp>,
    #[serde(default)]
    pub table_ops: Vec<TableOp>,
    #[serde(default)]
    pub creation_tree: Vec<FlatCreationNode>,
}

impl TransactionTrace {
    /// First executed (receipt-bearing) action in declaration order, if any.
    pub fn first_executed_action(&self) -> Option<&ActionTrace> {
        self.action_traces.iter().find(|a| a.receipt.is_some())
    }

    /// A soft failure still commits the ops the execution recorded; only a
    /// hard failure (or a missing receipt) rolls them back.
    pub fn is_hard_failure(&self) -> bool {
        match &self.receipt {
            Some(receipt) => receipt.status == TransactionStatus::HardFail,
            None => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DbOpKind {
    Insert,
    Update,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbOp {
    pub operation: DbOpKind,
    pub action_index: u32,
    pub code: String,
    pub scope: String,
    pub table_name: String,
    pub primary_key: String,
    #[serde(default)]
    pub old_payer: String,
    #[serde(default)]
    pub new_payer: String,
    #[serde(default, with = "hex_bytes")]
    pub old_data: Vec<u8>,
    #[serde(default, with = "hex_bytes")]
    pub new_data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RamOpNamespace {
    Abi,
    Account,
    Auth,
    AuthLink,
    Code,
    DeferredTrx,
    SecondaryIndex,
    Table,
    TableRow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RamOpAction {
    Add,
    Cancel,
    Correction,
    Push,
    Remove,
    Update,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RamOp {
    pub action_index: u32,
    pub unique_key: String,
    pub namespace: RamOpNamespace,
    pub action: RamOpAction,
    /// Pre-namespace operation tag, kept verbatim for downstream consumers.
    pub legacy_operation: String,
    pub payer: String,
    pub usage: u64,
    pub delta: i64,
}

impl RamOp {
    /// The one RAM op that is never rolled back by the node: removal of the
    /// deferred transaction entry itself.
    pub fn is_deferred_removal(&self) -> bool {
        self.namespace == RamOpNamespace::DeferredTrx && self.action == RamOpAction::Remove
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RamCorrectionOp {
    pub correction_id: String,
    pub unique_key: String,
    pub payer: String,
    pub delta: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DtrxOpKind {
    #[default]
    Create,
    ModifyCreate,
    ModifyCancel,
    Cancel,
    PushCreate,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DtrxOp {
    pub operation: DtrxOpKind,
    pub action_index: u32,
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub sender_id: String,
    #[serde(default)]
    pub payer: String,
    #[serde(default)]
    pub published_at: String,
    #[serde(default)]
    pub delay_until: String,
    #[serde(default)]
    pub expiration_at: String,
    #[serde(default)]
    pub transaction_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<SignedTransaction>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PermOpKind {
    Insert,
    Update,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermOp {
    pub operation: PermOpKind,
    pub action_index: u32,
    /// Deep-mind protocol v13 onward; absent in v12 streams.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_perm: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_perm: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RlimitKind {
    Config,
    State,
    AccountLimits,
    AccountUsage,
}

impl RlimitKind {
    /// Config and state ops are global to the block; account limits/usage are
    /// billed to the transaction that caused them.
    pub fn is_global(&self) -> bool {
        matches!(self, RlimitKind::Config | RlimitKind::State)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RlimitOpKind {
    Insert,
    Update,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RlimitOp {
    pub kind: RlimitKind,
    pub operation: RlimitOpKind,
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TableOpKind {
    Insert,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableOp {
    pub operation: TableOpKind,
    pub action_index: u32,
    pub code: String,
    pub scope: String,
    pub table_name: String,
    pub payer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrxOp {
    /// `onblock` or `onerror`; the node only creates these two implicitly.
    pub name: String,
    pub transaction_id: String,
    pub transaction: SignedTransaction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "kind")]
pub enum FeatureOp {
    Activate {
        digest: String,
        feature: serde_json::Value,
    },
    PreActivate {
        action_index: u32,
        digest: String,
        feature: serde_json::Value,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CreationOpKind {
    Root,
    Notify,
    CfaInline,
    Inline,
}

/// A creation op as recorded by the stream: the kind of action spawned and
/// the zero-based execution index of the *creator* action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreationOp {
    pub kind: CreationOpKind,
    pub action_index: u32,
}

/// One entry of the flattened creation tree. `walk_index` is the position in
/// the depth-first walk, not the execution index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatCreationNode {
    pub walk_index: u32,
    /// Walk index of the creator, or -1 for roots.
    pub creator_walk_index: i32,
    pub execution_action_index: u32,
}

pub(crate) mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        hex::decode(text).map_err(serde::de::Error::custom)
    }
}
