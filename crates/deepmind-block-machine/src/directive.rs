use {
    crate::types::{
        CreationOp, CreationOpKind, DbOp, DbOpKind, DtrxOp, DtrxOpKind, FeatureOp, PermOp,
        PermOpKind, RamCorrectionOp, RamOp, RamOpAction, RamOpNamespace, RlimitKind, RlimitOp,
        RlimitOpKind, TableOp, TableOpKind,
    },
    base64::{engine::general_purpose::STANDARD as B64, Engine as _},
};

/// The producer is authoritative, so a line that does not match its layout
/// means a protocol mismatch and stops the stream.
#[derive(Debug, thiserror::Error)]
#[error("malformed {tag} directive ({reason}): {line}")]
pub struct DirectiveError {
    pub tag: &'static str,
    pub reason: String,
    pub line: String,
}

///
/// One fully parsed trace-stream line.
///
/// Every supported tag maps to exactly one variant, parsed once here so the
/// dispatch switch downstream is exhaustive and field layouts are validated in
/// a single place. Binary envelopes stay raw: decoding them needs the
/// hydrator, which is the dispatcher's business.
///
#[derive(Debug, Clone, PartialEq, derive_more::From)]
pub enum Directive {
    DeepMindVersion {
        major: u64,
        minor: Option<u64>,
    },
    AbiDumpStart {
        block_num: u64,
        global_sequence: u64,
    },
    AbiDumpAbi {
        contract: String,
        abi: Vec<u8>,
    },
    AbiDumpEnd,
    StartBlock {
        block_num: u64,
    },
    AcceptedBlock {
        block_num: u64,
        payload: Vec<u8>,
    },
    AppliedTransaction {
        block_num: u64,
        payload: Vec<u8>,
    },
    SwitchFork,
    #[from]
    CreationOp(CreationOp),
    #[from]
    DbOp(DbOp),
    DtrxOp {
        op: DtrxOp,
        packed_trx: Option<Vec<u8>>,
    },
    #[from]
    PermOp(PermOp),
    #[from]
    RamOp(RamOp),
    #[from]
    RamCorrectionOp(RamCorrectionOp),
    #[from]
    RlimitOp(RlimitOp),
    #[from]
    TableOp(TableOp),
    TrxOp {
        name: String,
        transaction_id: String,
        packed_trx: Vec<u8>,
    },
    #[from]
    FeatureOp(FeatureOp),
    /// Unrecognized tag; the dispatcher logs and skips it.
    Unknown {
        tag: String,
    },
}

/// Parses one line (marker prefix already stripped) into a [`Directive`].
pub fn parse_directive(line: &str) -> Result<Directive, DirectiveError> {
    let (tag, rest) = match line.split_once(' ') {
        Some((tag, rest)) => (tag, rest),
        None => (line, ""),
    };

    match tag {
        "DEEP_MIND_VERSION" => parse_deep_mind_version(rest, line),
        "ABIDUMP" => parse_abidump(rest, line),
        "START_BLOCK" => {
            let mut f = Fields::new("START_BLOCK", rest, line);
            let block_num = f.next_u64("block_num")?;
            f.done()?;
            Ok(Directive::StartBlock { block_num })
        }
        "ACCEPTED_BLOCK" => {
            let mut f = Fields::new("ACCEPTED_BLOCK", rest, line);
            let block_num = f.next_u64("block_num")?;
            let payload = f.rest_hex("block_state")?;
            Ok(Directive::AcceptedBlock { block_num, payload })
        }
        "APPLIED_TRANSACTION" => {
            let mut f = Fields::new("APPLIED_TRANSACTION", rest, line);
            let block_num = f.next_u64("block_num")?;
            let payload = f.rest_hex("transaction_trace")?;
            Ok(Directive::AppliedTransaction { block_num, payload })
        }
        "SWITCH_FORK" => Ok(Directive::SwitchFork),
        "CREATION_OP" => parse_creation_op(rest, line),
        "DB_OP" => parse_db_op(rest, line),
        "DTRX_OP" => parse_dtrx_op(rest, line),
        "PERM_OP" => parse_perm_op(rest, line),
        "RAM_OP" => parse_ram_op(rest, line),
        "RAM_CORRECTION_OP" => parse_ram_correction_op(rest, line),
        "RLIMIT_OP" => parse_rlimit_op(rest, line),
        "TBL_OP" => parse_table_op(rest, line),
        "TRX_OP" => parse_trx_op(rest, line),
        "FEATURE_OP" => parse_feature_op(rest, line),
        other => Ok(Directive::Unknown {
            tag: other.to_owned(),
        }),
    }
}

fn parse_deep_mind_version(rest: &str, line: &str) -> Result<Directive, DirectiveError> {
    let mut f = Fields::new("DEEP_MIND_VERSION", rest, line);
    let major = f.next_u64("major")?;
    let minor = match f.try_next() {
        Some(field) => Some(f.parse_u64("minor", field)?),
        None => None,
    };
    f.done()?;
    Ok(Directive::DeepMindVersion { major, minor })
}

fn parse_abidump(rest: &str, line: &str) -> Result<Directive, DirectiveError> {
    let mut f = Fields::new("ABIDUMP", rest, line);
    match f.next("sub_tag")? {
        // Protocol 12 emits a bare START; 13 adds block_num + global_sequence.
        "START" => match f.try_next() {
            None => Ok(Directive::AbiDumpStart {
                block_num: 0,
                global_sequence: 0,
            }),
            Some(field) => {
                let block_num = f.parse_u64("block_num", field)?;
                let global_sequence = f.next_u64("global_sequence")?;
                f.done()?;
                Ok(Directive::AbiDumpStart {
                    block_num,
                    global_sequence,
                })
            }
        },
        // Protocol 12 carries a leading block_num; 13 starts at the contract.
        "ABI" => {
            let fields: Vec<&str> = f.remaining().split_whitespace().collect();
            let (contract, abi_b64) = match fields.as_slice() {
                [contract, abi] => (*contract, *abi),
                [block_num, contract, abi] => {
                    f.parse_u64("block_num", block_num)?;
                    (*contract, *abi)
                }
                _ => return Err(f.error("expected 2 or 3 fields after ABI")),
            };
            let abi = B64
                .decode(abi_b64)
                .map_err(|e| f.error(format!("invalid base64 abi: {e}")))?;
            Ok(Directive::AbiDumpAbi {
                contract: contract.to_owned(),
                abi,
            })
        }
        "END" => {
            f.done()?;
            Ok(Directive::AbiDumpEnd)
        }
        other => Err(f.error(format!("unknown sub tag {other:?}"))),
    }
}

fn parse_creation_op(rest: &str, line: &str) -> Result<Directive, DirectiveError> {
    let mut f = Fields::new("CREATION_OP", rest, line);
    let kind = match f.next("kind")? {
        "ROOT" => CreationOpKind::Root,
        "NOTIFY" => CreationOpKind::Notify,
        "CFA_INLINE" => CreationOpKind::CfaInline,
        "INLINE" => CreationOpKind::Inline,
        other => return Err(f.error(format!("unknown creation kind {other:?}"))),
    };
    let action_index = f.next_u32("action_index")?;
    f.done()?;
    Ok(CreationOp { kind, action_index }.into())
}

fn parse_db_op(rest: &str, line: &str) -> Result<Directive, DirectiveError> {
    let mut f = Fields::new("DB_OP", rest, line);
    let operation = match f.next("operation")? {
        "INS" => DbOpKind::Insert,
        "UPD" => DbOpKind::Update,
        "REM" => DbOpKind::Remove,
        other => return Err(f.error(format!("unknown operation {other:?}"))),
    };
    let action_index = f.next_u32("action_index")?;
    let payer = f.next("payer")?;
    let code = f.next("code")?.to_owned();
    let scope = f.next("scope")?.to_owned();
    let table_name = f.next("table")?.to_owned();
    let primary_key = f.next("primary_key")?.to_owned();
    let data = f.remaining();

    // Updates carry both sides as old:new pairs; inserts only the new side,
    // removals only the old side.
    let (old_payer, new_payer, old_data, new_data) = match operation {
        DbOpKind::Insert => (
            String::new(),
            payer.to_owned(),
            vec![],
            f.hex("data", data)?,
        ),
        DbOpKind::Remove => (
            payer.to_owned(),
            String::new(),
            f.hex("data", data)?,
            vec![],
        ),
        DbOpKind::Update => {
            let (old_payer, new_payer) = payer
                .split_once(':')
                .ok_or_else(|| f.error("UPD payer field is not an old:new pair"))?;
            let (old_data, new_data) = data
                .split_once(':')
                .ok_or_else(|| f.error("UPD data field is not an old:new pair"))?;
            (
                old_payer.to_owned(),
                new_payer.to_owned(),
                f.hex("old_data", old_data)?,
                f.hex("new_data", new_data)?,
            )
        }
    };

    Ok(DbOp {
        operation,
        action_index,
        code,
        scope,
        table_name,
        primary_key,
        old_payer,
        new_payer,
        old_data,
        new_data,
    }
    .into())
}

fn parse_dtrx_op(rest: &str, line: &str) -> Result<Directive, DirectiveError> {
    let mut f = Fields::new("DTRX_OP", rest, line);
    let operation = match f.next("operation")? {
        "CREATE" => DtrxOpKind::Create,
        "MODIFY_CREATE" => DtrxOpKind::ModifyCreate,
        "MODIFY_CANCEL" => DtrxOpKind::ModifyCancel,
        "CANCEL" => DtrxOpKind::Cancel,
        "PUSH_CREATE" => DtrxOpKind::PushCreate,
        "FAILED" => {
            let action_index = f.next_u32("action_index")?;
            f.done()?;
            return Ok(Directive::DtrxOp {
                op: DtrxOp {
                    operation: DtrxOpKind::Failed,
                    action_index,
                    ..Default::default()
                },
                packed_trx: None,
            });
        }
        other => return Err(f.error(format!("unknown operation {other:?}"))),
    };

    let action_index = f.next_u32("action_index")?;
    let sender = f.next("sender")?.to_owned();
    let sender_id = f.next("sender_id")?.to_owned();
    let payer = f.next("payer")?.to_owned();
    let published_at = f.next("published")?.to_owned();
    let delay_until = f.next("delay")?.to_owned();
    let expiration_at = f.next("expiration")?.to_owned();
    let transaction_id = f.next("trx_id")?.to_owned();
    let packed_trx = f.rest_hex("trx")?;

    Ok(Directive::DtrxOp {
        op: DtrxOp {
            operation,
            action_index,
            sender,
            sender_id,
            payer,
            published_at,
            delay_until,
            expiration_at,
            transaction_id,
            transaction: None,
        },
        packed_trx: Some(packed_trx),
    })
}

fn parse_perm_op(rest: &str, line: &str) -> Result<Directive, DirectiveError> {
    let mut f = Fields::new("PERM_OP", rest, line);
    let operation = match f.next("operation")? {
        "INS" => PermOpKind::Insert,
        "UPD" => PermOpKind::Update,
        "REM" => PermOpKind::Remove,
        other => return Err(f.error(format!("unknown operation {other:?}"))),
    };
    let action_index = f.next_u32("action_index")?;

    // Protocol 13 inserts a numeric permission_id before the JSON document.
    let remaining = f.remaining();
    let (permission_id, json_text) = match remaining.split_once(' ') {
        Some((first, tail)) if !first.is_empty() && first.bytes().all(|b| b.is_ascii_digit()) => {
            (Some(f.parse_u64("permission_id", first)?), tail)
        }
        _ => (None, remaining),
    };

    let data: serde_json::Value = serde_json::from_str(json_text)
        .map_err(|e| f.error(format!("invalid permission json: {e}")))?;
    let (old_perm, new_perm) = match operation {
        PermOpKind::Insert => (None, Some(data)),
        PermOpKind::Remove => (Some(data), None),
        PermOpKind::Update => {
            let mut data = data;
            let old = data.get_mut("old").map(serde_json::Value::take);
            let new = data.get_mut("new").map(serde_json::Value::take);
            if old.is_none() || new.is_none() {
                return Err(f.error("UPD permission json lacks old/new sub objects"));
            }
            (old, new)
        }
    };

    Ok(PermOp {
        operation,
        action_index,
        permission_id,
        old_perm,
        new_perm,
    }
    .into())
}

fn parse_ram_op(rest: &str, line: &str) -> Result<Directive, DirectiveError> {
    let mut f = Fields::new("RAM_OP", rest, line);
    let action_index = f.next_u32("action_index")?;
    let unique_key = f.next("unique_key")?.to_owned();
    let namespace = match f.next("namespace")? {
        "abi" => RamOpNamespace::Abi,
        "account" => RamOpNamespace::Account,
        "auth" => RamOpNamespace::Auth,
        "auth_link" => RamOpNamespace::AuthLink,
        "code" => RamOpNamespace::Code,
        "deferred_trx" => RamOpNamespace::DeferredTrx,
        "secondary_index" => RamOpNamespace::SecondaryIndex,
        "table" => RamOpNamespace::Table,
        "table_row" => RamOpNamespace::TableRow,
        other => return Err(f.error(format!("unknown namespace {other:?}"))),
    };
    let action = match f.next("action")? {
        "add" => RamOpAction::Add,
        "cancel" => RamOpAction::Cancel,
        "correction" => RamOpAction::Correction,
        "push" => RamOpAction::Push,
        "remove" => RamOpAction::Remove,
        "update" => RamOpAction::Update,
        other => return Err(f.error(format!("unknown action {other:?}"))),
    };
    let legacy_operation = f.next("legacy_tag")?.to_owned();
    let payer = f.next("payer")?.to_owned();
    let usage = f.next_u64("new_usage")?;
    let delta = f.next_i64("delta")?;
    f.done()?;

    Ok(RamOp {
        action_index,
        unique_key,
        namespace,
        action,
        legacy_operation,
        payer,
        usage,
        delta,
    }
    .into())
}

fn parse_ram_correction_op(rest: &str, line: &str) -> Result<Directive, DirectiveError> {
    let mut f = Fields::new("RAM_CORRECTION_OP", rest, line);
    // Corrections are not tied to an action; the index field is layout only.
    f.next_u32("action_index")?;
    let correction_id = f.next("correction_id")?.to_owned();
    let unique_key = f.next("unique_key")?.to_owned();
    let payer = f.next("payer")?.to_owned();
    let delta = f.next_i64("delta")?;
    f.done()?;

    Ok(RamCorrectionOp {
        correction_id,
        unique_key,
        payer,
        delta,
    }
    .into())
}

fn parse_rlimit_op(rest: &str, line: &str) -> Result<Directive, DirectiveError> {
    let mut f = Fields::new("RLIMIT_OP", rest, line);
    let kind = match f.next("kind")? {
        "CONFIG" => RlimitKind::Config,
        "STATE" => RlimitKind::State,
        "ACCOUNT_LIMITS" => RlimitKind::AccountLimits,
        "ACCOUNT_USAGE" => RlimitKind::AccountUsage,
        other => return Err(f.error(format!("unknown kind {other:?}"))),
    };
    let operation = match f.next("operation")? {
        "INS" => RlimitOpKind::Insert,
        "UPD" => RlimitOpKind::Update,
        other => return Err(f.error(format!("unknown operation {other:?}"))),
    };
    let data = serde_json::from_str(f.remaining())
        .map_err(|e| f.error(format!("invalid rlimit json: {e}")))?;

    Ok(RlimitOp {
        kind,
        operation,
        data,
    }
    .into())
}

fn parse_table_op(rest: &str, line: &str) -> Result<Directive, DirectiveError> {
    let mut f = Fields::new("TBL_OP", rest, line);
    let operation = match f.next("operation")? {
        "INS" => TableOpKind::Insert,
        "REM" => TableOpKind::Remove,
        other => return Err(f.error(format!("unknown operation {other:?}"))),
    };
    let action_index = f.next_u32("action_index")?;
    let code = f.next("code")?.to_owned();
    let scope = f.next("scope")?.to_owned();
    let table_name = f.next("table")?.to_owned();
    let payer = f.next("payer")?.to_owned();
    f.done()?;

    Ok(TableOp {
        operation,
        action_index,
        code,
        scope,
        table_name,
        payer,
    }
    .into())
}

fn parse_trx_op(rest: &str, line: &str) -> Result<Directive, DirectiveError> {
    let mut f = Fields::new("TRX_OP", rest, line);
    match f.next("operation")? {
        "CREATE" => {}
        other => return Err(f.error(format!("unknown operation {other:?}"))),
    }
    let name = f.next("name")?.to_owned();
    let transaction_id = f.next("trx_id")?.to_owned();
    let packed_trx = f.rest_hex("trx")?;

    Ok(Directive::TrxOp {
        name,
        transaction_id,
        packed_trx,
    })
}

fn parse_feature_op(rest: &str, line: &str) -> Result<Directive, DirectiveError> {
    let mut f = Fields::new("FEATURE_OP", rest, line);
    match f.next("sub_tag")? {
        "ACTIVATE" => {
            let digest = f.next("digest")?.to_owned();
            let feature = serde_json::from_str(f.remaining())
                .map_err(|e| f.error(format!("invalid feature json: {e}")))?;
            Ok(FeatureOp::Activate { digest, feature }.into())
        }
        "PRE_ACTIVATE" => {
            let action_index = f.next_u32("action_index")?;
            let digest = f.next("digest")?.to_owned();
            let feature = serde_json::from_str(f.remaining())
                .map_err(|e| f.error(format!("invalid feature json: {e}")))?;
            Ok(FeatureOp::PreActivate {
                action_index,
                digest,
                feature,
            }
            .into())
        }
        other => Err(f.error(format!("unknown sub tag {other:?}"))),
    }
}

/// Space-delimited field cursor over the portion of a line after its tag.
/// Keeps the tag and full line around so every failure carries both.
struct Fields<'a> {
    tag: &'static str,
    line: &'a str,
    rest: &'a str,
}

impl<'a> Fields<'a> {
    fn new(tag: &'static str, rest: &'a str, line: &'a str) -> Self {
        Self { tag, line, rest }
    }

    fn error(&self, reason: impl Into<String>) -> DirectiveError {
        DirectiveError {
            tag: self.tag,
            reason: reason.into(),
            line: self.line.to_owned(),
        }
    }

    fn try_next(&mut self) -> Option<&'a str> {
        if self.rest.is_empty() {
            return None;
        }
        match self.rest.split_once(' ') {
            Some((field, tail)) => {
                self.rest = tail;
                Some(field)
            }
            None => {
                let field = self.rest;
                self.rest = "";
                Some(field)
            }
        }
    }

    fn next(&mut self, name: &str) -> Result<&'a str, DirectiveError> {
        self.try_next()
            .ok_or_else(|| self.error(format!("missing {name} field")))
    }

    /// Everything left on the line, un-split. For trailing JSON documents and
    /// data blobs that may themselves contain spaces.
    fn remaining(&self) -> &'a str {
        self.rest
    }

    fn done(&self) -> Result<(), DirectiveError> {
        if self.rest.is_empty() {
            Ok(())
        } else {
            Err(self.error(format!("unexpected trailing fields: {:?}", self.rest)))
        }
    }

    fn parse_u64(&self, name: &str, field: &str) -> Result<u64, DirectiveError> {
        field
            .parse()
            .map_err(|_| self.error(format!("{name} is not a u64: {field:?}")))
    }

    fn next_u64(&mut self, name: &str) -> Result<u64, DirectiveError> {
        let field = self.next(name)?;
        self.parse_u64(name, field)
    }

    fn next_u32(&mut self, name: &str) -> Result<u32, DirectiveError> {
        let field = self.next(name)?;
        field
            .parse()
            .map_err(|_| self.error(format!("{name} is not a u32: {field:?}")))
    }

    fn next_i64(&mut self, name: &str) -> Result<i64, DirectiveError> {
        let field = self.next(name)?;
        field
            .parse()
            .map_err(|_| self.error(format!("{name} is not an i64: {field:?}")))
    }

    fn hex(&self, name: &str, field: &str) -> Result<Vec<u8>, DirectiveError> {
        hex::decode(field).map_err(|e| self.error(format!("{name} is not hex: {e}")))
    }

    fn rest_hex(&mut self, name: &str) -> Result<Vec<u8>, DirectiveError> {
        let field = self.next(name)?;
        let bytes = self.hex(name, field)?;
        self.done()?;
        Ok(bytes)
    }
}
