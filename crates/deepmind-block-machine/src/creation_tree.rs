use {
    crate::types::{CreationOp, CreationOpKind, FlatCreationNode},
    rustc_hash::FxHashMap,
};

/// Creation nesting deeper than this means a corrupt op stream; the chain
/// itself caps inline action depth far below it.
const MAX_TREE_DEPTH: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum CreationTreeError {
    #[error("first creation op for execution index {index} should be ROOT, got {got:?}")]
    ExpectedRoot { index: u32, got: CreationOpKind },
    #[error("ROOT creation op recorded as a child of execution index {index}")]
    RootBelowRoot { index: u32 },
    #[error("creation ops nest deeper than {MAX_TREE_DEPTH} levels")]
    DepthExceeded,
    #[error("creation ops recorded against index {index} were never reached by execution")]
    UnconsumedOps { index: u32 },
}

#[derive(Debug, PartialEq, Eq)]
struct Node {
    kind: CreationOpKind,
    execution_index: u32,
    children: Vec<Node>,
}

///
/// Rebuilds the parent/child ancestry of all actions in one transaction from
/// the flat, ordered creation-op list, then flattens it to the
/// position-addressable form stored on the trace.
///
/// Each op is keyed by the *creator's* zero-based execution index. The
/// simulation mirrors real execution order: a node's notifications fire
/// first (each expanded depth-first for its own children), then its
/// context-free inline actions, then its regular inline actions.
///
pub fn compute_creation_tree(ops: &[CreationOp]) -> Result<Vec<FlatCreationNode>, CreationTreeError> {
    if ops.is_empty() {
        return Ok(vec![]);
    }

    let mut recorded: FxHashMap<u32, Vec<CreationOpKind>> = FxHashMap::default();
    for op in ops {
        recorded.entry(op.action_index).or_default().push(op.kind);
    }

    let mut next_index: i64 = -1;
    let mut roots = vec![];
    while let Some(kinds) = recorded.get(&((next_index + 1) as u32)) {
        let first = kinds[0];
        if first != CreationOpKind::Root {
            return Err(CreationTreeError::ExpectedRoot {
                index: (next_index + 1) as u32,
                got: first,
            });
        }
        next_index += 1;
        let mut root = Node {
            kind: CreationOpKind::Root,
            execution_index: next_index as u32,
            children: vec![],
        };
        execute_action(&mut next_index, &mut root, &recorded, 0)?;
        roots.push(root);
    }

    // Ops bound to an index execution never reached cannot be stitched in.
    for &index in recorded.keys() {
        if i64::from(index) > next_index {
            return Err(CreationTreeError::UnconsumedOps { index });
        }
    }

    let mut flat = Vec::with_capacity((next_index + 1) as usize);
    for root in &roots {
        flatten_into(root, -1, &mut flat);
    }
    Ok(flat)
}

fn execute_action(
    next_index: &mut i64,
    node: &mut Node,
    recorded: &FxHashMap<u32, Vec<CreationOpKind>>,
    depth: usize,
) -> Result<(), CreationTreeError> {
    if depth > MAX_TREE_DEPTH {
        return Err(CreationTreeError::DepthExceeded);
    }

    let kinds = recorded
        .get(&node.execution_index)
        .map(Vec::as_slice)
        .unwrap_or(&[]);
    let child_kinds = match node.kind {
        CreationOpKind::Root => &kinds[1..],
        _ => kinds,
    };

    let mut notifies = 0usize;
    let mut cfa_inlines = 0usize;
    let mut inlines = 0usize;
    for &kind in child_kinds {
        match kind {
            CreationOpKind::Notify => notifies += 1,
            CreationOpKind::CfaInline => cfa_inlines += 1,
            CreationOpKind::Inline => inlines += 1,
            CreationOpKind::Root => {
                return Err(CreationTreeError::RootBelowRoot {
                    index: node.execution_index,
                });
            }
        }
    }

    let groups = [
        (CreationOpKind::Notify, notifies),
        (CreationOpKind::CfaInline, cfa_inlines),
        (CreationOpKind::Inline, inlines),
    ];
    for (kind, count) in groups {
        for _ in 0..count {
            *next_index += 1;
            let mut child = Node {
                kind,
                execution_index: *next_index as u32,
                children: vec![],
            };
            execute_action(next_index, &mut child, recorded, depth + 1)?;
            node.children.push(child);
        }
    }
    Ok(())
}

fn flatten_into(node: &Node, creator_walk_index: i32, out: &mut Vec<FlatCreationNode>) {
    let walk_index = out.len() as u32;
    out.push(FlatCreationNode {
        walk_index,
        creator_walk_index,
        execution_action_index: node.execution_index,
    });
    for child in &node.children {
        flatten_into(child, walk_index as i32, out);
    }
}
