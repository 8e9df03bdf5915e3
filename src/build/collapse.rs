//! Binary to K-ary collapse.
//!
//! For every emitted wide node the frontier starts as the binary node's two
//! children; while it holds fewer than K members and one of them is internal,
//! that member is replaced in place by its two children. Frontier members
//! become the wide node's children and are expanded in turn from an explicit
//! work stack. Wide nodes are allocated parent-first, so a reverse sweep over
//! the array sees every child before its parent and fills in exact bounds.

use smallvec::{smallvec, SmallVec};

use crate::config::{CollapseHeuristic, MAX_ARITY};
use crate::tree::{BinaryTree, WideNode, WideTree};
use crate::util::{Error, PackedBounds, Result};

type Frontier = SmallVec<[u32; MAX_ARITY]>;

/// Pending expansion: binary node -> already allocated wide slot.
struct Frame {
    binary: u32,
    wide: u32,
}

/// Position in `frontier` of the next member to open, if any is internal.
fn pick_expansion(tree: &BinaryTree, frontier: &Frontier, heuristic: CollapseHeuristic) -> Option<usize> {
    let nodes = tree.nodes();
    let internal = frontier
        .iter()
        .enumerate()
        .filter(|&(_, &idx)| !nodes[idx as usize].is_leaf());

    match heuristic {
        CollapseHeuristic::FirstFound => internal.map(|(pos, _)| pos).next(),
        CollapseHeuristic::LargestArea => {
            let mut best: Option<(usize, f32)> = None;
            for (pos, &idx) in internal {
                let area = nodes[idx as usize].bounds.to_aabb().surface_area();
                if best.map_or(true, |(_, a)| area > a) {
                    best = Some((pos, area));
                }
            }
            best.map(|(pos, _)| pos)
        }
    }
}

/// Grow the frontier of binary node `root_idx` up to `arity` members.
fn collect_frontier(tree: &BinaryTree, root_idx: u32, arity: usize, heuristic: CollapseHeuristic) -> Frontier {
    let nodes = tree.nodes();
    let root = &nodes[root_idx as usize];
    let mut frontier: Frontier = smallvec![root.left, root.right];
    while frontier.len() < arity {
        let Some(pos) = pick_expansion(tree, &frontier, heuristic) else {
            break;
        };
        let node = &nodes[frontier[pos] as usize];
        frontier[pos] = node.left;
        frontier.insert(pos + 1, node.right);
    }
    frontier
}

/// Collapse `binary` into `wide`, reusing `wide`'s allocation.
///
/// Fails without touching `wide` when `arity` is outside `2..=MAX_ARITY`.
#[tracing::instrument(skip_all, fields(binary_nodes = binary.len(), arity = arity))]
pub fn collapse_into(
    binary: &BinaryTree,
    arity: usize,
    heuristic: CollapseHeuristic,
    wide: &mut WideTree,
) -> Result<()> {
    if !(2..=MAX_ARITY).contains(&arity) {
        return Err(Error::config(format!("arity {arity} outside 2..={MAX_ARITY}")));
    }
    wide.arity = arity;
    wide.nodes.clear();
    if binary.is_empty() {
        return Ok(());
    }

    let nodes = binary.nodes();
    wide.nodes.reserve(binary.primitive_count() * 2);
    wide.nodes.push(WideNode::PLACEHOLDER);
    let mut stack = vec![Frame { binary: 0, wide: 0 }];

    while let Some(frame) = stack.pop() {
        let node = &nodes[frame.binary as usize];
        if let Some(prim) = node.primitive() {
            wide.nodes[frame.wide as usize] = WideNode::leaf(node.bounds, prim);
            continue;
        }

        let frontier = collect_frontier(binary, frame.binary, arity, heuristic);
        let first_child = wide.nodes.len() as u32;
        for (slot, &member) in frontier.iter().enumerate() {
            let child = first_child + slot as u32;
            wide.nodes[frame.wide as usize].children[slot] = child;
            wide.nodes.push(WideNode::PLACEHOLDER);
            stack.push(Frame { binary: member, wide: child });
        }
    }

    // Children always sit after their parent
    for i in (0..wide.nodes.len()).rev() {
        let node = wide.nodes[i];
        if node.is_leaf() {
            continue;
        }
        let bounds = node
            .children()
            .fold(PackedBounds::EMPTY, |acc, c| acc.union(&wide.nodes[c as usize].bounds));
        wide.nodes[i].bounds = bounds;
    }

    tracing::debug!(wide_nodes = wide.nodes.len(), "collapsed");
    Ok(())
}

/// Collapse `binary` into a new wide tree.
pub fn collapse(binary: &BinaryTree, arity: usize, heuristic: CollapseHeuristic) -> Result<WideTree> {
    let mut wide = WideTree::new(arity);
    collapse_into(binary, arity, heuristic, &mut wide)?;
    Ok(wide)
}
