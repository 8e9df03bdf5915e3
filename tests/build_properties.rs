//! Structural properties of built trees over many seeded scenes.

use lbvh::prelude::*;
use lbvh::tree::INVALID;

fn build(tris: &[Triangle], config: BvhConfig) -> Engine {
    let mut engine = Engine::new(config).expect("Failed to create engine");
    engine.rebuild_triangles(tris).expect("Failed to build");
    engine
}

fn check_binary(tree: &BinaryTree, tris: &[Triangle]) {
    let n = tris.len();
    let nodes = tree.nodes();
    assert_eq!(nodes.len(), (2 * n).saturating_sub(1));
    if n == 0 {
        return;
    }

    let mut parent_refs = vec![0u32; nodes.len()];
    let mut seen_prims = vec![false; n];
    for (i, node) in nodes.iter().enumerate() {
        if let Some(prim) = node.primitive() {
            assert!(i >= n - 1, "leaf {i} outside the leaf range");
            assert!(!seen_prims[prim as usize], "primitive {prim} in two leaves");
            seen_prims[prim as usize] = true;
            let tri_box = tris[prim as usize].aabb();
            assert!(node.bounds.to_aabb().contains_box(&tri_box), "leaf {i} does not contain its triangle");
            continue;
        }
        assert!(i < n - 1, "internal node {i} in the leaf range");
        let parent_box = node.bounds.to_aabb();
        for child in [node.left, node.right] {
            assert_ne!(child, 0, "root referenced as a child");
            parent_refs[child as usize] += 1;
            assert_eq!(nodes[child as usize].parent, i as u32);
            assert!(parent_box.contains_box(&nodes[child as usize].bounds.to_aabb()));
        }
    }
    assert_eq!(nodes[0].parent, INVALID);
    assert!(parent_refs[1..].iter().all(|&c| c == 1), "node without exactly one parent");
    assert!(seen_prims.iter().all(|&s| s));
}

fn check_wide(tree: &WideTree, tris: &[Triangle]) {
    let n = tris.len();
    let nodes = tree.nodes();
    if n == 0 {
        assert!(nodes.is_empty());
        return;
    }

    let mut refs = vec![0u32; nodes.len()];
    let mut seen_prims = vec![false; n];
    for (i, node) in nodes.iter().enumerate() {
        if let Some(prim) = node.primitive() {
            assert!(!seen_prims[prim as usize], "primitive {prim} in two wide leaves");
            seen_prims[prim as usize] = true;
            assert!(node.bounds.to_aabb().contains_box(&tris[prim as usize].aabb()));
            continue;
        }
        let count = node.children().count();
        assert!((2..=tree.arity()).contains(&count), "node {i} has {count} children");
        for child in node.children() {
            assert!(child as usize > i);
            refs[child as usize] += 1;
            assert!(node.bounds.to_aabb().contains_box(&nodes[child as usize].bounds.to_aabb()));
        }
    }
    assert_eq!(refs[0], 0);
    assert!(refs[1..].iter().all(|&c| c == 1));
    assert!(seen_prims.iter().all(|&s| s));
}

#[test]
fn test_tree_properties_over_seeded_scenes() {
    for seed in 0..20u64 {
        for n in [0usize, 1, 2, 3, 5, 17, 128, 500] {
            let tris = synthetic_scene(n, seed);
            let engine = build(&tris, BvhConfig::default());
            check_binary(engine.binary_tree(), &tris);
            check_wide(engine.wide_tree(), &tris);
        }
    }
}

#[test]
fn test_every_arity_and_heuristic() {
    let tris = synthetic_scene(300, 11);
    for arity in 2..=8 {
        for heuristic in [CollapseHeuristic::FirstFound, CollapseHeuristic::LargestArea] {
            let config = BvhConfig {
                arity,
                collapse_heuristic: heuristic,
                ..Default::default()
            };
            let engine = build(&tris, config);
            assert_eq!(engine.wide_tree().arity(), arity);
            check_wide(engine.wide_tree(), &tris);
            assert!(engine.wide_tree().depth() <= engine.binary_tree().depth());
        }
    }
}

#[test]
fn test_collapse_depth() {
    for seed in 0..10u64 {
        for n in [0usize, 1, 2, 3, 4, 9, 64, 1000] {
            let engine = build(&synthetic_scene(n, seed), BvhConfig::default());
            let binary = engine.binary_tree().depth();
            let wide = engine.wide_tree().depth();
            assert!(wide <= binary, "n = {n}: wide {wide} > binary {binary}");
            // Two leaves under one root cannot get any shallower
            if n >= 3 {
                assert!(wide < binary, "n = {n}: collapse did not reduce depth");
            } else {
                assert_eq!(wide, binary);
            }
        }
    }
}

#[test]
fn test_coincident_centroids() {
    let tri = Triangle::new(Vec3::ZERO, Vec3::X, Vec3::Y);
    let tris = vec![tri; 64];
    let engine = build(&tris, BvhConfig::default());
    check_binary(engine.binary_tree(), &tris);
    check_wide(engine.wide_tree(), &tris);

    // Same code everywhere, so leaf order falls back to primitive index
    let indices: Vec<u32> = (0..64).collect();
    assert_eq!(engine.sorted_primitive_indices(), indices.as_slice());
}

#[test]
fn test_rebuild_is_bit_identical() {
    let tris = synthetic_scene(777, 42);
    let flat: Vec<f32> = bytemuck_flat(&tris);

    let mut a = Engine::new(BvhConfig::default()).unwrap();
    a.rebuild(&flat).unwrap();
    let first_binary = a.binary_tree().to_words();
    let first_wide = a.wide_tree().to_words();

    // Same engine again, then a fresh one
    a.rebuild(&flat).unwrap();
    assert_eq!(a.binary_tree().to_words(), first_binary);
    assert_eq!(a.wide_tree().to_words(), first_wide);

    let mut b = Engine::new(BvhConfig::default()).unwrap();
    b.rebuild(&flat).unwrap();
    assert_eq!(b.binary_tree().as_bytes(), a.binary_tree().as_bytes());
    assert_eq!(b.wide_tree().as_bytes(), a.wide_tree().as_bytes());
}

#[test]
fn test_rebuild_replaces_previous_tree() {
    let mut engine = Engine::new(BvhConfig::default()).unwrap();
    engine.rebuild_triangles(&synthetic_scene(400, 1)).unwrap();
    let small = synthetic_scene(5, 2);
    engine.rebuild_triangles(&small).unwrap();
    check_binary(engine.binary_tree(), &small);
    check_wide(engine.wide_tree(), &small);
}

fn bytemuck_flat(tris: &[Triangle]) -> Vec<f32> {
    TriangleStore::from_triangles(tris.to_vec()).as_flat().to_vec()
}
