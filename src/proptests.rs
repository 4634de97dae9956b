use super::*;

use crate::encoding::common_prefix_len;
use proptest::prelude::*;
use std::collections::BTreeMap;

type Model = BTreeMap<String, Vec<Vec<u8>>>;

fn new_index(name: &str) -> Index {
    Index::create(Storage::in_memory(), Owner::new("prop"), "prop", name, IndexType::String).unwrap()
}

/// Walk the stored trie and check its structural invariants. Returns the
/// number of keys.
fn validate_trie(index: &Index) -> usize {
    let mut stack: Vec<(Manifest, bool)> = vec![(index.root().unwrap(), true)];
    let mut leaf_count = 0usize;

    while let Some((node, is_root)) = stack.pop() {
        if !is_root {
            assert!(
                node.entries.len() >= 2,
                "non-root node {} has {} entries",
                node.name,
                node.entries.len()
            );
        }

        for pair in node.entries.windows(2) {
            assert!(
                pair[0].name.as_bytes() < pair[1].name.as_bytes(),
                "entries of {} out of order: {:?} >= {:?}",
                node.name,
                pair[0].name,
                pair[1].name
            );
            assert_eq!(
                common_prefix_len(&pair[0].name, &pair[1].name),
                0,
                "siblings in {} share a prefix",
                node.name
            );
        }

        for entry in &node.entries {
            match entry.entry_type {
                EntryType::Leaf => {
                    assert!(!entry.refs.is_empty(), "leaf without references");
                    leaf_count += 1;
                }
                EntryType::Intermediate => {
                    assert!(!entry.name.is_empty(), "unnamed branch in {}", node.name);
                    assert!(entry.refs.is_empty(), "branch carrying references");
                    let child_name = node.child_name(entry);
                    let child = index
                        .node(&child_name)
                        .unwrap()
                        .unwrap_or_else(|| panic!("dangling branch {child_name}"));
                    assert_eq!(child.name, child_name);
                    stack.push((child, false));
                }
            }
        }
    }

    leaf_count
}

fn dump(index: &Index) -> Vec<(String, Vec<Vec<u8>>)> {
    let mut it = index.iter("", None, None).unwrap();
    let mut out = Vec::new();
    while it.advance().unwrap() {
        out.push((it.key().to_string(), it.values().to_vec()));
    }
    out
}

fn expected(m: &Model) -> Vec<(String, Vec<Vec<u8>>)> {
    m.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
}

#[derive(Clone, Debug)]
enum Op {
    Put(String, Vec<u8>),
    Append(String, Vec<u8>),
    Delete(String),
    Get(String),
}

fn key_strategy() -> impl Strategy<Value = String> + Clone {
    // Few distinct characters force shared prefixes; the accented pair shares
    // a leading UTF-8 byte.
    "[abéè]{0,5}"
}

fn value_strategy() -> impl Strategy<Value = Vec<u8>> + Clone {
    prop::collection::vec(any::<u8>(), 0..6)
}

fn ops_strategy() -> impl Strategy<Value = Vec<Op>> {
    let key = key_strategy();
    let value = value_strategy();
    let op = prop_oneof![
        40 => (key.clone(), value.clone()).prop_map(|(k, v)| Op::Put(k, v)),
        15 => (key.clone(), value).prop_map(|(k, v)| Op::Append(k, v)),
        25 => key.clone().prop_map(Op::Delete),
        20 => key.prop_map(Op::Get),
    ];
    prop::collection::vec(op, 0..=150)
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        max_shrink_iters: 10_000,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_equivalence(ops in ops_strategy()) {
        let mut index = new_index("equivalence");
        let mut m = Model::new();

        for op in ops {
            match op {
                Op::Put(key, value) => {
                    index.put(&key, value.clone(), WriteMode::Replace).unwrap();
                    m.insert(key, vec![value]);
                }
                Op::Append(key, value) => {
                    index.put(&key, value.clone(), WriteMode::Append).unwrap();
                    m.entry(key).or_default().push(value);
                }
                Op::Delete(key) => {
                    let got = index.delete(&key);
                    match m.remove(&key) {
                        Some(refs) => {
                            prop_assert_eq!(got.unwrap(), refs);
                        }
                        None => {
                            prop_assert!(got.unwrap_err().is_not_found());
                        }
                    }
                }
                Op::Get(key) => {
                    let got = index.get(&key);
                    match m.get(&key) {
                        Some(refs) => {
                            prop_assert_eq!(&got.unwrap(), refs);
                        }
                        None => {
                            prop_assert!(got.unwrap_err().is_not_found());
                        }
                    }
                }
            }
        }

        prop_assert_eq!(validate_trie(&index), m.len());
        prop_assert_eq!(dump(&index), expected(&m));
    }

    #[test]
    fn prop_seek_and_range(
        keys in prop::collection::btree_set(key_strategy(), 0..40),
        start in key_strategy(),
        end in key_strategy(),
        limit in prop::option::of(0usize..10),
    ) {
        let mut index = new_index("range");
        for key in &keys {
            index.put(key, key.as_bytes().to_vec(), WriteMode::Replace).unwrap();
        }

        let got: Vec<String> = index
            .iter(&start, Some(end.as_str()), limit)
            .unwrap()
            .map(|r| r.unwrap().0)
            .collect();
        let want: Vec<String> = keys
            .iter()
            .filter(|k| k.as_str() >= start.as_str() && k.as_str() <= end.as_str())
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        prop_assert_eq!(got, want);
    }

    #[test]
    fn prop_batch_equivalence(
        existing in prop::collection::vec((key_strategy(), value_strategy()), 0..30),
        incoming in prop::collection::vec((key_strategy(), value_strategy()), 0..60),
        append in any::<bool>(),
    ) {
        let mode = if append { WriteMode::Append } else { WriteMode::Replace };
        let mut direct = new_index("direct");
        let mut batched = new_index("batched");

        for (key, value) in &existing {
            direct.put(key, value.clone(), WriteMode::Append).unwrap();
            batched.put(key, value.clone(), WriteMode::Append).unwrap();
        }

        for (key, value) in &incoming {
            direct.put(key, value.clone(), mode).unwrap();
        }
        let mut batch = batched.batch(mode).unwrap();
        for (key, value) in &incoming {
            batch.put(key, value.clone()).unwrap();
        }
        batch.write().unwrap();

        let keys = validate_trie(&batched);
        prop_assert_eq!(keys, validate_trie(&direct));
        prop_assert_eq!(dump(&batched), dump(&direct));
    }
}

fn for_each_permutation<T: Clone>(items: &[T], mut f: impl FnMut(Vec<T>)) {
    fn rec<T: Clone>(items: &[T], used: &mut [bool], out: &mut Vec<T>, f: &mut impl FnMut(Vec<T>)) {
        if out.len() == items.len() {
            f(out.clone());
            return;
        }
        for i in 0..items.len() {
            if used[i] {
                continue;
            }
            used[i] = true;
            out.push(items[i].clone());
            rec(items, used, out, f);
            out.pop();
            used[i] = false;
        }
    }

    let mut used = vec![false; items.len()];
    let mut out = Vec::with_capacity(items.len());
    rec(items, &mut used, &mut out, &mut f);
}

const SMALL_SET: &[&str] = &["a", "b", "", "aa", "ab", "abc"];

#[test]
fn exhaustive_insert_order_small_set() {
    for_each_permutation(SMALL_SET, |perm| {
        let mut index = new_index("insert");
        let mut m = Model::new();
        for (i, k) in perm.into_iter().enumerate() {
            index.put(k, vec![i as u8], WriteMode::Replace).unwrap();
            m.insert(k.to_string(), vec![vec![i as u8]]);
        }

        assert_eq!(validate_trie(&index), m.len());
        assert_eq!(dump(&index), expected(&m));
    });
}

#[test]
fn exhaustive_remove_order_small_set() {
    // Insert in a fixed order, then remove in all permutations.
    for_each_permutation(SMALL_SET, |perm| {
        let mut index = new_index("remove");
        let mut m = Model::new();
        for (i, k) in SMALL_SET.iter().enumerate() {
            index.put(k, vec![i as u8], WriteMode::Replace).unwrap();
            m.insert(k.to_string(), vec![vec![i as u8]]);
        }

        for k in perm {
            assert_eq!(index.delete(k).unwrap(), m.remove(k).unwrap());
            assert_eq!(validate_trie(&index), m.len());
            assert_eq!(dump(&index), expected(&m));
        }
        assert!(index.is_empty().unwrap());
    });
}

#[test]
fn exhaustive_batch_order_small_set() {
    for_each_permutation(SMALL_SET, |perm| {
        let mut index = new_index("batch");
        let mut batch = index.batch(WriteMode::Replace).unwrap();
        for k in &perm {
            batch.put(k, k.as_bytes().to_vec()).unwrap();
        }
        batch.write().unwrap();

        let mut want: Vec<&str> = SMALL_SET.to_vec();
        want.sort_unstable();
        assert_eq!(validate_trie(&index), want.len());
        let got: Vec<String> = dump(&index).into_iter().map(|(k, _)| k).collect();
        assert_eq!(got, want);
    });
}
