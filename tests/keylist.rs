//! End-to-end exercises of the block key list: concrete scenarios plus
//! randomized insert/erase/copy sequences checked against a model.

use std::collections::BTreeSet;

use packdb::error::{kind_of, ErrorKind};
use packdb::keylist::{BlockCodec, BlockKeyList, PlainCodec, VarbyteCodec, BLOCK_INDEX_SIZE};
use packdb::stats::KeyListMetrics;

/// Deterministic generator so failures reproduce; same approach as the
/// shuffles in the benchmarks.
struct Rng(u64);

impl Rng {
    fn next(&mut self) -> u32 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 33) as u32
    }
}

fn collect<C: BlockCodec>(list: &BlockKeyList<'_, C>, count: usize) -> Vec<u32> {
    let mut keys = Vec::new();
    list.scan(&mut |run: &[u32]| keys.extend_from_slice(run), 0, count);
    keys
}

#[test]
fn small_inserts_keep_slots_and_order() {
    let mut page = vec![0u8; 512];
    let mut list: BlockKeyList<VarbyteCodec> = BlockKeyList::create(&mut page).unwrap();

    let keys = [10u32, 20, 30, 5, 25];
    let mut present: Vec<u32> = Vec::new();

    for (count, &key) in keys.iter().enumerate() {
        list.insert(count, key).unwrap();
        present.push(key);
        present.sort_unstable();

        for &k in &present {
            let expected = present.iter().position(|&p| p == k).unwrap();
            assert_eq!(list.find(k), Some(expected), "slot of {} after {} inserts", k, count + 1);
        }
    }

    assert_eq!(collect(&list, 5), vec![5, 10, 20, 25, 30]);
    list.check_integrity(5).unwrap();
}

#[test]
fn ascending_fill_splits_once_at_block_capacity() {
    let mut page = vec![0u8; 4096];
    let mut list: BlockKeyList<VarbyteCodec> = BlockKeyList::create(&mut page).unwrap();

    let max = packdb::config::MAX_KEYS_PER_BLOCK;
    let total = max + 8;
    for i in 0..total {
        list.insert(i, (i * 4) as u32).unwrap();
    }

    assert_eq!(list.block_count(), 2);
    // the second block opens with the key that overflowed the first
    assert_eq!(list.key_at(max - 1).unwrap(), ((max - 1) * 4) as u32);
    list.check_integrity(total).unwrap();
}

#[test]
fn duplicate_insert_is_rejected_and_harmless() {
    let mut page = vec![0u8; 512];
    let mut list: BlockKeyList<VarbyteCodec> = BlockKeyList::create(&mut page).unwrap();
    for (i, key) in [1u32, 2, 3].iter().enumerate() {
        list.insert(i, *key).unwrap();
    }

    let err = list.insert(3, 2).unwrap_err();

    assert_eq!(kind_of(&err), Some(ErrorKind::DuplicateKey));
    list.check_integrity(3).unwrap();
}

#[test]
fn erase_to_empty_keeps_the_initial_block() {
    let mut page = vec![0u8; 512];
    let mut list: BlockKeyList<VarbyteCodec> = BlockKeyList::create(&mut page).unwrap();
    list.insert(0, 7).unwrap();

    list.erase(1, 0).unwrap();

    assert_eq!(list.block_count(), 1);
    assert_eq!(
        list.used_size(),
        8 + BLOCK_INDEX_SIZE + VarbyteCodec::INITIAL_BLOCK_SIZE
    );
    list.check_integrity(0).unwrap();
}

#[test]
fn random_inserts_and_erases_match_model() {
    let mut rng = Rng(0x5EED);
    let mut page = vec![0u8; 16384];
    let mut list: BlockKeyList<VarbyteCodec> = BlockKeyList::create(&mut page).unwrap();
    let mut model: BTreeSet<u32> = BTreeSet::new();

    for round in 0..4000 {
        let erase = !model.is_empty() && rng.next() % 4 == 0;
        if erase {
            let pick = rng.next() as usize % model.len();
            let key = *model.iter().nth(pick).unwrap();
            let slot = list.find(key).expect("model key must be present");
            assert_eq!(slot, pick);
            list.erase(model.len(), slot).unwrap();
            model.remove(&key);
        } else {
            let key = rng.next() % 100_000;
            let result = list.insert(model.len(), key);
            if model.contains(&key) {
                let err = result.unwrap_err();
                assert_eq!(kind_of(&err), Some(ErrorKind::DuplicateKey), "round {}", round);
            } else {
                result.unwrap();
                model.insert(key);
            }
        }

        if round % 500 == 0 {
            list.check_integrity(model.len()).unwrap();
        }
    }

    list.check_integrity(model.len()).unwrap();
    let expected: Vec<u32> = model.iter().copied().collect();
    assert_eq!(collect(&list, model.len()), expected);

    // the slot-ordered iteration is strictly increasing
    for window in expected.windows(2) {
        assert!(window[0] < window[1]);
    }
}

#[test]
fn random_sequences_agree_across_codecs() {
    let mut rng = Rng(0xC0DEC);
    let mut page_a = vec![0u8; 16384];
    let mut a: BlockKeyList<VarbyteCodec> = BlockKeyList::create(&mut page_a).unwrap();
    let mut page_b = vec![0u8; 16384];
    let mut b: BlockKeyList<PlainCodec> = BlockKeyList::create(&mut page_b).unwrap();
    let mut count = 0usize;

    for _ in 0..1500 {
        let key = rng.next() % 50_000;
        let ra = a.insert(count, key);
        let rb = b.insert(count, key);
        match ra {
            Ok(slot) => {
                assert_eq!(slot, rb.unwrap());
                count += 1;
            }
            Err(err) => {
                assert_eq!(kind_of(&err), kind_of(&rb.unwrap_err()));
            }
        }
    }

    a.check_integrity(count).unwrap();
    b.check_integrity(count).unwrap();
    assert_eq!(collect(&a, count), collect(&b, count));
}

#[test]
fn copy_to_preserves_the_key_multiset() {
    let mut rng = Rng(42);

    for round in 0..20 {
        let mut keys: BTreeSet<u32> = BTreeSet::new();
        let mut page = vec![0u8; 16384];
        let mut list: BlockKeyList<VarbyteCodec> = BlockKeyList::create(&mut page).unwrap();
        let total = 200 + (rng.next() as usize % 600);
        while keys.len() < total {
            let key = rng.next();
            if keys.insert(key) {
                list.insert(keys.len() - 1, key).unwrap();
            }
        }

        let split = rng.next() as usize % (total + 1);
        let mut dest_page = vec![0u8; 16384];
        let mut dest: BlockKeyList<VarbyteCodec> = BlockKeyList::create(&mut dest_page).unwrap();

        list.copy_to(split, total, &mut dest, 0, 0).unwrap();

        list.check_integrity(split).unwrap();
        dest.check_integrity(total - split).unwrap();

        let mut combined = collect(&list, split);
        combined.extend(collect(&dest, total - split));
        let expected: Vec<u32> = keys.iter().copied().collect();
        assert_eq!(combined, expected, "round {} split {}", round, split);
    }
}

#[test]
fn vacuumize_reaches_minimal_used_size() {
    let mut rng = Rng(7);
    let mut page = vec![0u8; 16384];
    let mut list: BlockKeyList<VarbyteCodec> = BlockKeyList::create(&mut page).unwrap();
    let mut model: BTreeSet<u32> = BTreeSet::new();

    while model.len() < 700 {
        let key = rng.next() % 1_000_000;
        if model.insert(key) {
            list.insert(model.len() - 1, key).unwrap();
        }
    }
    for _ in 0..300 {
        let pick = rng.next() as usize % model.len();
        let key = *model.iter().nth(pick).unwrap();
        list.erase(model.len(), list.find(key).unwrap()).unwrap();
        model.remove(&key);
    }

    list.vacuumize(model.len()).unwrap();
    list.check_integrity(model.len()).unwrap();

    let minimal = list.used_size();
    list.vacuumize(model.len()).unwrap();
    assert_eq!(list.used_size(), minimal);

    let expected: Vec<u32> = model.iter().copied().collect();
    assert_eq!(collect(&list, model.len()), expected);
}

#[test]
fn metrics_report_block_shape() {
    let mut page = vec![0u8; 8192];
    let mut list: BlockKeyList<VarbyteCodec> = BlockKeyList::create(&mut page).unwrap();
    let total = 600;
    for i in 0..total {
        list.insert(i, (i * 2) as u32).unwrap();
    }

    let mut metrics = KeyListMetrics::default();
    list.fill_metrics(&mut metrics);

    assert_eq!(
        metrics.blocks_per_page.max() as usize,
        list.block_count()
    );
    assert_eq!(metrics.block_size.count() as usize, list.block_count());
    assert_eq!(
        metrics.index_bytes.max() as usize,
        list.block_count() * BLOCK_INDEX_SIZE
    );
}

#[test]
fn full_range_recovers_after_node_split_simulation() {
    // a 256-byte range fills up quickly; the B+tree layer reacts to
    // *limits reached* by moving half the keys elsewhere
    let mut page = vec![0u8; 256];
    let mut list: BlockKeyList<VarbyteCodec> = BlockKeyList::create(&mut page).unwrap();

    let mut count = 0usize;
    let err = loop {
        match list.insert(count, (count * 1000) as u32) {
            Ok(_) => count += 1,
            Err(err) => break err,
        }
    };
    assert_eq!(kind_of(&err), Some(ErrorKind::LimitsReached));
    list.check_integrity(count).unwrap();

    let mut sibling_page = vec![0u8; 256];
    let mut sibling: BlockKeyList<VarbyteCodec> =
        BlockKeyList::create(&mut sibling_page).unwrap();
    let split = count / 2;
    list.copy_to(split, count, &mut sibling, 0, 0).unwrap();

    // both halves accept keys again
    list.insert(split, 1).unwrap();
    sibling
        .insert(count - split, (count * 1000) as u32)
        .unwrap();
    list.check_integrity(split + 1).unwrap();
    sibling.check_integrity(count - split + 1).unwrap();
}
