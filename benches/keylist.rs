//! Key-list benchmarks: the insert, lookup and scan paths that dominate
//! leaf-node work.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use packdb::keylist::{BlockKeyList, PlainCodec, VarbyteCodec};

fn shuffled(count: usize) -> Vec<u32> {
    let mut keys: Vec<u32> = (0..count as u32).map(|i| i * 4).collect();
    let mut state = 0x9E3779B97F4A7C15u64;
    for i in (1..keys.len()).rev() {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let j = (state >> 33) as usize % (i + 1);
        keys.swap(i, j);
    }
    keys
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("keylist_insert");

    for count in [256usize, 2048].iter() {
        group.throughput(Throughput::Elements(*count as u64));

        group.bench_with_input(BenchmarkId::new("sequential", count), count, |b, &count| {
            b.iter_with_setup(
                || vec![0u8; 16384],
                |mut page| {
                    let mut list: BlockKeyList<VarbyteCodec> =
                        BlockKeyList::create(&mut page).unwrap();
                    for i in 0..count {
                        list.insert(i, (i * 4) as u32).unwrap();
                    }
                    page
                },
            );
        });

        group.bench_with_input(BenchmarkId::new("random", count), count, |b, &count| {
            b.iter_with_setup(
                || (vec![0u8; 16384], shuffled(count)),
                |(mut page, keys)| {
                    let mut list: BlockKeyList<VarbyteCodec> =
                        BlockKeyList::create(&mut page).unwrap();
                    for (i, &key) in keys.iter().enumerate() {
                        list.insert(i, key).unwrap();
                    }
                    page
                },
            );
        });
    }

    group.finish();
}

fn bench_find(c: &mut Criterion) {
    let mut group = c.benchmark_group("keylist_find");
    let count = 2048usize;
    group.throughput(Throughput::Elements(count as u64));

    let mut varbyte_page = vec![0u8; 16384];
    {
        let mut list: BlockKeyList<VarbyteCodec> =
            BlockKeyList::create(&mut varbyte_page).unwrap();
        for i in 0..count {
            list.insert(i, (i * 4) as u32).unwrap();
        }
    }
    let mut plain_page = vec![0u8; 16384];
    {
        let mut list: BlockKeyList<PlainCodec> = BlockKeyList::create(&mut plain_page).unwrap();
        for i in 0..count {
            list.insert(i, (i * 4) as u32).unwrap();
        }
    }

    group.bench_function("varbyte", |b| {
        let list: BlockKeyList<VarbyteCodec> = BlockKeyList::open(&mut varbyte_page).unwrap();
        b.iter(|| {
            for i in 0..count {
                black_box(list.find(black_box((i * 4) as u32)));
            }
        });
    });

    group.bench_function("plain_native_search", |b| {
        let list: BlockKeyList<PlainCodec> = BlockKeyList::open(&mut plain_page).unwrap();
        b.iter(|| {
            for i in 0..count {
                black_box(list.find(black_box((i * 4) as u32)));
            }
        });
    });

    group.finish();
}

fn bench_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("keylist_scan");
    let count = 2048usize;
    group.throughput(Throughput::Elements(count as u64));

    let mut page = vec![0u8; 16384];
    {
        let mut list: BlockKeyList<VarbyteCodec> = BlockKeyList::create(&mut page).unwrap();
        for i in 0..count {
            list.insert(i, (i * 4) as u32).unwrap();
        }
    }

    group.bench_function("full", |b| {
        let list: BlockKeyList<VarbyteCodec> = BlockKeyList::open(&mut page).unwrap();
        b.iter(|| {
            let mut sum = 0u64;
            list.scan(
                &mut |run: &[u32]| sum += run.iter().map(|&k| k as u64).sum::<u64>(),
                0,
                count,
            );
            black_box(sum)
        });
    });

    group.finish();
}

criterion_group!(benches, bench_insert, bench_find, bench_scan);
criterion_main!(benches);
