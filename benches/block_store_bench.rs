use criterion::{black_box, criterion_group, criterion_main, Criterion};
use storekeep::block::BlockType;
use storekeep::perm::Permission;
use storekeep::{Store, StoreConfig};
use tempfile::tempdir;

fn open_store(dir: &std::path::Path) -> Store {
    let config = StoreConfig {
        index_path: dir.join("index"),
        arena_path: dir.join("arena"),
        fake_timestamp: Some(0),
        verbosity: 0,
    };
    Store::open(config, Permission::ReadWrite, true).unwrap()
}

fn bench_put_new_blocks(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let mut store = open_store(dir.path());
    let data = vec![0x11u8; storekeep::DATA_BLOCK_SIZE];

    let mut counter = 0u64;
    c.bench_function("put_unique_1mb_equivalent_block", |b| {
        b.iter(|| {
            let mut payload = data.clone();
            payload[0..8].copy_from_slice(&counter.to_be_bytes());
            counter += 1;
            store.put(black_box(&payload), BlockType::FileData).unwrap()
        })
    });
}

fn bench_put_duplicate_block(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let mut store = open_store(dir.path());
    let data = vec![0x22u8; storekeep::DATA_BLOCK_SIZE];
    let fp = store.put(&data, BlockType::FileData).unwrap();
    let _ = fp;

    c.bench_function("put_duplicate_block", |b| {
        b.iter(|| store.put(black_box(&data), BlockType::FileData).unwrap())
    });
}

fn bench_get_block(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let mut store = open_store(dir.path());
    let data = vec![0x33u8; storekeep::DATA_BLOCK_SIZE];
    let fp = store.put(&data, BlockType::FileData).unwrap();

    c.bench_function("get_block", |b| b.iter(|| store.get(black_box(&fp)).unwrap()));
}

criterion_group!(benches, bench_put_new_blocks, bench_put_duplicate_block, bench_get_block);
criterion_main!(benches);
