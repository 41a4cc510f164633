use criterion::{criterion_group, criterion_main, Criterion, black_box};

use keystone::core::{IVec3, SupportConfig};
use keystone::octree::{SolidityGrid, Tree};

fn terrain(size: i32) -> SolidityGrid {
    SolidityGrid::from_fn(size, |p| {
        let height = 8 + ((p.x as f32 * 0.3).sin() * 4.0 + (p.z as f32 * 0.2).cos() * 4.0) as i32;
        p.y < height.max(3) || (p.x % 7 == 0 && p.z % 5 == 0 && p.y < height + 6)
    })
}

fn bench_load_chunk_32(c: &mut Criterion) {
    let config = SupportConfig::default();
    let grid = terrain(32);

    c.bench_function("load_chunk_32", |b| {
        b.iter(|| {
            let mut tree = Tree::new(&config);
            tree.load_chunk(black_box(&grid), IVec3::ZERO);
            tree.load_chunk(black_box(&grid), IVec3::new(32, 0, 0));
            tree
        });
    });
}

fn bench_block_churn(c: &mut Criterion) {
    let config = SupportConfig::default();
    let grid = terrain(32);
    let mut tree = Tree::new(&config);
    for x in 0..2 {
        for z in 0..2 {
            tree.load_chunk(&grid, IVec3::new(x * 32, 0, z * 32));
        }
    }

    c.bench_function("add_remove_block", |b| {
        let mut frame = 0i32;
        b.iter(|| {
            frame += 1;
            let pos = IVec3::new((frame * 13) % 64, 20, (frame * 7) % 64);
            tree.add_block(black_box(pos));
            tree.remove_block(black_box(pos))
        });
    });

    c.bench_function("remove_add_ground_block", |b| {
        let mut frame = 0i32;
        b.iter(|| {
            frame += 1;
            let pos = IVec3::new((frame * 13) % 64, 2, (frame * 7) % 64);
            tree.remove_block(black_box(pos));
            tree.add_block(black_box(pos))
        });
    });
}

fn bench_detached_groups(c: &mut Criterion) {
    let config = SupportConfig::default();
    let mut grid = SolidityGrid::empty(32);
    for x in 4..28 {
        for z in 4..28 {
            grid.set(IVec3::new(x, 16, z), true);
        }
    }
    let mut tree = Tree::new(&config);
    let chains = tree.load_chunk(&grid, IVec3::ZERO);

    c.bench_function("detached_groups_slab", |b| {
        b.iter(|| tree.detached_groups(black_box(chains.iter().copied())));
    });
}

criterion_group!(benches, bench_load_chunk_32, bench_block_churn, bench_detached_groups);
criterion_main!(benches);
