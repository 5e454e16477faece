//! Performance benchmarks for fieldtrack-engine

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use fieldtrack_engine::{
    build_patch, ChangeStamp, Dataset, Indicator, Institution, MergePlan, Municipality, Project,
    RemoteSnapshot, Site, TrackingEntry,
};

/// A dataset shaped like a department: a few municipalities, many sites,
/// and `entries` tracking rows spread over 50 projects.
fn sample_dataset(entries: i64) -> Dataset {
    let mut dataset = Dataset::new();
    for m in 1..=10 {
        dataset.municipalities.push(Municipality {
            id: m,
            name: format!("MUNICIPIO {m}"),
        });
        for i in 1..=5 {
            let institution = (m - 1) * 5 + i;
            dataset.institutions.push(Institution {
                id: institution,
                name: format!("INSTITUCION {i}"),
                municipality_id: Some(m),
            });
            for s in 1..=3 {
                dataset.sites.push(Site {
                    id: (institution - 1) * 3 + s,
                    name: format!("SEDE {s}"),
                    institution_id: Some(institution),
                });
            }
        }
    }
    for i in 1..=8 {
        dataset.indicators.push(Indicator {
            id: i,
            name: format!("INDICADOR {i}"),
        });
    }
    for p in 1..=50 {
        dataset.projects.push(Project {
            id: p,
            bpin_code: Some(format!("2024-{p:04}")),
            name: format!("PROYECTO {p}"),
            contract_year: 2024,
            contractor: None,
            initial_value: 1_000_000.0,
            value_rp: 0.0,
            value_sgp: 250_000.0,
            value_men: 0.0,
            value_sgr: 0.0,
            funding_source: Some("SGP".into()),
            sync_uid: Some(format!("p-{p}")),
        });
    }
    let sites = dataset.sites.len() as i64;
    for e in 1..=entries {
        dataset.tracking_entries.push(TrackingEntry {
            id: e,
            project_id: Some(e % 50 + 1),
            activity_id: None,
            site_id: Some(e % sites + 1),
            indicator_id: Some(e % 8 + 1),
            progress_pct: Some((e % 100) as f64),
            tracked_on: Some(format!("2024-{:02}-{:02}", e % 12 + 1, e % 28 + 1)),
            responsible: Some("INTERVENTORIA".into()),
            notes: None,
            is_addition: false,
            addition_value: 0.0,
            addition_source: None,
            sync_uid: Some(format!("e-{e}")),
        });
    }
    dataset
}

fn bench_upload(c: &mut Criterion) {
    let mut group = c.benchmark_group("upload");

    for size in [100i64, 1_000, 10_000].iter() {
        let dataset = sample_dataset(*size);
        group.bench_with_input(BenchmarkId::new("build_patch", size), &dataset, |b, dataset| {
            b.iter(|| build_patch(black_box(dataset), ChangeStamp::from_millis(1_000)))
        });
    }

    group.finish();
}

fn bench_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot");

    for size in [100i64, 1_000, 10_000].iter() {
        let tree = build_patch(&sample_dataset(*size), ChangeStamp::from_millis(1_000))
            .map(|patch| patch.into_value())
            .unwrap_or_default();
        group.bench_with_input(BenchmarkId::new("from_tree", size), &tree, |b, tree| {
            b.iter(|| RemoteSnapshot::from_tree(black_box(tree.clone())))
        });
    }

    group.finish();
}

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge");

    for size in [100i64, 1_000, 10_000].iter() {
        let local = sample_dataset(0);
        let remote = RemoteSnapshot {
            dataset: sample_dataset(*size),
            ..RemoteSnapshot::default()
        };
        group.bench_with_input(BenchmarkId::new("plan", size), &remote, |b, remote| {
            b.iter(|| MergePlan::build(black_box(&local), black_box(remote)))
        });
    }

    // Every catalog row is new.
    group.bench_function("plan_into_empty", |b| {
        let remote = RemoteSnapshot {
            dataset: sample_dataset(1_000),
            ..RemoteSnapshot::default()
        };
        b.iter(|| MergePlan::build(black_box(&Dataset::new()), black_box(&remote)))
    });

    group.finish();
}

criterion_group!(benches, bench_upload, bench_snapshot, bench_merge);
criterion_main!(benches);
