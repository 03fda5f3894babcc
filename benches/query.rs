use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, SamplingMode, Throughput};
use rand::{rngs::StdRng, Rng, SeedableRng};

use folio::repository::{ContentStream, VersioningState};
use folio::types::{BaseType, PropertyDefinition, PropertyKind, TypeDefinition};
use folio::value::Value;
use folio::{Repository, ROOT_FOLDER_ID};

const WORDS: &[&str] = &["moon", "orbit", "lander", "capsule", "booster", "crew", "telemetry", "splashdown"];

fn seeded_repo(n: usize, seed: u64) -> Repository {
    let mut rng = StdRng::seed_from_u64(seed);
    let repo = Repository::default();
    repo.add_type(TypeDefinition::new("bench:record", BaseType::Document, "cmis:document")
        .with_property(PropertyDefinition::new("bench:score", PropertyKind::integer()))).ok();
    let folders: Vec<String> = (0..16).filter_map(|i| {
        let mut f = repo.create_folder(ROOT_FOLDER_ID, "cmis:folder").ok()?;
        f.set_name(&format!("f{:02}", i)).ok()?;
        repo.save_object(f).ok()
    }).collect();
    for i in 0..n {
        let parent = &folders[i % folders.len()];
        let Ok(mut d) = repo.create_document(Some(parent), "bench:record", VersioningState::Major) else { continue };
        let text: Vec<&str> = (0..12).map(|_| WORDS[rng.gen_range(0..WORDS.len())]).collect();
        let _ = d.set_name(&format!("doc-{:06}", i));
        let _ = d.set_property("bench:score", Value::integer(rng.gen_range(0..1000)));
        let _ = d.set_content_stream(ContentStream::text(&text.join(" ")));
        let _ = repo.save_object(d);
    }
    repo
}

fn bench_query(c: &mut Criterion) {
    let ns = [1_000usize, 10_000usize];
    let mut group = c.benchmark_group("query");
    group.sampling_mode(SamplingMode::Flat);
    group.sample_size(20);

    for &n in &ns {
        let repo = seeded_repo(n, 0xA901_1017);
        group.throughput(Throughput::Elements(n as u64));

        group.bench_with_input(BenchmarkId::new("range_order_by", n.to_string()), &n, |b, _| {
            b.iter(|| {
                let rows = repo.query("SELECT cmis:name FROM bench:record WHERE bench:score >= 500 ORDER BY bench:score DESC").map(|r| r.count());
                criterion::black_box(rows.ok());
            });
        });

        group.bench_with_input(BenchmarkId::new("contains", n.to_string()), &n, |b, _| {
            b.iter(|| {
                let rows = repo.query("SELECT cmis:name, SCORE() FROM bench:record WHERE CONTAINS('moon -splashdown') ORDER BY SCORE() DESC").map(|r| r.count());
                criterion::black_box(rows.ok());
            });
        });

        group.bench_with_input(BenchmarkId::new("in_tree_default_order", n.to_string()), &n, |b, _| {
            b.iter(|| {
                let rows = repo.query("SELECT * FROM cmis:document WHERE IN_TREE('/f03')").map(|r| r.count());
                criterion::black_box(rows.ok());
            });
        });
    }

    group.finish();
}

fn bench_save(c: &mut Criterion) {
    let mut group = c.benchmark_group("store");
    group.sample_size(20);
    group.bench_function("create_document", |b| {
        let repo = Repository::default();
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            if let Ok(mut d) = repo.create_document(Some(ROOT_FOLDER_ID), "cmis:document", VersioningState::Major) {
                let _ = d.set_name(&format!("d{}", i));
                criterion::black_box(repo.save_object(d).ok());
            }
        });
    });
    group.finish();
}

criterion_group!(benches, bench_query, bench_save);
criterion_main!(benches);
