use criterion::{Criterion, criterion_group, criterion_main};
use depsync::backend::BackendRegistry;
use depsync::plan::{self, Plan};
use depsync::state::RunState;
use depsync::table::DepsTable;
use std::fmt::Write;
use std::hint::black_box;

const MOCK_STATE: &str = r#"
[entry."chromium.googlesource.com/chromium/deps/icu"]
path = "third_party/externals/icu"
revision = "364118a1d9da24bb5b770ac3d762ac144d6da5a4"
locator = "https://chromium.googlesource.com/chromium/deps/icu"

[entry."skia.googlesource.com/buildbot"]
path = "infra/skia-infra"
revision = "f982e0b8ce1b0e3a8c1d5e0ef5d64dd5d51d0d58"
locator = "https://skia.googlesource.com/buildbot"
"#;

/// A table shaped like a large generated DEPS file: many flat entries
/// plus a few nested trees.
fn large_table_toml(entries: usize) -> String {
    let mut out = String::new();
    for i in 0..entries {
        let path = match i % 10 {
            0 => format!("third_party/externals/tree{}", i / 10),
            1 => format!("third_party/externals/tree{}/nested", i / 10),
            _ => format!("third_party/externals/dep{i}"),
        };
        let _ = write!(
            out,
            "[deps.\"chromium.googlesource.com/external/dep{i}\"]\nversion = \"{:040x}\"\npath = \"{path}\"\n\n",
            i
        );
    }
    out
}

fn bench_table_parse(c: &mut Criterion) {
    let toml_str = large_table_toml(500);
    c.bench_function("parse_deps_toml_500", |b| {
        b.iter(|| {
            DepsTable::parse_toml(black_box(&toml_str), std::path::Path::new("DEPS.toml")).unwrap()
        })
    });
}

fn bench_state_parse(c: &mut Criterion) {
    c.bench_function("parse_state_toml", |b| {
        b.iter(|| {
            let _: RunState = toml::from_str(black_box(MOCK_STATE)).unwrap();
        })
    });
}

fn bench_plan(c: &mut Criterion) {
    let table =
        DepsTable::parse_toml(&large_table_toml(500), std::path::Path::new("DEPS.toml")).unwrap();
    let registry = BackendRegistry::default();
    let root = tempfile::tempdir().unwrap();

    c.bench_function("validate_500", |b| {
        b.iter(|| plan::validate(black_box(&table), &registry).unwrap())
    });

    c.bench_function("plan_build_500", |b| {
        b.iter(|| Plan::build(root.path(), black_box(&table), &registry, None, false).unwrap())
    });
}

criterion_group!(benches, bench_table_parse, bench_state_parse, bench_plan);
criterion_main!(benches);
