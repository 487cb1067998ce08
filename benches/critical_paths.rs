//! Criterion benchmarks for Pyro critical paths
//!
//! Benchmarks the operations that run once per script or per file:
//! - Header: artifact header parsing
//! - Variables: placeholder substitution
//! - Includes: include rule expansion over a directory tree
//! - Planning: compile order sorting

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::fs;
use std::io::Cursor;
use std::path::PathBuf;
use tempfile::TempDir;

use pyro::build::sort_by_depth;
use pyro::header::{encode_header, parse_header, ArtifactHeader, HeaderFormat, HeaderString};
use pyro::package::{IncludeResolver, IncludeRule};
use pyro::project::ScriptUnit;
use pyro::variables::VariableTable;

// =============================================================================
// Test Data Generators
// =============================================================================

fn make_header(format: HeaderFormat) -> Vec<u8> {
    let text = |value: &str| HeaderString { value: value.to_string(), offset: 0 };
    encode_header(&ArtifactHeader {
        format,
        major_version: 3,
        minor_version: 9,
        game_id: 2,
        compile_time: 1_700_000_000,
        script_path: text("C:\\Mods\\MyMod\\Source\\Scripts\\MyMod\\Quests\\MainQuestScript.psc"),
        user_name: text("builder"),
        computer_name: text("BUILDBOX"),
    })
    .unwrap()
}

fn make_table(n: usize) -> VariableTable {
    let declarations: Vec<(String, String)> = (0..n)
        .map(|i| {
            let value = if i == 0 { "C:/Mods".to_string() } else { format!("@Var{}/Part{}", i - 1, i) };
            (format!("Var{}", i), value)
        })
        .collect();
    VariableTable::from_declarations(declarations).unwrap()
}

/// A directory tree with `dirs` folders of `files` files each.
fn make_tree(dirs: usize, files: usize) -> TempDir {
    let temp = TempDir::new().unwrap();
    for d in 0..dirs {
        let dir = temp.path().join(format!("Scripts/Folder{}", d));
        fs::create_dir_all(&dir).unwrap();
        for f in 0..files {
            let ext = if f % 4 == 0 { "psc" } else { "pex" };
            fs::write(dir.join(format!("Script{}.{}", f, ext)), "").unwrap();
        }
    }
    temp
}

fn make_units(n: usize) -> Vec<ScriptUnit> {
    (0..n)
        .map(|i| {
            let depth = i % 5;
            let mut source = PathBuf::from("/mods/Source");
            for level in 0..depth {
                source.push(format!("Level{}", level));
            }
            source.push(format!("Script{}.psc", i));
            ScriptUnit {
                object_name: format!("Script{}.psc", i),
                artifact: PathBuf::from(format!("/mods/out/Script{}.pex", i)),
                source,
            }
        })
        .collect()
}

// =============================================================================
// Benchmarks
// =============================================================================

fn bench_header(c: &mut Criterion) {
    let mut group = c.benchmark_group("header");
    for (name, format) in
        [("little_endian", HeaderFormat::LittleEndian), ("big_endian", HeaderFormat::BigEndian)]
    {
        let bytes = make_header(format);
        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_function(name, |b| {
            b.iter(|| parse_header(&mut Cursor::new(black_box(&bytes))).unwrap())
        });
    }
    group.finish();
}

fn bench_variables(c: &mut Criterion) {
    let mut group = c.benchmark_group("variables");
    for n in [4, 16, 64] {
        let table = make_table(n);
        let text = format!("@Var{}/Scripts/Source/@Var0", n - 1);
        group.bench_with_input(BenchmarkId::new("substitute", n), &text, |b, text| {
            b.iter(|| table.substitute(black_box(text)))
        });
        group.bench_with_input(BenchmarkId::new("from_declarations", n), &n, |b, &n| {
            b.iter(|| make_table(black_box(n)))
        });
    }
    group.finish();
}

fn bench_includes(c: &mut Criterion) {
    let mut group = c.benchmark_group("includes");
    let tree = make_tree(20, 50);
    let root = tree.path().to_path_buf();

    let cases = [
        ("directory", IncludeRule::include("Scripts")),
        ("glob", IncludeRule::include("Scripts/**/*.pex")),
        ("match", IncludeRule::matching("*.pex", "Scripts").with_exclude("Script1*")),
    ];
    for (name, rule) in cases {
        group.bench_function(name, |b| {
            b.iter(|| IncludeResolver::new(&root, vec![rule.clone()], false).count())
        });
    }
    group.finish();
}

fn bench_planning(c: &mut Criterion) {
    let mut group = c.benchmark_group("planning");
    for n in [100, 1000] {
        let units = make_units(n);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("sort_by_depth", n), &units, |b, units| {
            b.iter(|| {
                let mut units = units.clone();
                sort_by_depth(&mut units);
                units
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_header, bench_variables, bench_includes, bench_planning);
criterion_main!(benches);
