use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use criterion::measurement::WallTime;
use criterion::{
    black_box, criterion_group, criterion_main, BenchmarkGroup, BenchmarkId, Criterion,
};
use xbf::encode::{AssemblyName, PropertyName, TypeName};
use xbf::schema::PermissiveResolver;
use xbf::{LoadOptions, ReaderContext, StringMode, TokenSource, Value, WriteOptions, XbfWriter};

const HASH: [u8; 64] = [0; 64];

fn controls(name: &str) -> TypeName {
    TypeName::new(
        AssemblyName::native("Microsoft.UI.Xaml"),
        "Microsoft.UI.Xaml.Controls",
        name,
    )
}

fn app_type(name: &str) -> TypeName {
    TypeName::new(AssemblyName::managed("App"), "App.Views", name)
}

/// A page with `rows` children, each carrying a couple of attributes.
fn make_page(rows: usize, options: WriteOptions) -> Vec<u8> {
    let mut writer = XbfWriter::new(options);
    writer.line_info(1, 1);
    writer.namespace("x", xbf::constants::DIRECTIVES_NAMESPACE);
    writer.start_object(&app_type("MainPage"));
    writer.end_of_attributes();
    writer.start_member(&PropertyName::new(app_type("MainPage"), "Content"), false);
    writer.start_object(&controls("StackPanel"));
    writer.end_of_attributes();
    writer.start_member(&PropertyName::new(controls("StackPanel"), "Children"), true);
    for i in 0..rows {
        writer.line_info(i as u32 + 2, 9);
        let row = if i % 3 == 0 {
            controls("Button")
        } else {
            app_type(&format!("Row{}", i % 17))
        };
        writer.start_object(&row);
        writer.start_member(&PropertyName::directive("Uid"), false);
        writer.text(&format!("row-{i}"));
        writer.end_member();
        writer.start_member(&PropertyName::new(row.clone(), "Width"), false);
        writer.value(&Value::Float(i as f64 * 0.5));
        writer.end_member();
        writer.end_of_attributes();
        writer.end_object();
    }
    writer.end_member();
    writer.end_object();
    writer.end_member();
    writer.end_object();
    writer.finish(&HASH).unwrap()
}

fn context() -> ReaderContext {
    ReaderContext::new(Rc::new(PermissiveResolver::default()))
}

fn bench_decode(
    group: &mut BenchmarkGroup<'_, WallTime>,
    name: &str,
    bytes: &Arc<[u8]>,
    options: &LoadOptions,
) {
    let ctx = context();
    group.throughput(criterion::Throughput::Bytes(bytes.len() as u64));
    group.bench_function(BenchmarkId::new("decode", name), |b| {
        b.iter(|| {
            let tokens = xbf::decode_with_options(Arc::clone(bytes), &ctx, options).unwrap();
            black_box(tokens);
        })
    });
    group.bench_function(BenchmarkId::new("stream", name), |b| {
        b.iter(|| {
            let mut reader = xbf::decode::reader(Arc::clone(bytes), &ctx, options).unwrap();
            let mut count = 0usize;
            while reader.read().unwrap() {
                count += 1;
            }
            black_box(count);
        })
    });
}

fn criterion_config() -> Criterion {
    if std::env::var("XBF_BENCH_MINIMAL").is_ok() {
        Criterion::default()
            .warm_up_time(Duration::from_secs(0))
            .measurement_time(Duration::from_millis(10))
            .sample_size(1)
            .nresamples(1)
    } else {
        Criterion::default()
    }
}

fn criterion_benchmark(c: &mut Criterion) {
    let stable: Arc<[u8]> = make_page(2000, WriteOptions::default()).into();
    let tables: Arc<[u8]> =
        make_page(2000, WriteOptions::default().with_stable_indices(false)).into();

    let mut group = c.benchmark_group("decode");
    bench_decode(&mut group, "stable_view", &stable, &LoadOptions::default());
    bench_decode(
        &mut group,
        "stable_owned",
        &stable,
        &LoadOptions::new().with_string_mode(StringMode::Owned),
    );
    bench_decode(&mut group, "tables_view", &tables, &LoadOptions::default());
    bench_decode(
        &mut group,
        "validated",
        &stable,
        &LoadOptions::new().with_validate_grammar(true),
    );
    group.finish();

    let mut encode = c.benchmark_group("encode");
    encode.bench_function("page_2000", |b| {
        b.iter(|| black_box(make_page(2000, WriteOptions::default())))
    });
    encode.finish();
}

criterion_group! {
    name = benches;
    config = criterion_config();
    targets = criterion_benchmark
}
criterion_main!(benches);
