//! Performance benchmarks for rs-surf extraction.
//!
//! Run with: `cargo bench`
//!
//! Benchmarks include:
//! - Image canonicalization on lazy-loaded and `<picture>` markup
//! - The full pipeline with and without the Readability tier
//! - Rescue on a page whose summary lost its figures

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rs_surf::extractor::rescue_content;
use rs_surf::preprocess::normalize;
use rs_surf::{extract, extract_with_options, Options};

const SAMPLE_HTML: &str = r#"
<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Sample Article</title>
</head>
<body>
    <nav>
        <a href="/">Home</a>
        <a href="/about">About</a>
    </nav>
    <main>
        <article>
            <h1>Sample Article Title</h1>
            <picture>
                <source srcset="/img/hero.webp 1x, /img/hero@2x.webp 2x">
                <img alt="Hero">
            </picture>
            <p>This is the first paragraph of the article. It contains some meaningful
            content, several clauses, and enough words to be scored as prose.</p>
            <figure><img data-src="//cdn.example.com/chart.png" src="data:image/gif;base64,R0lGOD"><figcaption>Chart</figcaption></figure>
            <p>Here is a second paragraph with more content. The extraction should
            preserve the text and the figures while removing navigation.</p>
            <p>A third paragraph ensures we have enough content for meaningful
            benchmarking of the extraction performance.</p>
        </article>
    </main>
    <aside>
        <h3>Related Articles</h3>
        <ul>
            <li><a href="/r1">Related article 1</a></li>
            <li><a href="/r2">Related article 2</a></li>
        </ul>
    </aside>
    <footer>
        <p>Copyright 2024</p>
    </footer>
</body>
</html>
"#;

const SUMMARY_HTML: &str = "<div><p>This is the first paragraph of the article. It contains some meaningful \
     content, several clauses, and enough words to be scored as prose.</p></div>";

fn bench_preprocess(c: &mut Criterion) {
    c.bench_function("preprocess", |b| {
        b.iter(|| normalize(black_box(SAMPLE_HTML)));
    });
}

fn bench_extract_default(c: &mut Criterion) {
    c.bench_function("extract_default", |b| {
        b.iter(|| extract(black_box(SAMPLE_HTML)));
    });
}

fn bench_extract_secondary_only(c: &mut Criterion) {
    let options = Options {
        use_readability: false,
        ..Options::default()
    };

    c.bench_function("extract_secondary_only", |b| {
        b.iter(|| extract_with_options(black_box(SAMPLE_HTML), black_box(&options)));
    });
}

/// Rescue cost as the document grows.
fn bench_rescue_scaling(c: &mut Criterion) {
    let options = Options::default();
    let preprocessed = normalize(SAMPLE_HTML).into_html();
    let mut group = c.benchmark_group("rescue");

    for padding in [0usize, 50, 500] {
        let filler = "<div class='teaser'><p>Unrelated teaser text.</p></div>".repeat(padding);
        let document = preprocessed.replace("<footer>", &format!("{filler}<footer>"));
        group.throughput(Throughput::Bytes(document.len() as u64));
        group.bench_with_input(
            BenchmarkId::new("rescue_content", format!("{} teasers", padding)),
            &document,
            |b, document| {
                b.iter(|| rescue_content(black_box(document), black_box(SUMMARY_HTML), &options));
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_preprocess,
    bench_extract_default,
    bench_extract_secondary_only,
    bench_rescue_scaling
);
criterion_main!(benches);
