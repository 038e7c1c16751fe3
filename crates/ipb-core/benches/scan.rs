use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

use ipb_core::dom::{MemoryDocument, NoopNotifier};
use ipb_core::{EngineConfig, PageSession, Rect, SiteCache, StyleProperty, Viewport};

const VIEWPORT: Viewport = Viewport::new(1440.0, 900.0);

/// A content-heavy page: `sections` blocks of nested markup, a sticky header,
/// a cookie banner and one full-viewport newsletter overlay.
fn build_page(sections: usize) -> MemoryDocument {
    let mut doc = MemoryDocument::new(VIEWPORT);
    let body = doc.body_id();

    let header = doc.append(body, "header");
    doc.set_computed(header, StyleProperty::Position, "sticky");
    doc.set_computed(header, StyleProperty::ZIndex, "50");

    for i in 0..sections {
        let section = doc.append(body, "section");
        doc.rename(section, "", &format!("block block-{i}"));
        for j in 0..8 {
            let card = doc.append(section, "div");
            doc.rename(card, "", "card");
            let text = doc.append(card, "p");
            doc.set_text(text, &format!("paragraph {i}.{j}"));
        }
    }

    let banner = doc.append(body, "div");
    doc.rename(banner, "cc-banner", "");
    doc.set_computed(banner, StyleProperty::Position, "fixed");
    doc.set_text(banner, "This website uses cookies to improve your experience.");

    let overlay = doc.append(body, "div");
    doc.rename(overlay, "", "newsletter-backdrop");
    doc.set_computed(overlay, StyleProperty::Position, "fixed");
    doc.set_computed(overlay, StyleProperty::ZIndex, "9999");
    doc.set_rect(overlay, Rect::new(0.0, 0.0, VIEWPORT.width, VIEWPORT.height));

    doc
}

fn bench_full_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_scan");

    for sections in [100, 500, 2_000] {
        let page = build_page(sections);
        group.bench_function(format!("{sections}_sections"), |b| {
            b.iter_batched(
                || {
                    let session = PageSession::new(
                        EngineConfig::default(),
                        SiteCache::for_host("bench.example"),
                        Box::new(NoopNotifier),
                        0,
                    );
                    (page.clone(), session)
                },
                |(mut doc, mut session)| black_box(session.start(&mut doc, None, 0)),
                BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

fn bench_mutation_batch(c: &mut Criterion) {
    let page = build_page(500);
    let body = page.body_id();

    c.bench_function("mutation_notify_body", |b| {
        b.iter_batched(
            || {
                PageSession::new(
                    EngineConfig::default(),
                    SiteCache::for_host("bench.example"),
                    Box::new(NoopNotifier),
                    0,
                )
            },
            |mut session| black_box(session.on_mutations(&page, &[body], 1_000)),
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, bench_full_scan, bench_mutation_batch);
criterion_main!(benches);
