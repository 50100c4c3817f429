use criterion::{criterion_group, criterion_main, Criterion};
use image::{GrayImage, Luma};
use image_analysis::{analyze_ela, ElaOptions};

fn bench_ela(c: &mut Criterion) {
    let page = GrayImage::from_fn(640, 480, |x, y| {
        let ink = (y / 12) % 3 == 0 && (x / 5) % 4 != 0;
        Luma([if ink { 20 } else { 235 }])
    });
    let opts = ElaOptions::default();
    c.bench_function("ela_640x480_text_page", |b| {
        b.iter(|| analyze_ela(&page, &[], &opts).unwrap())
    });
}
criterion_group!(benches, bench_ela);
criterion_main!(benches);
