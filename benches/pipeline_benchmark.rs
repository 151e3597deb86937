use candle_core::Device;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use emotive::preprocessing::normalize;
use emotive::tokenizer::{pad, Vocabulary};
use emotive::{InferenceContext, LabelSchema, ModelConfig, ModelMetadata, SelectionPolicy, TrainedModel};

const SHORT_TEXT: &str = "Thank you so much!";
const MEDIUM_TEXT: &str = "I absolutely love this, thank you!!! 😊 https://x.co \
    It made my whole week and I can't stop smiling about it.";
const LONG_TEXT: &str = "This is a much longer comment that rambles on for a while. \
    At first I was annoyed by the delay, honestly a bit disappointed, \
    but then the support team reached out and fixed everything in minutes. \
    Now I'm relieved, grateful and a little embarrassed about my first message. \
    Would recommend to anyone who asked me, www.example.com has the details.";

fn vocabulary() -> Vocabulary {
    Vocabulary::fit(
        [SHORT_TEXT, MEDIUM_TEXT, LONG_TEXT].iter().map(|t| normalize(t).unwrap()),
        20000,
        "<OOV>",
    )
    .unwrap()
}

fn setup_benchmark_context() -> InferenceContext {
    let vocabulary = vocabulary();
    let labels = LabelSchema::goemotions();
    let config = ModelConfig::new(vocabulary.vocab_size(), labels.len());
    let metadata = ModelMetadata::new(config, labels.clone(), vocabulary.fingerprint().unwrap());
    let model = TrainedModel::new(metadata, Device::Cpu).unwrap();

    InferenceContext::new(vocabulary, Box::new(model), labels, 100, SelectionPolicy::default()).unwrap()
}

fn bench_preprocessing(c: &mut Criterion) {
    let vocabulary = vocabulary();
    let mut group = c.benchmark_group("Preprocessing");
    group.sample_size(50);
    group.warm_up_time(std::time::Duration::from_secs(1));

    for (name, text) in [("short_text", SHORT_TEXT), ("medium_text", MEDIUM_TEXT), ("long_text", LONG_TEXT)] {
        group.bench_function(name, |b| {
            b.iter(|| {
                let cleaned = normalize(black_box(text)).unwrap();
                pad(&vocabulary.encode(&cleaned), 100).unwrap()
            })
        });
    }

    group.finish();
}

fn bench_prediction(c: &mut Criterion) {
    let ctx = setup_benchmark_context();
    let mut group = c.benchmark_group("Prediction");
    group.sample_size(20);
    group.warm_up_time(std::time::Duration::from_secs(1));

    group.bench_function("top3", |b| b.iter(|| ctx.predict(black_box(MEDIUM_TEXT)).unwrap()));
    group.bench_function("threshold", |b| {
        b.iter(|| {
            ctx.predict_with(black_box(MEDIUM_TEXT), SelectionPolicy::default_threshold())
                .unwrap()
        })
    });

    group.finish();
}

criterion_group!(benches, bench_preprocessing, bench_prediction);
criterion_main!(benches);
