// Hazard model training and inference benchmarks
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use disaster_response_core::ml::{
    synthetic, FeatureVector, ForestConfig, HazardModel, HazardType, ModelRegistry, RawFeatures,
};

fn forest_training(c: &mut Criterion) {
    let mut group = c.benchmark_group("forest_training");
    group.sample_size(10);

    for samples in [200, 1000].iter() {
        let dataset = synthetic::generate(HazardType::Flood, *samples, 42).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(samples), &dataset, |b, dataset| {
            let config = ForestConfig {
                tree_count: 50,
                max_depth: Some(10),
                random_seed: 42,
            };
            b.iter(|| HazardModel::fit(black_box(dataset), &config).unwrap());
        });
    }
    group.finish();
}

fn forest_prediction(c: &mut Criterion) {
    let dataset = synthetic::generate(HazardType::Earthquake, 1000, 42).unwrap();
    let model = HazardModel::fit(&dataset, &ForestConfig::default()).unwrap();
    let vector = FeatureVector::new(HazardType::Earthquake, vec![6.5, 15.0, 10.0, 0.4]).unwrap();

    c.bench_function("forest_predict_vector", |b| {
        b.iter(|| model.predict(black_box(&vector)).unwrap());
    });
}

fn registry_predict_named(c: &mut Criterion) {
    let registry = ModelRegistry::in_memory();
    let dataset = synthetic::generate(HazardType::Avalanche, 1000, 42).unwrap();
    registry.train(HazardType::Avalanche, &dataset).unwrap();

    let features: RawFeatures = [
        ("snow_depth", 180.0),
        ("slope_angle", 38.0),
        ("temperature", -4.0),
        ("wind_speed", 15.0),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();

    c.bench_function("registry_predict_named", |b| {
        b.iter(|| registry.predict_named("avalanche", black_box(&features)).unwrap());
    });
}

criterion_group!(benches, forest_training, forest_prediction, registry_predict_named);
criterion_main!(benches);
