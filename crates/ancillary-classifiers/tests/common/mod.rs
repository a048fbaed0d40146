#![allow(dead_code)]

use ancillary_classifiers::config::{PipelineConfig, TrainConfig};
use ancillary_classifiers::data_handling::{
    BookingRecord, Dataset, FeatureSchema, FlagColumns, PreferenceFlags,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const CHANNELS: [&str; 3] = ["Internet", "Mobile", "Agent"];

pub fn small_schema() -> FeatureSchema {
    FeatureSchema {
        continuous: vec!["lead".to_string(), "duration".to_string()],
        categorical: vec!["channel".to_string()],
        flags: FlagColumns::default(),
        dropped: vec![],
    }
}

/// Bookings whose flags depend on the features plus some label noise.
pub fn synthetic_bookings(n: usize, seed: u64) -> Dataset {
    let mut rng = StdRng::seed_from_u64(seed);
    let records = (0..n)
        .map(|_| {
            let lead: f32 = rng.gen_range(0.0..300.0);
            let duration: f32 = rng.gen_range(1.0..10.0);
            let channel = CHANNELS[rng.gen_range(0..CHANNELS.len())];
            let noise = |rng: &mut StdRng| rng.gen::<f32>() < 0.1;
            let baggage = (duration > 5.0) ^ noise(&mut rng);
            let meals = (channel == "Internet") ^ noise(&mut rng);
            let seat = (lead < 100.0) ^ noise(&mut rng);
            BookingRecord::new(
                vec![lead, duration],
                vec![channel.to_string()],
                PreferenceFlags::new(baggage, meals, seat),
            )
        })
        .collect();
    Dataset::new(small_schema(), records).expect("synthetic dataset is valid")
}

/// Pipeline settings sized for tests.
pub fn test_config() -> PipelineConfig {
    let mut cfg = PipelineConfig {
        schema: small_schema(),
        ..PipelineConfig::default()
    };
    cfg.model.units = 32;
    cfg.training = TrainConfig {
        learning_rate: 0.005,
        ..TrainConfig::default()
    };
    cfg.dependence.features = vec!["lead".to_string(), "duration".to_string()];
    cfg
}
