use chrono::{SubsecRound, Utc};
use rand::{Rng, RngCore};

use crate::{
    config::{Bounds, ReadingBounds},
    reading::Reading,
};

#[derive(Debug)]
pub struct Generator<R> {
    rng: R,
    bounds: ReadingBounds,
}

impl<R: RngCore> Generator<R> {
    pub fn new(rng: R, bounds: ReadingBounds) -> Self {
        Self { rng, bounds }
    }

    pub fn generate(&mut self, device_id: &str) -> Reading {
        Reading {
            // Microseconds, so the log text and the Firestore timestamp agree.
            timestamp: Utc::now().naive_utc().trunc_subsecs(6),
            device_id: device_id.to_string(),
            pm25: self.sample(self.bounds.pm25),
            pm10: self.sample(self.bounds.pm10),
            temperature: self.sample(self.bounds.temperature),
            humidity: self.sample(self.bounds.humidity),
        }
    }

    fn sample(&mut self, bounds: Bounds) -> f64 {
        let u: f64 = self.rng.r#gen();
        let value = round1(bounds.min + (bounds.max - bounds.min) * u);
        debug_assert!(bounds.contains(value));
        value
    }
}

pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
