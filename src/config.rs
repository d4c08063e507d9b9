use std::path::PathBuf;
use std::time::Duration;

pub const DEVICE_IDS: [&str; 3] = ["device_01", "device_02", "device_03"];
pub const COLLECTION_NAME: &str = "air_quality_data";
pub const LOG_DIR: &str = "logs";
pub const INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadingBounds {
    pub pm25: Bounds,
    pub pm10: Bounds,
    pub temperature: Bounds,
    pub humidity: Bounds,
}

impl Default for ReadingBounds {
    fn default() -> Self {
        Self {
            pm25: Bounds::new(10.0, 120.0),
            pm10: Bounds::new(20.0, 200.0),
            temperature: Bounds::new(20.0, 40.0),
            humidity: Bounds::new(30.0, 80.0),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub devices: Vec<String>,
    pub collection: String,
    pub logs_dir: PathBuf,
    pub interval: Duration,
    pub bounds: ReadingBounds,
    pub credentials: PathBuf,
}

impl Config {
    pub fn new(credentials: PathBuf) -> Self {
        Self {
            devices: DEVICE_IDS.iter().map(|id| id.to_string()).collect(),
            collection: COLLECTION_NAME.to_string(),
            logs_dir: PathBuf::from(LOG_DIR),
            interval: INTERVAL,
            bounds: ReadingBounds::default(),
            credentials,
        }
    }
}
