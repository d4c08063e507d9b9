use rand::{Rng, distributions::Alphanumeric};

use crate::reading::Reading;

pub const DOCUMENT_ID_LEN: usize = 20;

pub trait RemoteStore {
    fn add(&self, collection: &str, reading: &Reading) -> Result<String, anyhow::Error>;
}

pub fn new_document_id<R: Rng>(rng: &mut R) -> String {
    rng.sample_iter(&Alphanumeric)
        .take(DOCUMENT_ID_LEN)
        .map(char::from)
        .collect()
}
