use thiserror::Error;

use crate::datasets::SplitMode;

#[derive(Debug, Error)]
pub enum TgbError {
    #[error("unknown memory mode `{0}` (expected `unlimited` or `fixed_time_window`)")]
    UnknownMemoryMode(String),

    #[error("time window ratio must be in (0, 1], got {0}")]
    InvalidTimeWindowRatio(f64),

    #[error("length mismatch: src={src}, dst={dst}, t={t}")]
    LengthMismatch { src: usize, dst: usize, t: usize },

    #[error("unknown evaluation metric `{0}`")]
    UnknownMetric(String),

    #[error("negative samples for the {0} split are not loaded")]
    NegativesNotLoaded(SplitMode),

    #[error("no negative samples for edge ({src}, {dst}, {t}) in the {split} split")]
    MissingNegatives {
        src: u32,
        dst: u32,
        t: i64,
        split: SplitMode,
    },

    #[error("the {0} split contains no edges")]
    EmptySplit(SplitMode),

    #[error("batch size must be positive")]
    ZeroBatchSize,

    #[error("dataset `{name}` not found at {path} and no download url configured")]
    DatasetNotFound { name: String, path: String },
}
