pub mod ml_model;
pub mod dataset;
pub mod training;
pub mod inference;

pub use ml_model::{FaceClassifier, ModelConfig, MIN_IMAGE_SIZE, load_and_normalize_image_with_size, image_to_chw, model_to_bytes, model_from_bytes};
pub use dataset::{ImageFolderDataset, ImageBatcher, ImageBatch, ImageItem, list_class_names};
pub use training::{TrainingOptions, TrainingReport, EpochMetrics, train_model, train_with_config};
pub use inference::{InferenceEngine, first_argmax, load_classifier};
