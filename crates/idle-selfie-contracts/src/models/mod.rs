mod registry;

pub use registry::{ImageModelChoice, ModelFallback, ModelRegistry, ModelSpec, IMAGE_CAPABILITY};
