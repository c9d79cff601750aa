// Services layer
// Services own validation and call the engine or the store directly

pub mod catalog;
pub mod error;
pub mod jobs;

pub use catalog::CatalogService;
pub use error::{ServiceError, ServiceResult};
pub use jobs::JobService;
