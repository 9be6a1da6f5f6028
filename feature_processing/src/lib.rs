pub mod dataset;
pub mod error;
pub mod features;
pub mod labels;
pub mod split;

pub use dataset::{Dataset, LatestRow};
pub use error::FeatureError;
pub use labels::Direction;
pub use split::TimeSplit;
