pub mod context;
pub mod model;

pub use context::{Attribute, FeatureContext, PRESENT};
pub use model::{ClassifierModel, Distribution, Domain};
