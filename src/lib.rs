// Library exports for polpredict
pub mod aligner;
pub mod alignment;
pub mod column_map;
pub mod error;
pub mod fasta;
pub mod features;
pub mod flatten;
pub mod model;
pub mod pipeline;
pub mod scoring;
pub mod search;
pub mod tools;

pub use alignment::{Alignment, ReferenceAlignment, SampleAlignment};
pub use column_map::{map_columns, ColumnMap};
pub use error::PredictError;
pub use features::{generate_features, FeatureDefinition, FeatureSet, FeatureValues, FeatureVector, Residue};
