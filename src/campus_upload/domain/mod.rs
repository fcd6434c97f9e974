pub mod dimensions;
pub mod error;
pub mod image;
pub mod listing;
pub mod normalizer_trait;
