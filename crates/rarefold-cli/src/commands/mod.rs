pub mod config;
pub mod featurize;
pub mod variants;
