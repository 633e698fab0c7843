pub mod builder;
pub mod model;

pub use builder::DocumentBuilder;
pub use model::{Document, Product};
