pub mod clickup;
pub mod processor;
