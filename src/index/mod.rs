pub mod definition;
pub mod unified;

pub use definition::IndexDefinition;
pub use unified::UnifiedIndex;
