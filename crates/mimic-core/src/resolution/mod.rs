pub mod context;
pub mod resolver;
pub mod result;

pub use context::ResolutionContext;
pub use resolver::ElementResolver;
pub use result::{ResolutionError, Strategy};
