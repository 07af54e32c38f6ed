pub mod backend;
pub mod cli;
pub mod config;
pub mod injector;
pub mod interpreter;
pub mod learner;
pub mod recorder;
pub mod resolution;
pub mod store;
pub mod virtual_backend;

pub use mimic_common::command;
pub use mimic_common::locator;
pub use mimic_common::parser;
pub use mimic_common::protocol;
