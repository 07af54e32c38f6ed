pub mod action;
pub mod command;
pub mod error;
pub mod knowledge;
pub mod locator;
pub mod parser;
pub mod pattern;
pub mod protocol;

pub use action::{ActionKind, ActionPayload, ElementDescriptor, ObservationSession, RawAction};
pub use command::{Command, PointerTarget, ScrollDirection};
pub use error::BackendError;
pub use knowledge::{BehaviorPatch, BehaviorStatistics, KnowledgeRecord, PlanStep};
pub use locator::Locator;
pub use parser::{ParseError, parse_command};
pub use pattern::{
    ExtractedPattern, FallbackEntry, InvariantStep, SampledValue, VariantStep, VariationKind,
};
