//! Device protocol: frames, the command table and page decoders.

mod field;
mod frame;
mod models;
mod queue;
mod schedule;
mod table;

pub use field::{FieldKind, FieldSpec, FieldValue, ResponseFields, StationSet};
pub use frame::ProtocolFrame;
pub use models::{ModelAndVersion, ModelInfo};
pub use queue::{Queue, QueueAssembler, QueueEntry, QueuePage};
pub use schedule::{
    ControllerInfo, Program, ProgramFrequency, Schedule, ScheduleAssembler, SchedulePage,
    SchedulePlan, ZoneDuration,
};
pub use table::{
    CommandDescriptor, CommandTable, Decoded, PageDecoder, ResponseDescriptor, ResponseLayout,
};
