// src/models/mod.rs - Domain records shared across the pipeline

pub mod alarm;
pub mod event;
pub mod notify;
pub mod status;

pub use alarm::{AlarmDefinition, Level, RawAlarm};
pub use event::{EventData, Row, TagMap};
pub use notify::{NotifyData, NotifyRequest};
pub use status::{round2, Status};
