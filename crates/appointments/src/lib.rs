//! Appointment lifecycle (event-sourced).
//!
//! The `Appointment` aggregate owns its status machine and the set of material usages
//! recorded against it, so "no usage change after close" is decided against the same
//! stream version as every status change.

pub mod appointment;
pub mod status;
pub mod usage;

pub use appointment::{
    Appointment, AppointmentCommand, AppointmentEvent, AppointmentScheduled, ChangeStatus,
    NotesUpdated, RecordUsage, ReviseUsage, RevokeUsage, ScheduleAppointment, StatusChanged,
    UpdateNotes, UsageRecorded, UsageRevised, UsageRevoked,
};
pub use status::AppointmentStatus;
pub use usage::MaterialUsage;

/// Aggregate type tag used for appointment streams.
pub const AGGREGATE_TYPE: &str = "appointments.appointment";
