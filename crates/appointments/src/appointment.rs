use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use clinicore_core::{
    ActorId, Aggregate, AggregateId, AggregateRoot, DentistId, DomainError, DomainResult, Money,
    PatientId, Quantity, UsageId,
};
use clinicore_events::Event;

use crate::status::AppointmentStatus;
use crate::usage::MaterialUsage;

/// Aggregate root: Appointment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Appointment {
    id: AggregateId,
    patient_id: Option<PatientId>,
    dentist_id: Option<DentistId>,
    scheduled_at: Option<DateTime<Utc>>,
    procedure: String,
    declared_value: Option<Money>,
    status: AppointmentStatus,
    notes: Option<String>,
    usages: Vec<MaterialUsage>,
    version: u64,
    scheduled: bool,
}

impl Appointment {
    /// Create an empty, not-yet-scheduled aggregate instance for rehydration.
    pub fn empty(id: AggregateId) -> Self {
        Self {
            id,
            patient_id: None,
            dentist_id: None,
            scheduled_at: None,
            procedure: String::new(),
            declared_value: None,
            status: AppointmentStatus::Scheduled,
            notes: None,
            usages: Vec::new(),
            version: 0,
            scheduled: false,
        }
    }

    pub fn exists(&self) -> bool {
        self.scheduled
    }

    pub fn patient_id(&self) -> Option<PatientId> {
        self.patient_id
    }

    pub fn dentist_id(&self) -> Option<DentistId> {
        self.dentist_id
    }

    pub fn scheduled_at(&self) -> Option<DateTime<Utc>> {
        self.scheduled_at
    }

    pub fn procedure(&self) -> &str {
        &self.procedure
    }

    pub fn declared_value(&self) -> Option<Money> {
        self.declared_value
    }

    pub fn status(&self) -> AppointmentStatus {
        self.status
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    /// Usages in the order they were recorded.
    pub fn usages(&self) -> &[MaterialUsage] {
        &self.usages
    }

    pub fn usage(&self, usage_id: UsageId) -> Option<&MaterialUsage> {
        self.usages.iter().find(|u| u.usage_id == usage_id)
    }

    /// Sum of `total_value` over all current usages.
    pub fn material_cost(&self) -> DomainResult<Money> {
        Money::total(self.usages.iter().map(|u| u.total_value))
    }

    /// Material cost if `usage_id` were (re)priced at `total`.
    fn material_cost_with(&self, usage_id: UsageId, total: Money) -> DomainResult<Money> {
        Money::total(
            self.usages
                .iter()
                .filter(|u| u.usage_id != usage_id)
                .map(|u| u.total_value)
                .chain(core::iter::once(total)),
        )
    }
}

impl AggregateRoot for Appointment {
    type Id = AggregateId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: ScheduleAppointment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleAppointment {
    pub appointment_id: AggregateId,
    pub patient_id: PatientId,
    pub dentist_id: DentistId,
    pub scheduled_at: DateTime<Utc>,
    pub procedure: String,
    pub declared_value: Option<Decimal>,
    pub notes: Option<String>,
    pub actor_id: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ChangeStatus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeStatus {
    pub appointment_id: AggregateId,
    pub target: AppointmentStatus,
    pub actor_id: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateNotes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateNotes {
    pub appointment_id: AggregateId,
    pub notes: Option<String>,
    pub actor_id: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordUsage. `unit_price` is the catalog price read in the same unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordUsage {
    pub appointment_id: AggregateId,
    pub usage_id: UsageId,
    pub material_id: AggregateId,
    pub quantity: Quantity,
    pub unit_price: Money,
    pub note: Option<String>,
    pub actor_id: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RevokeUsage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevokeUsage {
    pub appointment_id: AggregateId,
    pub usage_id: UsageId,
    pub actor_id: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReviseUsage (quantity change, price re-snapshot).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviseUsage {
    pub appointment_id: AggregateId,
    pub usage_id: UsageId,
    pub quantity: Quantity,
    pub unit_price: Money,
    pub actor_id: ActorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppointmentCommand {
    Schedule(ScheduleAppointment),
    ChangeStatus(ChangeStatus),
    UpdateNotes(UpdateNotes),
    RecordUsage(RecordUsage),
    RevokeUsage(RevokeUsage),
    ReviseUsage(ReviseUsage),
}

/// Event: AppointmentScheduled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentScheduled {
    pub appointment_id: AggregateId,
    pub patient_id: PatientId,
    pub dentist_id: DentistId,
    pub scheduled_at: DateTime<Utc>,
    pub procedure: String,
    pub declared_value: Option<Money>,
    pub notes: Option<String>,
    pub actor_id: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StatusChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChanged {
    pub appointment_id: AggregateId,
    pub from: AppointmentStatus,
    pub to: AppointmentStatus,
    pub actor_id: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: NotesUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotesUpdated {
    pub appointment_id: AggregateId,
    pub notes: Option<String>,
    pub actor_id: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: UsageRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecorded {
    pub usage: MaterialUsage,
}

/// Event: UsageRevoked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRevoked {
    pub appointment_id: AggregateId,
    pub usage_id: UsageId,
    pub material_id: AggregateId,
    pub quantity: Quantity,
    pub total_value: Money,
    pub actor_id: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: UsageRevised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRevised {
    pub appointment_id: AggregateId,
    pub usage_id: UsageId,
    pub material_id: AggregateId,
    pub previous_quantity: Quantity,
    pub quantity: Quantity,
    pub unit_price_at_use: Money,
    pub total_value: Money,
    pub actor_id: ActorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppointmentEvent {
    Scheduled(AppointmentScheduled),
    StatusChanged(StatusChanged),
    NotesUpdated(NotesUpdated),
    UsageRecorded(UsageRecorded),
    UsageRevoked(UsageRevoked),
    UsageRevised(UsageRevised),
}

impl Event for AppointmentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            AppointmentEvent::Scheduled(_) => "appointments.appointment.scheduled",
            AppointmentEvent::StatusChanged(_) => "appointments.appointment.status_changed",
            AppointmentEvent::NotesUpdated(_) => "appointments.appointment.notes_updated",
            AppointmentEvent::UsageRecorded(_) => "appointments.appointment.usage_recorded",
            AppointmentEvent::UsageRevoked(_) => "appointments.appointment.usage_revoked",
            AppointmentEvent::UsageRevised(_) => "appointments.appointment.usage_revised",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            AppointmentEvent::Scheduled(e) => e.occurred_at,
            AppointmentEvent::StatusChanged(e) => e.occurred_at,
            AppointmentEvent::NotesUpdated(e) => e.occurred_at,
            AppointmentEvent::UsageRecorded(e) => e.usage.recorded_at,
            AppointmentEvent::UsageRevoked(e) => e.occurred_at,
            AppointmentEvent::UsageRevised(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Appointment {
    type Command = AppointmentCommand;
    type Event = AppointmentEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            AppointmentEvent::Scheduled(e) => {
                self.id = e.appointment_id;
                self.patient_id = Some(e.patient_id);
                self.dentist_id = Some(e.dentist_id);
                self.scheduled_at = Some(e.scheduled_at);
                self.procedure = e.procedure.clone();
                self.declared_value = e.declared_value;
                self.status = AppointmentStatus::Scheduled;
                self.notes = e.notes.clone();
                self.scheduled = true;
            }
            AppointmentEvent::StatusChanged(e) => {
                self.status = e.to;
            }
            AppointmentEvent::NotesUpdated(e) => {
                self.notes = e.notes.clone();
            }
            AppointmentEvent::UsageRecorded(e) => {
                self.usages.push(e.usage.clone());
            }
            AppointmentEvent::UsageRevoked(e) => {
                self.usages.retain(|u| u.usage_id != e.usage_id);
            }
            AppointmentEvent::UsageRevised(e) => {
                if let Some(u) = self.usages.iter_mut().find(|u| u.usage_id == e.usage_id) {
                    u.quantity = e.quantity;
                    u.unit_price_at_use = e.unit_price_at_use;
                    u.total_value = e.total_value;
                    u.revised_at = Some(e.occurred_at);
                }
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            AppointmentCommand::Schedule(cmd) => self.handle_schedule(cmd),
            AppointmentCommand::ChangeStatus(cmd) => self.handle_change_status(cmd),
            AppointmentCommand::UpdateNotes(cmd) => self.handle_update_notes(cmd),
            AppointmentCommand::RecordUsage(cmd) => self.handle_record_usage(cmd),
            AppointmentCommand::RevokeUsage(cmd) => self.handle_revoke_usage(cmd),
            AppointmentCommand::ReviseUsage(cmd) => self.handle_revise_usage(cmd),
        }
    }
}

fn clean_notes(notes: Option<&str>) -> Option<String> {
    notes
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
}

impl Appointment {
    fn ensure_exists(&self) -> Result<(), DomainError> {
        if !self.scheduled {
            return Err(DomainError::not_found("appointment", self.id));
        }
        Ok(())
    }

    fn ensure_appointment_id(&self, appointment_id: AggregateId) -> Result<(), DomainError> {
        if self.id != appointment_id {
            return Err(DomainError::invalid(
                "appointment_id does not match the stream",
            ));
        }
        Ok(())
    }

    /// Usage and notes changes are refused once the appointment is closed.
    pub fn ensure_open(&self) -> Result<(), DomainError> {
        if self.status.is_terminal() {
            return Err(DomainError::AppointmentTerminal {
                status: self.status.to_string(),
            });
        }
        Ok(())
    }

    fn find_usage(&self, usage_id: UsageId) -> Result<&MaterialUsage, DomainError> {
        self.usage(usage_id)
            .ok_or_else(|| DomainError::not_found("material usage", usage_id))
    }

    fn handle_schedule(
        &self,
        cmd: &ScheduleAppointment,
    ) -> Result<Vec<AppointmentEvent>, DomainError> {
        if self.scheduled {
            return Err(DomainError::conflict("appointment already scheduled"));
        }
        self.ensure_appointment_id(cmd.appointment_id)?;

        let procedure = cmd.procedure.trim();
        if procedure.is_empty() {
            return Err(DomainError::invalid("procedure cannot be empty"));
        }
        let declared_value = match cmd.declared_value {
            Some(v) if v <= Decimal::ZERO => {
                return Err(DomainError::invalid(
                    "declared value must be greater than zero",
                ));
            }
            Some(v) => Some(Money::new(v)?),
            None => None,
        };

        Ok(vec![AppointmentEvent::Scheduled(AppointmentScheduled {
            appointment_id: cmd.appointment_id,
            patient_id: cmd.patient_id,
            dentist_id: cmd.dentist_id,
            scheduled_at: cmd.scheduled_at,
            procedure: procedure.to_string(),
            declared_value,
            notes: clean_notes(cmd.notes.as_deref()),
            actor_id: cmd.actor_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_status(
        &self,
        cmd: &ChangeStatus,
    ) -> Result<Vec<AppointmentEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_appointment_id(cmd.appointment_id)?;

        if !self.status.can_transition_to(cmd.target) {
            return Err(DomainError::InvalidTransition {
                from: self.status.to_string(),
                to: cmd.target.to_string(),
            });
        }

        Ok(vec![AppointmentEvent::StatusChanged(StatusChanged {
            appointment_id: cmd.appointment_id,
            from: self.status,
            to: cmd.target,
            actor_id: cmd.actor_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_notes(&self, cmd: &UpdateNotes) -> Result<Vec<AppointmentEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_appointment_id(cmd.appointment_id)?;
        self.ensure_open()?;

        let notes = clean_notes(cmd.notes.as_deref());
        if notes == self.notes {
            return Ok(vec![]);
        }

        Ok(vec![AppointmentEvent::NotesUpdated(NotesUpdated {
            appointment_id: cmd.appointment_id,
            notes,
            actor_id: cmd.actor_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_record_usage(&self, cmd: &RecordUsage) -> Result<Vec<AppointmentEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_appointment_id(cmd.appointment_id)?;
        self.ensure_open()?;

        if self.usage(cmd.usage_id).is_some() {
            return Err(DomainError::conflict(format!(
                "usage {} already recorded",
                cmd.usage_id
            )));
        }

        let total_value = MaterialUsage::priced(cmd.quantity, cmd.unit_price)?;
        self.material_cost_with(cmd.usage_id, total_value)?;

        Ok(vec![AppointmentEvent::UsageRecorded(UsageRecorded {
            usage: MaterialUsage {
                usage_id: cmd.usage_id,
                appointment_id: cmd.appointment_id,
                material_id: cmd.material_id,
                quantity: cmd.quantity,
                unit_price_at_use: cmd.unit_price,
                total_value,
                note: clean_notes(cmd.note.as_deref()),
                recorded_at: cmd.occurred_at,
                recorded_by: cmd.actor_id,
                revised_at: None,
            },
        })])
    }

    fn handle_revoke_usage(&self, cmd: &RevokeUsage) -> Result<Vec<AppointmentEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_appointment_id(cmd.appointment_id)?;
        let usage = self.find_usage(cmd.usage_id)?;
        self.ensure_open()?;

        Ok(vec![AppointmentEvent::UsageRevoked(UsageRevoked {
            appointment_id: cmd.appointment_id,
            usage_id: usage.usage_id,
            material_id: usage.material_id,
            quantity: usage.quantity,
            total_value: usage.total_value,
            actor_id: cmd.actor_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_revise_usage(&self, cmd: &ReviseUsage) -> Result<Vec<AppointmentEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_appointment_id(cmd.appointment_id)?;
        let usage = self.find_usage(cmd.usage_id)?;
        self.ensure_open()?;

        let total_value = MaterialUsage::priced(cmd.quantity, cmd.unit_price)?;
        self.material_cost_with(usage.usage_id, total_value)?;

        Ok(vec![AppointmentEvent::UsageRevised(UsageRevised {
            appointment_id: cmd.appointment_id,
            usage_id: usage.usage_id,
            material_id: usage.material_id,
            previous_quantity: usage.quantity,
            quantity: cmd.quantity,
            unit_price_at_use: cmd.unit_price,
            total_value,
            actor_id: cmd.actor_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
