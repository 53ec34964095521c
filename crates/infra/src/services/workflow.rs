use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};

use clinicore_appointments::{
    AGGREGATE_TYPE, Appointment, AppointmentCommand, AppointmentStatus, ChangeStatus,
    ScheduleAppointment, UpdateNotes,
};
use clinicore_auth::{Permission, Principal};
use clinicore_core::{AggregateId, DentistId, DomainError, PatientId};
use clinicore_events::EventBus;

use super::{JsonEnvelope, require};
use crate::command_dispatcher::{CommandDispatcher, DispatchError, Loaded};
use crate::event_store::EventStore;

/// Input for scheduling an appointment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAppointment {
    pub patient_id: PatientId,
    pub dentist_id: DentistId,
    pub scheduled_at: DateTime<Utc>,
    pub procedure: String,
    pub declared_value: Option<Decimal>,
    pub notes: Option<String>,
}

/// Appointment lifecycle: scheduling, status transitions and notes.
#[derive(Debug)]
pub struct AppointmentWorkflow<S, B> {
    dispatcher: Arc<CommandDispatcher<S, B>>,
}

impl<S, B> AppointmentWorkflow<S, B>
where
    S: EventStore,
    B: EventBus<JsonEnvelope>,
{
    pub fn new(dispatcher: Arc<CommandDispatcher<S, B>>) -> Self {
        Self { dispatcher }
    }

    pub fn schedule(
        &self,
        principal: &Principal,
        input: NewAppointment,
    ) -> Result<Appointment, DispatchError> {
        require(principal, &Permission::APPOINTMENTS_SCHEDULE)?;

        let appointment_id = AggregateId::new();
        let command = AppointmentCommand::Schedule(ScheduleAppointment {
            appointment_id,
            patient_id: input.patient_id,
            dentist_id: input.dentist_id,
            scheduled_at: input.scheduled_at,
            procedure: input.procedure,
            declared_value: input.declared_value,
            notes: input.notes,
            actor_id: principal.actor_id,
            occurred_at: Utc::now(),
        });

        let outcome = self
            .dispatcher
            .dispatch(appointment_id, AGGREGATE_TYPE, command, Appointment::empty)?;
        info!(%appointment_id, "appointment scheduled");
        Ok(outcome.aggregate)
    }

    /// Move an appointment to `target`.
    ///
    /// Existence is checked before the permission, so an unknown id is `NotFound` for every
    /// caller. The append expects the version the decision was made on.
    pub fn transition(
        &self,
        principal: &Principal,
        appointment_id: AggregateId,
        target: AppointmentStatus,
    ) -> Result<Appointment, DispatchError> {
        let loaded = self.load_existing(appointment_id)?;
        require(principal, &Permission::status_transition(target.as_str()))?;

        let from = loaded.aggregate.status();
        let command = AppointmentCommand::ChangeStatus(ChangeStatus {
            appointment_id,
            target,
            actor_id: principal.actor_id,
            occurred_at: Utc::now(),
        });

        let outcome = self
            .dispatcher
            .decide_and_commit(loaded, AGGREGATE_TYPE, &command)
            .inspect_err(|e| {
                if let Some(DomainError::Conflict(msg)) = e.domain() {
                    warn!(%appointment_id, %msg, "status change lost a concurrent race");
                }
            })?;

        info!(%appointment_id, %from, to = %target, "appointment status changed");
        Ok(outcome.aggregate)
    }

    pub fn update_notes(
        &self,
        principal: &Principal,
        appointment_id: AggregateId,
        notes: Option<String>,
    ) -> Result<Appointment, DispatchError> {
        require(principal, &Permission::APPOINTMENTS_NOTES_WRITE)?;
        let command = AppointmentCommand::UpdateNotes(UpdateNotes {
            appointment_id,
            notes,
            actor_id: principal.actor_id,
            occurred_at: Utc::now(),
        });
        let outcome = self
            .dispatcher
            .dispatch(appointment_id, AGGREGATE_TYPE, command, Appointment::empty)?;
        Ok(outcome.aggregate)
    }

    pub fn get(&self, principal: &Principal, appointment_id: AggregateId) -> Result<Appointment, DispatchError> {
        require(principal, &Permission::APPOINTMENTS_READ)?;
        Ok(self.load_existing(appointment_id)?.aggregate)
    }

    fn load_existing(&self, appointment_id: AggregateId) -> Result<Loaded<Appointment>, DispatchError> {
        let loaded = self.dispatcher.load(appointment_id, Appointment::empty)?;
        if !loaded.aggregate.exists() {
            return Err(DomainError::not_found("appointment", appointment_id).into());
        }
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Fixture, admin, dentist, new_appointment, receptionist};
    use clinicore_core::AggregateRoot;

    #[test]
    fn full_lifecycle_reaches_completed() {
        let fx = Fixture::new();
        let wf = AppointmentWorkflow::new(fx.dispatcher.clone());
        let id = *wf.schedule(&receptionist(), new_appointment()).unwrap().id();

        wf.transition(&receptionist(), id, AppointmentStatus::Confirmed).unwrap();
        wf.transition(&dentist(), id, AppointmentStatus::InProgress).unwrap();
        let done = wf.transition(&dentist(), id, AppointmentStatus::Completed).unwrap();

        assert_eq!(done.status(), AppointmentStatus::Completed);
        assert_eq!(done.version(), 4);
    }

    #[test]
    fn unknown_appointment_is_not_found_before_permissions() {
        let fx = Fixture::new();
        let wf = AppointmentWorkflow::new(fx.dispatcher.clone());
        let err = wf
            .transition(&dentist(), AggregateId::new(), AppointmentStatus::Cancelled)
            .unwrap_err();
        assert!(matches!(
            err.domain(),
            Some(DomainError::NotFound { entity: "appointment", .. })
        ));
    }

    #[test]
    fn dentist_may_not_cancel() {
        let fx = Fixture::new();
        let wf = AppointmentWorkflow::new(fx.dispatcher.clone());
        let id = *wf.schedule(&admin(), new_appointment()).unwrap().id();

        let err = wf
            .transition(&dentist(), id, AppointmentStatus::Cancelled)
            .unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::PermissionDenied(_))));
        assert_eq!(
            wf.get(&admin(), id).unwrap().status(),
            AppointmentStatus::Scheduled
        );
    }

    #[test]
    fn same_status_is_an_invalid_transition() {
        let fx = Fixture::new();
        let wf = AppointmentWorkflow::new(fx.dispatcher.clone());
        let id = *wf.schedule(&admin(), new_appointment()).unwrap().id();

        let err = wf
            .transition(&admin(), id, AppointmentStatus::Scheduled)
            .unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::InvalidTransition { .. })));
    }

    #[test]
    fn notes_are_frozen_after_cancellation() {
        let fx = Fixture::new();
        let wf = AppointmentWorkflow::new(fx.dispatcher.clone());
        let id = *wf.schedule(&admin(), new_appointment()).unwrap().id();

        let a = wf
            .update_notes(&receptionist(), id, Some("bring x-rays".into()))
            .unwrap();
        assert_eq!(a.notes(), Some("bring x-rays"));

        wf.transition(&admin(), id, AppointmentStatus::Cancelled).unwrap();
        let err = wf
            .update_notes(&receptionist(), id, Some("too late".into()))
            .unwrap_err();
        assert!(matches!(
            err.domain(),
            Some(DomainError::AppointmentTerminal { .. })
        ));
    }
}
