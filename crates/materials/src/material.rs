use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use clinicore_core::{
    ActorId, Aggregate, AggregateId, AggregateRoot, DomainError, Money, MovementId, Quantity,
    UsageId,
};
use clinicore_events::Event;

use crate::movement::{MovementKind, StockMovement};

/// Aggregate root: Material.
///
/// `stock` is a cache of the last movement's `resulting_stock`; only `StockMoved` events
/// change it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Material {
    id: AggregateId,
    code: String,
    name: String,
    category: String,
    unit: String,
    description: Option<String>,
    min_stock: Decimal,
    unit_price: Money,
    active: bool,
    stock: Decimal,
    registered_at: Option<DateTime<Utc>>,
    version: u64,
    registered: bool,
}

impl Material {
    /// Create an empty, not-yet-registered aggregate instance for rehydration.
    pub fn empty(id: AggregateId) -> Self {
        Self {
            id,
            code: String::new(),
            name: String::new(),
            category: String::new(),
            unit: String::new(),
            description: None,
            min_stock: Decimal::ZERO,
            unit_price: Money::ZERO,
            active: false,
            stock: Decimal::ZERO,
            registered_at: None,
            version: 0,
            registered: false,
        }
    }

    pub fn is_registered(&self) -> bool {
        self.registered
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn min_stock(&self) -> Decimal {
        self.min_stock
    }

    pub fn unit_price(&self) -> Money {
        self.unit_price
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn stock(&self) -> Decimal {
        self.stock
    }

    pub fn registered_at(&self) -> Option<DateTime<Utc>> {
        self.registered_at
    }

    /// Stock at or below the configured minimum.
    pub fn is_low_stock(&self) -> bool {
        self.stock <= self.min_stock
    }
}

impl AggregateRoot for Material {
    type Id = AggregateId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterMaterial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterMaterial {
    pub material_id: AggregateId,
    pub code: String,
    pub name: String,
    pub category: String,
    pub unit: String,
    pub description: Option<String>,
    pub min_stock: Decimal,
    pub unit_price: Decimal,
    /// Recorded as an `IN` movement in the same commit when > 0.
    pub opening_stock: Decimal,
    /// Pre-allocated id for the opening movement.
    pub opening_movement_id: MovementId,
    pub actor_id: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RepriceMaterial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepriceMaterial {
    pub material_id: AggregateId,
    pub unit_price: Decimal,
    pub actor_id: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeactivateMaterial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeactivateMaterial {
    pub material_id: AggregateId,
    pub actor_id: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ActivateMaterial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivateMaterial {
    pub material_id: AggregateId,
    pub actor_id: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordMovement (manual ledger entry or the stock side of a usage change).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMovement {
    pub material_id: AggregateId,
    pub movement_id: MovementId,
    pub kind: MovementKind,
    pub quantity: Quantity,
    pub actor_id: ActorId,
    pub related_appointment_id: Option<AggregateId>,
    pub related_usage_id: Option<UsageId>,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaterialCommand {
    Register(RegisterMaterial),
    Reprice(RepriceMaterial),
    Deactivate(DeactivateMaterial),
    Activate(ActivateMaterial),
    /// Any movement kind; allowed on inactive materials (stock corrections).
    RecordMovement(RecordMovement),
    /// Consumption for a new usage record; rejected on inactive materials.
    Consume(RecordMovement),
}

/// Event: MaterialRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialRegistered {
    pub material_id: AggregateId,
    pub code: String,
    pub name: String,
    pub category: String,
    pub unit: String,
    pub description: Option<String>,
    pub min_stock: Decimal,
    pub unit_price: Money,
    pub actor_id: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MaterialRepriced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialRepriced {
    pub material_id: AggregateId,
    pub previous_price: Money,
    pub unit_price: Money,
    pub actor_id: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MaterialDeactivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialDeactivated {
    pub material_id: AggregateId,
    pub actor_id: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MaterialActivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialActivated {
    pub material_id: AggregateId,
    pub actor_id: ActorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaterialEvent {
    Registered(MaterialRegistered),
    Repriced(MaterialRepriced),
    Deactivated(MaterialDeactivated),
    Activated(MaterialActivated),
    StockMoved(StockMovement),
}

impl Event for MaterialEvent {
    fn event_type(&self) -> &'static str {
        match self {
            MaterialEvent::Registered(_) => "materials.material.registered",
            MaterialEvent::Repriced(_) => "materials.material.repriced",
            MaterialEvent::Deactivated(_) => "materials.material.deactivated",
            MaterialEvent::Activated(_) => "materials.material.activated",
            MaterialEvent::StockMoved(_) => "materials.material.stock_moved",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            MaterialEvent::Registered(e) => e.occurred_at,
            MaterialEvent::Repriced(e) => e.occurred_at,
            MaterialEvent::Deactivated(e) => e.occurred_at,
            MaterialEvent::Activated(e) => e.occurred_at,
            MaterialEvent::StockMoved(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Material {
    type Command = MaterialCommand;
    type Event = MaterialEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            MaterialEvent::Registered(e) => {
                self.id = e.material_id;
                self.code = e.code.clone();
                self.name = e.name.clone();
                self.category = e.category.clone();
                self.unit = e.unit.clone();
                self.description = e.description.clone();
                self.min_stock = e.min_stock;
                self.unit_price = e.unit_price;
                self.active = true;
                self.stock = Decimal::ZERO;
                self.registered_at = Some(e.occurred_at);
                self.registered = true;
            }
            MaterialEvent::Repriced(e) => {
                self.unit_price = e.unit_price;
            }
            MaterialEvent::Deactivated(_) => {
                self.active = false;
            }
            MaterialEvent::Activated(_) => {
                self.active = true;
            }
            MaterialEvent::StockMoved(m) => {
                self.stock = m.resulting_stock;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            MaterialCommand::Register(cmd) => self.handle_register(cmd),
            MaterialCommand::Reprice(cmd) => self.handle_reprice(cmd),
            MaterialCommand::Deactivate(cmd) => self.handle_deactivate(cmd),
            MaterialCommand::Activate(cmd) => self.handle_activate(cmd),
            MaterialCommand::RecordMovement(cmd) => self.handle_movement(cmd),
            MaterialCommand::Consume(cmd) => self.handle_consume(cmd),
        }
    }
}

fn require_text(field: &str, value: &str, min: usize, max: usize) -> Result<String, DomainError> {
    let trimmed = value.trim();
    let len = trimmed.chars().count();
    if len < min || len > max {
        return Err(DomainError::invalid(format!(
            "{field} must be between {min} and {max} characters"
        )));
    }
    Ok(trimmed.to_string())
}

fn require_non_negative(field: &str, value: Decimal) -> Result<Decimal, DomainError> {
    if value < Decimal::ZERO {
        return Err(DomainError::invalid(format!("{field} must not be negative")));
    }
    Ok(value)
}

impl Material {
    fn ensure_registered(&self) -> Result<(), DomainError> {
        if !self.registered {
            return Err(DomainError::not_found("material", self.id));
        }
        Ok(())
    }

    fn ensure_material_id(&self, material_id: AggregateId) -> Result<(), DomainError> {
        if self.id != material_id {
            return Err(DomainError::invalid("material_id does not match the stream"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterMaterial) -> Result<Vec<MaterialEvent>, DomainError> {
        if self.registered {
            return Err(DomainError::conflict("material already registered"));
        }
        self.ensure_material_id(cmd.material_id)?;

        let code = require_text("code", &cmd.code, 2, 20)?.to_ascii_uppercase();
        let name = require_text("name", &cmd.name, 2, 100)?;
        let category = require_text("category", &cmd.category, 1, 50)?;
        let unit = require_text("unit", &cmd.unit, 1, 10)?;
        let description = match cmd.description.as_deref().map(str::trim) {
            Some(d) if d.chars().count() > 500 => {
                return Err(DomainError::invalid(
                    "description must be at most 500 characters",
                ));
            }
            Some("") | None => None,
            Some(d) => Some(d.to_string()),
        };
        let min_stock = require_non_negative("min_stock", cmd.min_stock)?;
        let unit_price = Money::new(cmd.unit_price)?;
        let opening = require_non_negative("opening_stock", cmd.opening_stock)?;

        let mut events = vec![MaterialEvent::Registered(MaterialRegistered {
            material_id: cmd.material_id,
            code,
            name,
            category,
            unit,
            description,
            min_stock,
            unit_price,
            actor_id: cmd.actor_id,
            occurred_at: cmd.occurred_at,
        })];

        if opening > Decimal::ZERO {
            events.push(MaterialEvent::StockMoved(StockMovement {
                movement_id: cmd.opening_movement_id,
                material_id: cmd.material_id,
                kind: MovementKind::In,
                quantity: Quantity::new(opening)?,
                previous_stock: Decimal::ZERO,
                resulting_stock: opening,
                actor_id: cmd.actor_id,
                related_appointment_id: None,
                related_usage_id: None,
                note: Some("opening stock".to_string()),
                occurred_at: cmd.occurred_at,
            }));
        }

        Ok(events)
    }

    fn handle_reprice(&self, cmd: &RepriceMaterial) -> Result<Vec<MaterialEvent>, DomainError> {
        self.ensure_registered()?;
        self.ensure_material_id(cmd.material_id)?;

        let unit_price = Money::new(cmd.unit_price)?;
        if unit_price == self.unit_price {
            return Ok(vec![]);
        }

        Ok(vec![MaterialEvent::Repriced(MaterialRepriced {
            material_id: cmd.material_id,
            previous_price: self.unit_price,
            unit_price,
            actor_id: cmd.actor_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_deactivate(
        &self,
        cmd: &DeactivateMaterial,
    ) -> Result<Vec<MaterialEvent>, DomainError> {
        self.ensure_registered()?;
        self.ensure_material_id(cmd.material_id)?;
        if !self.active {
            return Err(DomainError::invalid("material is already inactive"));
        }

        Ok(vec![MaterialEvent::Deactivated(MaterialDeactivated {
            material_id: cmd.material_id,
            actor_id: cmd.actor_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_activate(&self, cmd: &ActivateMaterial) -> Result<Vec<MaterialEvent>, DomainError> {
        self.ensure_registered()?;
        self.ensure_material_id(cmd.material_id)?;
        if self.active {
            return Err(DomainError::invalid("material is already active"));
        }

        Ok(vec![MaterialEvent::Activated(MaterialActivated {
            material_id: cmd.material_id,
            actor_id: cmd.actor_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_movement(&self, cmd: &RecordMovement) -> Result<Vec<MaterialEvent>, DomainError> {
        self.ensure_registered()?;
        self.ensure_material_id(cmd.material_id)?;

        let previous_stock = self.stock;
        let resulting_stock = previous_stock
            .checked_add(cmd.kind.signed(cmd.quantity))
            .ok_or_else(|| {
                DomainError::invalid(format!(
                    "resulting stock out of range ({previous_stock} + {})",
                    cmd.quantity.value()
                ))
            })?;
        if resulting_stock < Decimal::ZERO {
            return Err(DomainError::InsufficientStock {
                available: previous_stock,
                requested: cmd.quantity.value(),
            });
        }

        Ok(vec![MaterialEvent::StockMoved(StockMovement {
            movement_id: cmd.movement_id,
            material_id: cmd.material_id,
            kind: cmd.kind,
            quantity: cmd.quantity,
            previous_stock,
            resulting_stock,
            actor_id: cmd.actor_id,
            related_appointment_id: cmd.related_appointment_id,
            related_usage_id: cmd.related_usage_id,
            note: cmd.note.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_consume(&self, cmd: &RecordMovement) -> Result<Vec<MaterialEvent>, DomainError> {
        self.ensure_registered()?;
        if !self.active {
            return Err(DomainError::MaterialInactive(self.code.clone()));
        }
        if cmd.kind != MovementKind::Out {
            return Err(DomainError::invalid("consumption must be an OUT movement"));
        }
        self.handle_movement(cmd)
    }
}
