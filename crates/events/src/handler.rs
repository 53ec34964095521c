use clinicore_core::Aggregate;

/// Execute an aggregate command deterministically (no IO, no async).
///
/// Decides events with `handle`, then applies each one in order. The aggregate is left
/// untouched when `handle` rejects the command.
///
/// Lets domain tests drive an aggregate through a sequence of commands without a store.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
