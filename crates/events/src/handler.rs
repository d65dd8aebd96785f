use stockledger_core::Aggregate;

/// Decide then evolve in one step, without persistence.
///
/// Used by unit tests and by dry runs that need to know whether a command
/// would be accepted. Production writes go through the infra dispatcher.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: Aggregate,
{
    let events = aggregate.handle(command)?;
    for ev in &events {
        aggregate.apply(ev);
    }
    Ok(events)
}
