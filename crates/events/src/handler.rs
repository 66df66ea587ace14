/// Execute an aggregate command in memory: decide, then apply every decided
/// event to the same instance.
///
/// Used by domain tests and by the infra transaction once an aggregate has been
/// rehydrated. Persistence is the caller's concern.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: venuebook_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
