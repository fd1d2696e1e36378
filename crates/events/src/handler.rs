/// Decide and evolve in one step (no IO, no async).
///
/// Calls `handle` and, only if it succeeds, applies every produced event to the
/// aggregate. A rejected command leaves the aggregate exactly as it was.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: printforge_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use printforge_core::{Aggregate, AggregateRoot};

    #[derive(Debug, Clone, PartialEq)]
    struct Counter {
        value: i64,
        version: u64,
    }

    impl AggregateRoot for Counter {
        type Id = u8;

        fn id(&self) -> &Self::Id {
            &0
        }

        fn version(&self) -> u64 {
            self.version
        }
    }

    impl Aggregate for Counter {
        type Command = i64;
        type Event = i64;
        type Error = String;

        fn apply(&mut self, event: &i64) {
            self.value += event;
            self.version += 1;
        }

        fn handle(&self, delta: &i64) -> Result<Vec<i64>, String> {
            if self.value + delta < 0 {
                return Err("would go negative".to_string());
            }
            Ok(vec![*delta])
        }
    }

    #[test]
    fn applies_events_on_success() {
        let mut c = Counter { value: 1, version: 0 };
        let events = execute(&mut c, &2).unwrap();
        assert_eq!(events, vec![2]);
        assert_eq!(c, Counter { value: 3, version: 1 });
    }

    #[test]
    fn rejected_command_leaves_state_untouched() {
        let mut c = Counter { value: 1, version: 4 };
        assert!(execute(&mut c, &-5).is_err());
        assert_eq!(c, Counter { value: 1, version: 4 });
    }
}
