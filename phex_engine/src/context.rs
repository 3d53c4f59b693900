use crate::events::{EventKind, EventLog};
use crate::scheduler::{Action, Scheduler, Tick};
use crate::world::World;

/// Borrowed view of the host handed to every state-machine operation: the
/// world to query and mutate, the scheduler to arm follow-ups on, and the
/// event log to report decisions to.
pub struct HostContext<'a> {
    pub world: &'a mut dyn World,
    pub scheduler: &'a mut dyn Scheduler,
    pub events: &'a mut EventLog,
}

impl<'a> HostContext<'a> {
    pub fn new(
        world: &'a mut dyn World,
        scheduler: &'a mut dyn Scheduler,
        events: &'a mut EventLog,
    ) -> Self {
        Self {
            world,
            scheduler,
            events,
        }
    }

    pub fn now(&self) -> Tick {
        self.scheduler.now()
    }

    pub fn arm(&mut self, delay: Tick, action: Action) {
        self.scheduler.schedule(delay, action);
    }

    pub fn record(&mut self, kind: EventKind) {
        let tick = self.now();
        self.events.record(tick, kind);
    }
}
