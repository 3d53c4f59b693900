//! Timed guarded actions for scripted world objects.
//!
//! Doors that close themselves, mobiles that chase players on a fixed cadence
//! and spells that resolve after a cast bar all share one shape: arm a delayed
//! [`Action`], then re-check guard tokens when it fires because the world may
//! have moved on. The [`Engine`] owns the three state machines built on that
//! shape and talks to the host only through [`World`] and [`Scheduler`].

pub mod behavior;
pub mod cast;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod events;
pub mod guard;
pub mod pursuit;
pub mod scheduler;
pub mod sim_world;
pub mod spells;
pub mod toggle;
pub mod world;

pub use behavior::{AttackReaction, Behavior, BehaviorBook, ItemBehavior, MobileProfile, SenseReaction};
pub use cast::{CastMachine, CastPhase, CastSession, CastTarget, SessionId};
pub use config::EngineConfig;
pub use context::HostContext;
pub use engine::{Engine, Reaction, UseOutcome};
pub use error::{CastRejection, ConfigError, EngineError};
pub use events::{EngineEvent, EventKind, EventLog};
pub use guard::{Latch, NotBefore, PropertyBook, StaleReason};
pub use pursuit::{
    AbandonReason, AcquireOutcome, AggressionPolicy, PursuitConfig, PursuitMachine, PursuitPhase,
    PursuitState,
};
pub use scheduler::{Action, ScheduledAction, Scheduler, Tick, Timeline};
pub use sim_world::{EntityKind, SimEntity, SimWorld, WorldRecord, VISIBLE_RANGE};
pub use spells::{SpellEffect, SpellId, SpellSpec, TargetKind};
pub use toggle::{ToggleConfig, ToggleMachine, ToggleState, TriggerOutcome};
pub use world::{Attribute, EntityId, Location, VisualEffect, World};
