use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use log::{info, warn};
use phex_engine::{
    Attribute, CastTarget, Engine, EngineConfig, EntityId, EntityKind, ItemBehavior, Location,
    Scheduler, SimEntity, SimWorld, SpellId, Tick, Timeline, World,
};
use serde::Deserialize;

/// How long the timeline keeps running after the last step when the scenario
/// does not say.
const DEFAULT_TAIL: Tick = 10_000;

#[derive(Debug, Deserialize)]
pub struct Scenario {
    /// Overrides the config seed for both the engine and the world.
    #[serde(default)]
    pub seed: Option<u64>,
    pub entities: Vec<EntitySpec>,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub until: Option<Tick>,
}

#[derive(Debug, Deserialize)]
pub struct EntitySpec {
    pub id: EntityId,
    pub kind: EntityKind,
    #[serde(default)]
    pub name: String,
    pub location: Location,
    #[serde(default)]
    pub graphic: u16,
    #[serde(default)]
    pub attributes: BTreeMap<Attribute, i64>,
    #[serde(default = "visible_by_default")]
    pub visible: bool,
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default)]
    pub behavior: Option<ItemBehavior>,
    #[serde(default)]
    pub amount: Option<u32>,
}

fn visible_by_default() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct Step {
    pub at: Tick,
    #[serde(flatten)]
    pub event: StepEvent,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StepEvent {
    Use {
        user: EntityId,
        item: EntityId,
    },
    Cast {
        caster: EntityId,
        spell: SpellId,
        target: CastTarget,
        #[serde(default)]
        scroll: Option<EntityId>,
    },
    EnterArea {
        mobile: EntityId,
        player: EntityId,
    },
    Attacked {
        mobile: EntityId,
        attacker: EntityId,
    },
    Acquire {
        mobile: EntityId,
        target: EntityId,
    },
    ForceTarget {
        mobile: EntityId,
        target: EntityId,
    },
    Release {
        mobile: EntityId,
    },
    Move {
        entity: EntityId,
        to: Location,
    },
    Kill {
        entity: EntityId,
    },
    Hide {
        entity: EntityId,
    },
    Show {
        entity: EntityId,
    },
    BlockSight {
        a: EntityId,
        b: EntityId,
        #[serde(default = "visible_by_default")]
        blocked: bool,
    },
    WorldLoad,
}

impl Scenario {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading scenario {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing scenario {}", path.display()))
    }

    /// Tick the run stops at: explicit override, then the scenario's own
    /// horizon, then a fixed tail after the last step.
    pub fn horizon(&self, until: Option<Tick>) -> Tick {
        until.or(self.until).unwrap_or_else(|| {
            self.steps
                .iter()
                .map(|step| step.at)
                .max()
                .unwrap_or(0)
                .saturating_add(DEFAULT_TAIL)
        })
    }
}

pub struct Outcome {
    pub world: SimWorld,
    pub timeline: Timeline,
    pub engine: Engine,
    pub end: Tick,
}

pub fn run(scenario: &Scenario, mut config: EngineConfig, until: Option<Tick>) -> Result<Outcome> {
    if let Some(seed) = scenario.seed {
        config.seed = seed;
    }
    let mut world = SimWorld::new(config.seed);
    let mut timeline = Timeline::new(0);
    let mut engine = Engine::new(config);

    for spec in &scenario.entities {
        let mut entity = SimEntity::new(spec.id, spec.kind, spec.name.clone(), spec.location);
        entity.graphic = spec.graphic;
        entity.visible = spec.visible;
        if let Some(amount) = spec.amount {
            entity.amount = amount;
        }
        let id = world.insert(entity);
        if let Some(profile) = spec.profile.as_deref() {
            engine
                .attach_profile(&mut world, id, profile)
                .with_context(|| format!("attaching profile to entity {id}"))?;
        }
        // Explicit attributes win over profile stats.
        for (&attribute, &value) in &spec.attributes {
            world.set_attribute(id, attribute, value);
        }
        if let Some(behavior) = spec.behavior.clone() {
            engine.attach_item(id, behavior);
        }
    }
    engine.on_world_load(&mut world, &mut timeline);

    let mut steps: Vec<&Step> = scenario.steps.iter().collect();
    steps.sort_by_key(|step| step.at);
    for step in steps {
        engine.run_until(&mut world, &mut timeline, step.at);
        apply(&mut engine, &mut world, &mut timeline, &step.event);
    }

    let end = scenario.horizon(until);
    if end < timeline.now() {
        warn!("horizon {end} is before the last step; stopping at {}", timeline.now());
    }
    engine.run_until(&mut world, &mut timeline, end);
    let end = timeline.now();
    Ok(Outcome {
        world,
        timeline,
        engine,
        end,
    })
}

fn apply(engine: &mut Engine, world: &mut SimWorld, timeline: &mut Timeline, event: &StepEvent) {
    let now = timeline.now();
    match *event {
        StepEvent::Use { user, item } => {
            let outcome = engine.on_use(world, timeline, user, item);
            info!("[{now}] {user} uses {item}: {outcome:?}");
        }
        StepEvent::Cast {
            caster,
            spell,
            target,
            scroll,
        } => match engine.begin_cast(world, timeline, caster, spell, target, scroll) {
            Ok(session) => info!("[{now}] {caster} began {spell:?} as {session}"),
            Err(rejection) => info!("[{now}] {caster} failed {spell:?}: {rejection}"),
        },
        StepEvent::EnterArea { mobile, player } => {
            let reaction = engine.on_enter_area(world, timeline, mobile, player);
            info!("[{now}] {player} enters {mobile}'s area: {reaction:?}");
        }
        StepEvent::Attacked { mobile, attacker } => {
            let reaction = engine.on_attacked(world, timeline, mobile, attacker);
            info!("[{now}] {attacker} attacks {mobile}: {reaction:?}");
        }
        StepEvent::Acquire { mobile, target } => {
            let outcome = engine.acquire(world, timeline, mobile, target);
            info!("[{now}] {mobile} acquires {target}: {outcome:?}");
        }
        StepEvent::ForceTarget { mobile, target } => {
            let outcome = engine.force_target(world, timeline, mobile, target);
            info!("[{now}] {mobile} forced onto {target}: {outcome:?}");
        }
        StepEvent::Release { mobile } => engine.release(world, timeline, mobile),
        StepEvent::Move { entity, to } => world.move_to(entity, to),
        StepEvent::Kill { entity } => world.kill(entity),
        StepEvent::Hide { entity } => world.set_visible(entity, false),
        StepEvent::Show { entity } => world.set_visible(entity, true),
        StepEvent::BlockSight { a, b, blocked } => world.block_sight(a, b, blocked),
        StepEvent::WorldLoad => engine.on_world_load(world, timeline),
    }
}
