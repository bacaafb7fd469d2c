//! Component types stored in the [`World`](crate::world::World).
//!
//! Components are split by owning system: each one is written by exactly
//! one system and read by any number of observers.

use glam::Vec3;
use hearth_ecs::entity::EntityId;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Spatial
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
}

impl Transform {
    pub fn at(x: f32, y: f32, z: f32) -> Self {
        Self {
            position: Vec3::new(x, y, z),
        }
    }
}

/// Circular blocker on the XZ plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    pub radius: f32,
}

/// Straight-line mover used by probe villagers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MoveTarget {
    pub target: Vec3,
    pub speed: f32,
}

// ---------------------------------------------------------------------------
// Gather / deliver
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GatherPhase {
    #[default]
    Idle,
    ToResource,
    Harvest,
    ToDepot,
    Resting,
}

impl GatherPhase {
    pub fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::ToResource => "to_resource",
            Self::Harvest => "harvest",
            Self::ToDepot => "to_depot",
            Self::Resting => "resting",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatherState {
    pub phase: GatherPhase,
    /// Seconds spent in the current phase (counts up) or remaining rest
    /// (counts down while `Resting`).
    pub phase_timer: f32,
    pub current_depot: Option<EntityId>,
    pub current_resource_node: Option<EntityId>,
    /// Resources currently carried.
    pub carry: f32,
    pub carry_kind: Option<ResourceKind>,
    /// PRNG state, advanced every processed tick.
    pub random_state: u32,
}

impl GatherState {
    pub fn seeded(random_state: u32) -> Self {
        Self {
            phase: GatherPhase::Idle,
            phase_timer: 0.0,
            current_depot: None,
            current_resource_node: None,
            carry: 0.0,
            carry_kind: None,
            random_state,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Wood,
    Stone,
    Food,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceNode {
    pub kind: ResourceKind,
    pub remaining: f32,
    /// Villagers allowed to hold a claim on this node at once.
    pub max_harvesters: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Storehouse {
    pub total_stored: f32,
    pub total_capacity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub kind: ResourceKind,
    pub amount: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CapacityEntry {
    pub kind: ResourceKind,
    pub capacity: f32,
}

/// Per-kind depot contents. Created lazily on first deposit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    pub items: Vec<InventoryItem>,
    pub capacities: Vec<CapacityEntry>,
}

impl Inventory {
    pub fn amount(&self, kind: ResourceKind) -> f32 {
        self.items
            .iter()
            .filter(|i| i.kind == kind)
            .map(|i| i.amount)
            .sum()
    }

    pub fn add(&mut self, kind: ResourceKind, amount: f32) {
        match self.items.iter_mut().find(|i| i.kind == kind) {
            Some(item) => item.amount += amount,
            None => self.items.push(InventoryItem { kind, amount }),
        }
    }

    pub fn total(&self) -> f32 {
        self.items.iter().map(|i| i.amount).sum()
    }
}

// ---------------------------------------------------------------------------
// Goals, needs and intent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GoalKind {
    #[default]
    Idle,
    Work,
    Build,
    Fight,
    Eat,
    Sleep,
    Pray,
    SeekShelter,
    Socialize,
}

impl GoalKind {
    /// The need a goal satisfies, if any.
    pub fn need(self) -> Option<NeedKind> {
        match self {
            Self::Eat => Some(NeedKind::Hunger),
            Self::Sleep => Some(NeedKind::Rest),
            Self::Pray => Some(NeedKind::Faith),
            Self::SeekShelter => Some(NeedKind::Safety),
            Self::Socialize => Some(NeedKind::Social),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Goal {
    pub current: GoalKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NeedKind {
    Hunger,
    Rest,
    Faith,
    Safety,
    Social,
    Work,
}

impl NeedKind {
    pub const SEEKABLE: [NeedKind; 5] = [
        NeedKind::Hunger,
        NeedKind::Rest,
        NeedKind::Faith,
        NeedKind::Safety,
        NeedKind::Social,
    ];

    pub fn goal(self) -> Option<GoalKind> {
        match self {
            Self::Hunger => Some(GoalKind::Eat),
            Self::Rest => Some(GoalKind::Sleep),
            Self::Faith => Some(GoalKind::Pray),
            Self::Safety => Some(GoalKind::SeekShelter),
            Self::Social => Some(GoalKind::Socialize),
            Self::Work => None,
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "hunger" => Some(Self::Hunger),
            "rest" => Some(Self::Rest),
            "faith" => Some(Self::Faith),
            "safety" => Some(Self::Safety),
            "social" => Some(Self::Social),
            "work" => Some(Self::Work),
            _ => None,
        }
    }
}

/// Urgencies in `[0, 1]`; higher is more pressing.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Needs {
    pub hunger: f32,
    pub rest: f32,
    pub faith: f32,
    pub safety: f32,
    pub social: f32,
    pub work: f32,
}

impl Needs {
    pub fn get(&self, kind: NeedKind) -> f32 {
        match kind {
            NeedKind::Hunger => self.hunger,
            NeedKind::Rest => self.rest,
            NeedKind::Faith => self.faith,
            NeedKind::Safety => self.safety,
            NeedKind::Social => self.social,
            NeedKind::Work => self.work,
        }
    }

    pub fn get_mut(&mut self, kind: NeedKind) -> &mut f32 {
        match kind {
            NeedKind::Hunger => &mut self.hunger,
            NeedKind::Rest => &mut self.rest,
            NeedKind::Faith => &mut self.faith,
            NeedKind::Safety => &mut self.safety,
            NeedKind::Social => &mut self.social,
            NeedKind::Work => &mut self.work,
        }
    }

    /// The most urgent seekable need, ties broken by declaration order.
    pub fn most_urgent(&self) -> (NeedKind, f32) {
        NeedKind::SEEKABLE
            .iter()
            .map(|&k| (k, self.get(k)))
            .fold((NeedKind::Hunger, f32::MIN), |best, cur| {
                if cur.1 > best.1 {
                    cur
                } else {
                    best
                }
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum JobType {
    #[default]
    None,
    Gather,
    Build,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum JobPhase {
    #[default]
    Idle,
    Seek,
    Harvest,
    Deliver,
    Rest,
    Work,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MoveIntent {
    #[default]
    Hold,
    ToTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MovePlan {
    #[default]
    None,
    Direct,
    Routed,
}

/// The intent record a state machine publishes for its villager.
///
/// Written only by the owning state machine; read by the repetition
/// detector and the audit.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AgentJob {
    pub job_type: JobType,
    pub job_phase: JobPhase,
    pub move_intent: MoveIntent,
    pub move_plan: MovePlan,
    pub target: Option<EntityId>,
    pub carry_count: f32,
}

// ---------------------------------------------------------------------------
// Combat
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CombatStats {
    pub current_health: f32,
    pub max_health: f32,
    pub attack_damage: f32,
}

impl CombatStats {
    pub fn new(max_health: f32, attack_damage: f32) -> Self {
        Self {
            current_health: max_health,
            max_health,
            attack_damage,
        }
    }

    pub fn is_defeated(&self) -> bool {
        self.current_health <= 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Threat {
    pub current_target: Option<EntityId>,
    pub urgency: f32,
}

// ---------------------------------------------------------------------------
// Buildings and construction
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BuildingKind {
    Storehouse,
    House,
    Temple,
    Shelter,
    Tavern,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Building {
    pub kind: BuildingKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConstructionSite {
    /// What the site becomes once completed.
    pub kind: BuildingKind,
    pub progress: f32,
    pub required_work: f32,
    pub completed: bool,
}

impl ConstructionSite {
    pub fn new(kind: BuildingKind, required_work: f32) -> Self {
        Self {
            kind,
            progress: 0.0,
            required_work,
            completed: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildAssignment {
    pub site: EntityId,
}
