// ── Factory schema ──
//
// The JSON shape the ComputerCraft controller emits for a factory. Entity
// maps are keyed by ID (the controller looks entities up by ID far more than
// it scans them), and every map is a `BTreeMap` so serialization is stable.

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Identifiers ─────────────────────────────────────────────────────

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            /// Mint a fresh random identifier.
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::convert::Infallible;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.to_owned()))
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Identifier of a [`Machine`].
    MachineId
);
string_id!(
    /// Identifier of a slot [`Group`].
    GroupId
);
string_id!(
    /// Identifier of a [`Pipe`].
    PipeId
);
string_id!(
    /// Identifier of a ComputerCraft peripheral on the wired network.
    PeriphId
);
string_id!(
    /// Correlation identifier carried by every outbound request.
    RequestId
);

/// A Lua-style set of peripheral IDs (`{ "periph_id": true }`).
pub type PeriphMap = BTreeMap<PeriphId, bool>;

// ── Geometry ────────────────────────────────────────────────────────

/// A position in graph space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    pub fn distance_to(self, other: Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

// ── Slot ────────────────────────────────────────────────────────────

/// A single addressable inventory slot on a peripheral.
///
/// Ordering is `(slot, periph_id)` ascending. That order is the canonical
/// slot order of a group, which the controller uses as item-filter priority.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    pub periph_id: PeriphId,
    pub slot: u32,
}

impl Slot {
    pub fn new(periph_id: impl Into<PeriphId>, slot: u32) -> Self {
        Self {
            periph_id: periph_id.into(),
            slot,
        }
    }
}

impl Ord for Slot {
    fn cmp(&self, other: &Self) -> Ordering {
        self.slot
            .cmp(&other.slot)
            .then_with(|| self.periph_id.cmp(&other.periph_id))
    }
}

impl PartialOrd for Slot {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// ── Group ───────────────────────────────────────────────────────────

/// A group of slots from one or more peripherals, addressable as a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: GroupId,
    pub slots: Vec<Slot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fluid: Option<bool>,
}

impl Group {
    pub fn new(id: impl Into<GroupId>, slots: Vec<Slot>) -> Self {
        Self {
            id: id.into(),
            slots,
            nickname: None,
            x: None,
            y: None,
            fluid: None,
        }
    }

    /// Whether this group moves fluids. An absent flag means items.
    pub fn is_fluid(&self) -> bool {
        self.fluid.unwrap_or(false)
    }

    /// The nickname, treating an empty string as no nickname.
    pub fn name(&self) -> Option<&str> {
        self.nickname.as_deref().filter(|n| !n.is_empty())
    }

    pub fn position(&self) -> Option<Point> {
        Some(Point::new(self.x?, self.y?))
    }
}

/// Partial update of a [`Group`]; absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupEdits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slots: Option<Vec<Slot>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fluid: Option<bool>,
}

// ── Machine ─────────────────────────────────────────────────────────

/// A machine: one or more peripherals whose slots are exposed as groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Machine {
    pub id: MachineId,
    pub groups: Vec<GroupId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
}

impl Machine {
    pub fn new(id: impl Into<MachineId>, groups: Vec<GroupId>) -> Self {
        Self {
            id: id.into(),
            groups,
            nickname: None,
            x: None,
            y: None,
        }
    }

    pub fn position(&self) -> Option<Point> {
        Some(Point::new(self.x?, self.y?))
    }
}

/// Partial update of a [`Machine`]; absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineEdits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<GroupId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
}

// ── Pipe ────────────────────────────────────────────────────────────

/// How a pipe distributes items across the destination group's slots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipeMode {
    #[default]
    Natural,
    Spread,
}

/// A directed transfer edge between two groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pipe {
    pub id: PipeId,
    pub from: GroupId,
    pub to: GroupId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<PipeMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl Pipe {
    pub fn new(id: impl Into<PipeId>, from: impl Into<GroupId>, to: impl Into<GroupId>) -> Self {
        Self {
            id: id.into(),
            from: from.into(),
            to: to.into(),
            mode: None,
            nickname: None,
            filter: None,
        }
    }
}

/// Partial update of a [`Pipe`]; absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipeEdits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<GroupId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<GroupId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<PipeMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl PipeEdits {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

// ── Factory ─────────────────────────────────────────────────────────

/// The full factory graph: pipes, machines, groups, and peripheral presence.
///
/// - Machines own one or more groups (by ID; groups live in `groups`).
/// - Pipes connect groups to transfer items between them.
/// - `missing` peripherals belong to some machine but are disconnected.
/// - `available` peripherals are connected but not part of any machine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Factory {
    #[serde(default)]
    pub pipes: BTreeMap<PipeId, Pipe>,
    #[serde(default)]
    pub machines: BTreeMap<MachineId, Machine>,
    #[serde(default)]
    pub groups: BTreeMap<GroupId, Group>,
    #[serde(default)]
    pub missing: PeriphMap,
    #[serde(default)]
    pub available: PeriphMap,
}

impl Factory {
    pub fn machine(&self, id: &MachineId) -> Option<&Machine> {
        self.machines.get(id)
    }

    pub fn group(&self, id: &GroupId) -> Option<&Group> {
        self.groups.get(id)
    }

    pub fn pipe(&self, id: &PipeId) -> Option<&Pipe> {
        self.pipes.get(id)
    }

    /// Insert a machine, replacing any previous one with the same ID.
    pub fn with_machine(mut self, machine: Machine) -> Self {
        self.machines.insert(machine.id.clone(), machine);
        self
    }

    /// Insert a group, replacing any previous one with the same ID.
    pub fn with_group(mut self, group: Group) -> Self {
        self.groups.insert(group.id.clone(), group);
        self
    }

    /// Insert a pipe, replacing any previous one with the same ID.
    pub fn with_pipe(mut self, pipe: Pipe) -> Self {
        self.pipes.insert(pipe.id.clone(), pipe);
        self
    }

    pub fn is_missing(&self, periph: &PeriphId) -> bool {
        self.missing.get(periph).copied().unwrap_or(false)
    }

    pub fn is_available(&self, periph: &PeriphId) -> bool {
        self.available.get(periph).copied().unwrap_or(false)
    }
}
