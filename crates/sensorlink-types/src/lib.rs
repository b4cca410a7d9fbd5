//! `sensorlink-types` – shared vocabulary of the SensorLink workspace.
//!
//! Every crate in the workspace speaks in terms of these types: the raw
//! [`SensorRecord`] decoded from the sensor port, the remapped
//! [`VelocityPair`] handed to physics, the [`Command`] alphabet of the
//! keyboard port, and the workspace-wide [`LinkError`].

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::ops::{Add, AddAssign, Mul};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

// ────────────────────────────────────────────────────────────────────────────
// Vec3
// ────────────────────────────────────────────────────────────────────────────

/// A 3-D vector in a left-handed, Y-up frame (forward is `+Z`).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const FORWARD: Vec3 = Vec3::new(0.0, 0.0, 1.0);
    pub const BACK: Vec3 = Vec3::new(0.0, 0.0, -1.0);
    pub const LEFT: Vec3 = Vec3::new(-1.0, 0.0, 0.0);
    pub const RIGHT: Vec3 = Vec3::new(1.0, 0.0, 0.0);
    pub const UP: Vec3 = Vec3::new(0.0, 1.0, 0.0);
    pub const DOWN: Vec3 = Vec3::new(0.0, -1.0, 0.0);

    /// Create a new vector.
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// The zero vector.
    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    /// Product of the three components, i.e. the volume of a box with these
    /// extents.
    pub fn volume(self) -> f32 {
        self.x * self.y * self.z
    }

    /// Euclidean length.
    pub fn length(self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

impl Add for Vec3 {
    type Output = Vec3;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl AddAssign for Vec3 {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Mul<f32> for Vec3 {
    type Output = Vec3;

    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl fmt::Display for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2}, {:.2})", self.x, self.y, self.z)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Sensor records
// ────────────────────────────────────────────────────────────────────────────

/// One decoded message from the sensor port, with its six fields in the
/// order the sender produced them.
///
/// The wire format is a JSON object with the field names below.  Each value
/// may be a JSON number or a numeric string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorRecord {
    #[serde(rename = "VelocidadX", deserialize_with = "lenient_f32")]
    pub velocity_x: f32,
    #[serde(rename = "VelocidadY", deserialize_with = "lenient_f32")]
    pub velocity_y: f32,
    #[serde(rename = "VelocidadZ", deserialize_with = "lenient_f32")]
    pub velocity_z: f32,
    #[serde(rename = "AngularX", deserialize_with = "lenient_f32")]
    pub angular_x: f32,
    #[serde(rename = "AngularY", deserialize_with = "lenient_f32")]
    pub angular_y: f32,
    #[serde(rename = "AngularZ", deserialize_with = "lenient_f32")]
    pub angular_z: f32,
    /// Local receipt time; never part of the wire format.
    #[serde(skip, default = "Utc::now")]
    pub received_at: DateTime<Utc>,
}

impl SensorRecord {
    /// Build a record from the six fields in received order.
    pub fn from_fields(fields: [f32; 6]) -> Self {
        let [velocity_x, velocity_y, velocity_z, angular_x, angular_y, angular_z] = fields;
        Self {
            velocity_x,
            velocity_y,
            velocity_z,
            angular_x,
            angular_y,
            angular_z,
            received_at: Utc::now(),
        }
    }

    /// Time elapsed since the record was decoded.
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.received_at
    }

    /// The six fields in received order.
    pub fn fields(&self) -> [f32; 6] {
        [
            self.velocity_x,
            self.velocity_y,
            self.velocity_z,
            self.angular_x,
            self.angular_y,
            self.angular_z,
        ]
    }

    /// Remap the record into the consumer's frame.
    ///
    /// The sender's X and Z linear axes are swapped; angular axes pass
    /// through unchanged.
    pub fn velocities(&self) -> VelocityPair {
        VelocityPair {
            linear: Vec3::new(self.velocity_z, self.velocity_y, self.velocity_x),
            angular: Vec3::new(self.angular_x, self.angular_y, self.angular_z),
        }
    }
}

/// Linear and angular velocity, already remapped into the consumer's frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VelocityPair {
    pub linear: Vec3,
    pub angular: Vec3,
}

impl VelocityPair {
    pub fn new(linear: Vec3, angular: Vec3) -> Self {
        Self { linear, angular }
    }

    /// The six components in handoff order:
    /// linear x/y/z followed by angular x/y/z.
    pub fn to_array(self) -> [f32; 6] {
        [
            self.linear.x,
            self.linear.y,
            self.linear.z,
            self.angular.x,
            self.angular.y,
            self.angular.z,
        ]
    }

    /// Inverse of [`VelocityPair::to_array`].
    pub fn from_array(values: [f32; 6]) -> Self {
        Self {
            linear: Vec3::new(values[0], values[1], values[2]),
            angular: Vec3::new(values[3], values[4], values[5]),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(f32),
    Text(String),
}

fn lenient_f32<'de, D>(deserializer: D) -> Result<f32, D::Error>
where
    D: Deserializer<'de>,
{
    match NumberOrText::deserialize(deserializer)? {
        NumberOrText::Number(n) => Ok(n),
        NumberOrText::Text(s) => s
            .trim()
            .parse::<f32>()
            .map_err(|e| serde::de::Error::custom(format!("invalid number {s:?}: {e}"))),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Keyboard commands
// ────────────────────────────────────────────────────────────────────────────

/// The control alphabet accepted on the command port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    /// `W` – one unit along `+Z`.
    MoveForward,
    /// `A` – one unit along `-X`.
    MoveLeft,
    /// `S` – one unit along `-Z`.
    MoveBack,
    /// `D` – one unit along `+X`.
    MoveRight,
    /// `T` – one unit along `+Y`.
    MoveUp,
    /// `G` – one unit along `-Y`.
    MoveDown,
    /// `N` – rotate about the local X axis.
    Pitch,
    /// `M` – rotate about the local Y axis.
    Yaw,
    /// `U` – switch between the light list and the cylinder list.
    ToggleTarget,
    /// `O` – advance the selection cursor of the active list.
    CycleSelection,
    /// `E` – teleport the rig to its fixed position.
    TeleportRig,
}

impl Command {
    /// Map a command character (case-insensitive) to its [`Command`].
    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'W' => Some(Self::MoveForward),
            'A' => Some(Self::MoveLeft),
            'S' => Some(Self::MoveBack),
            'D' => Some(Self::MoveRight),
            'T' => Some(Self::MoveUp),
            'G' => Some(Self::MoveDown),
            'N' => Some(Self::Pitch),
            'M' => Some(Self::Yaw),
            'U' => Some(Self::ToggleTarget),
            'O' => Some(Self::CycleSelection),
            'E' => Some(Self::TeleportRig),
            _ => None,
        }
    }

    /// The canonical upper-case character for this command.
    pub fn as_char(self) -> char {
        match self {
            Self::MoveForward => 'W',
            Self::MoveLeft => 'A',
            Self::MoveBack => 'S',
            Self::MoveRight => 'D',
            Self::MoveUp => 'T',
            Self::MoveDown => 'G',
            Self::Pitch => 'N',
            Self::Yaw => 'M',
            Self::ToggleTarget => 'U',
            Self::CycleSelection => 'O',
            Self::TeleportRig => 'E',
        }
    }

    /// Unit translation applied by a movement command, if this is one.
    pub fn translation(self) -> Option<Vec3> {
        match self {
            Self::MoveForward => Some(Vec3::FORWARD),
            Self::MoveLeft => Some(Vec3::LEFT),
            Self::MoveBack => Some(Vec3::BACK),
            Self::MoveRight => Some(Vec3::RIGHT),
            Self::MoveUp => Some(Vec3::UP),
            Self::MoveDown => Some(Vec3::DOWN),
            _ => None,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Workspace-wide error type covering socket lifecycle, payload decoding and
/// the handoff mailbox.
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("failed to bind {role} listener on {addr}: {source}")]
    Bind {
        role: String,
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to spawn worker thread {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("ingestion service is already running")]
    AlreadyRunning,

    #[error("malformed sensor record: {0}")]
    MalformedSensor(String),

    #[error("command line too short: {len} byte(s), need at least 4")]
    CommandTooShort { len: usize },

    #[error("unknown command character {0:?}")]
    UnknownCommand(char),

    #[error("handoff file {}: {source}", path.display())]
    Handoff {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed handoff record: {0}")]
    HandoffParse(String),

    #[error("notifier error: {0}")]
    Notifier(String),
}
