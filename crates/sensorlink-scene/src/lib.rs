//! `sensorlink-scene` – Consumer-side state
//!
//! Everything here is owned by the tick thread and mutated only from
//! dispatcher drains or the fixed-rate step.
//!
//! - [`transform`] – quaternion rotations and object transforms.
//! - [`interpreter`] – [`CommandInterpreter`]: keystroke commands over a
//!   [`Scene`] of lights, cylinders and a rig.
//! - [`handoff`] – [`HandoffFile`]: the six-line sensor mailbox.
//! - [`physics`] – [`RigidBody`] sink, [`SimRigidBody`] and the
//!   [`PhysicsGrabbable`] impulse logic.
//! - [`world`] – [`World`]: the ingest target wiring it all together.

pub mod handoff;
pub mod interpreter;
pub mod physics;
pub mod transform;
pub mod world;

pub use handoff::HandoffFile;
pub use interpreter::{CommandInterpreter, CommandOutcome, ControlTarget, Scene, SceneObject};
pub use physics::{PhysicsGrabbable, PointerEvent, RigidBody, SimRigidBody, VelocityReport};
pub use transform::{Quaternion, Transform};
pub use world::{HudPanel, World};
