//! Rigid bodies and the grabbable that feeds sensor velocities into them.
//!
//! [`RigidBody`] is the sink contract: a body that can be made kinematic,
//! carries a mass, and accepts instantaneous velocity changes.
//! [`SimRigidBody`] is the in-process implementation used by the headless
//! host and the tests.
//!
//! [`PhysicsGrabbable`] wraps a body and implements the two-phase impulse:
//! [`PhysicsGrabbable::apply_velocities`] resolves the velocities and marks
//! them pending; the next [`PhysicsGrabbable::fixed_update`] applies them
//! exactly once.  The velocities always come from the handoff file: a fresh
//! record replaces the stored default, and without one the last record read
//! (zero initially) is applied again.

use std::fmt;

use sensorlink_middleware::NotifierHandle;
use sensorlink_types::{Vec3, VelocityPair};
use tracing::{debug, error, info};

use crate::handoff::HandoffFile;

// ────────────────────────────────────────────────────────────────────────────
// RigidBody
// ────────────────────────────────────────────────────────────────────────────

pub trait RigidBody {
    fn position(&self) -> Vec3;
    fn local_scale(&self) -> Vec3;
    fn is_kinematic(&self) -> bool;
    fn set_kinematic(&mut self, kinematic: bool);
    fn mass(&self) -> f32;
    fn set_mass(&mut self, mass: f32);
    fn velocity(&self) -> Vec3;
    fn angular_velocity(&self) -> Vec3;
    /// Change both velocities instantly, independent of mass.
    fn add_velocity_change(&mut self, linear: Vec3, angular: Vec3);
}

/// Point-mass body with explicit Euler integration.
#[derive(Debug, Clone, PartialEq)]
pub struct SimRigidBody {
    pub position: Vec3,
    pub scale: Vec3,
    pub velocity: Vec3,
    pub angular_velocity: Vec3,
    pub mass: f32,
    pub kinematic: bool,
}

impl SimRigidBody {
    pub fn new(position: Vec3, mass: f32) -> Self {
        Self {
            position,
            scale: Vec3::new(1.0, 1.0, 1.0),
            velocity: Vec3::zero(),
            angular_velocity: Vec3::zero(),
            mass,
            kinematic: false,
        }
    }

    /// Advance position by `dt` seconds.  Kinematic bodies do not move.
    pub fn step(&mut self, dt: f32) {
        if !self.kinematic {
            self.position += self.velocity * dt;
        }
    }
}

impl RigidBody for SimRigidBody {
    fn position(&self) -> Vec3 {
        self.position
    }

    fn local_scale(&self) -> Vec3 {
        self.scale
    }

    fn is_kinematic(&self) -> bool {
        self.kinematic
    }

    fn set_kinematic(&mut self, kinematic: bool) {
        self.kinematic = kinematic;
    }

    fn mass(&self) -> f32 {
        self.mass
    }

    fn set_mass(&mut self, mass: f32) {
        self.mass = mass;
    }

    fn velocity(&self) -> Vec3 {
        self.velocity
    }

    fn angular_velocity(&self) -> Vec3 {
        self.angular_velocity
    }

    fn add_velocity_change(&mut self, linear: Vec3, angular: Vec3) {
        if self.kinematic {
            return;
        }
        self.velocity += linear;
        self.angular_velocity += angular;
    }
}

// ────────────────────────────────────────────────────────────────────────────
// PhysicsGrabbable
// ────────────────────────────────────────────────────────────────────────────

/// Pointer interaction reported by the grab source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerEvent {
    Select,
    Unselect,
}

type VelocityListener = Box<dyn FnMut(&VelocityPair)>;

/// A body that can be grabbed, released and pushed by sensor velocities.
pub struct PhysicsGrabbable<B: RigidBody> {
    name: String,
    body: B,
    handoff: HandoffFile,
    notifier: Option<NotifierHandle>,
    scale_mass_with_size: bool,
    being_transformed: bool,
    saved_kinematic: bool,
    initial_scale: Vec3,
    default_velocities: VelocityPair,
    pending: Option<VelocityPair>,
    listeners: Vec<VelocityListener>,
}

impl<B: RigidBody> PhysicsGrabbable<B> {
    pub fn new(name: impl Into<String>, body: B, handoff: HandoffFile) -> Self {
        Self {
            name: name.into(),
            body,
            handoff,
            notifier: None,
            scale_mass_with_size: true,
            being_transformed: false,
            saved_kinematic: false,
            initial_scale: Vec3::zero(),
            default_velocities: VelocityPair::default(),
            pending: None,
            listeners: Vec::new(),
        }
    }

    /// Send a report line to `notifier` every time velocities are resolved.
    pub fn with_notifier(mut self, notifier: NotifierHandle) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_mass_scaling(mut self, enabled: bool) -> Self {
        self.scale_mass_with_size = enabled;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn body(&self) -> &B {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut B {
        &mut self.body
    }

    pub fn is_grabbed(&self) -> bool {
        self.being_transformed
    }

    pub fn pending(&self) -> Option<VelocityPair> {
        self.pending
    }

    /// Velocities the next [`apply_velocities`][Self::apply_velocities] falls
    /// back to when the handoff file has no fresh record.
    pub fn default_velocities(&self) -> VelocityPair {
        self.default_velocities
    }

    /// Subscribe to impulses applied by [`fixed_update`][Self::fixed_update].
    pub fn on_velocities_applied(&mut self, listener: impl FnMut(&VelocityPair) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// React to a grab source.  `selecting_points` is the number of pointers
    /// holding the object after the event.
    ///
    /// Returns `true` when the event released the object.
    pub fn handle_pointer_event(&mut self, event: PointerEvent, selecting_points: usize) -> bool {
        match event {
            PointerEvent::Select if selecting_points == 1 && !self.being_transformed => {
                self.disable_physics();
                false
            }
            PointerEvent::Unselect if selecting_points == 0 && self.being_transformed => {
                self.reenable_physics();
                true
            }
            _ => false,
        }
    }

    fn disable_physics(&mut self) {
        self.being_transformed = true;
        self.saved_kinematic = self.body.is_kinematic();
        self.initial_scale = self.body.local_scale();
        self.body.set_kinematic(true);
        debug!(object = %self.name, "grabbed; physics disabled");
    }

    fn reenable_physics(&mut self) {
        self.being_transformed = false;
        if self.scale_mass_with_size {
            let initial = self.initial_scale.volume();
            if initial.abs() > f32::EPSILON {
                let factor = self.body.local_scale().volume() / initial;
                self.body.set_mass(self.body.mass() * factor);
            }
        }
        self.body.set_kinematic(self.saved_kinematic);
        debug!(object = %self.name, mass = self.body.mass(), "released; physics restored");
    }

    /// Resolve the velocities to apply on the next fixed step.
    ///
    /// A record in the handoff file becomes the new default; otherwise the
    /// current default is reused.  The file is cleared either way.
    pub fn apply_velocities(&mut self) -> VelocityPair {
        match self.handoff.take() {
            Ok(Some(record)) => self.default_velocities = record,
            Ok(None) => {}
            Err(e) => error!(error = %e, "handoff record unreadable; reusing last velocities"),
        }
        let velocities = self.default_velocities;

        let report = VelocityReport {
            name: &self.name,
            position: self.body.position(),
            velocities,
        };
        info!(%report, "velocities pending");
        if let Some(notifier) = &self.notifier {
            notifier.notify(report.to_string());
        }

        self.pending = Some(velocities);
        velocities
    }

    /// Apply the pending impulse, if any.  Returns what was applied.
    pub fn fixed_update(&mut self) -> Option<VelocityPair> {
        let velocities = self.pending.take()?;
        self.body.add_velocity_change(velocities.linear, velocities.angular);
        for listener in &mut self.listeners {
            listener(&velocities);
        }
        Some(velocities)
    }
}

impl<B: RigidBody + fmt::Debug> fmt::Debug for PhysicsGrabbable<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhysicsGrabbable")
            .field("name", &self.name)
            .field("body", &self.body)
            .field("being_transformed", &self.being_transformed)
            .field("pending", &self.pending)
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

/// The one-line outbound report for a resolved impulse.
pub struct VelocityReport<'a> {
    pub name: &'a str,
    pub position: Vec3,
    pub velocities: VelocityPair,
}

impl fmt::Display for VelocityReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Id:({}), Position: {}, LinearVelocity: {}, AngularVelocity: {}",
            self.name, self.position, self.velocities.linear, self.velocities.angular
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn grabbable() -> (tempfile::TempDir, PhysicsGrabbable<SimRigidBody>) {
        let dir = tempfile::tempdir().unwrap();
        let handoff = HandoffFile::new(dir.path().join("SensorData.txt"));
        let g = PhysicsGrabbable::new("cube", SimRigidBody::new(Vec3::new(1.0, 2.0, 3.0), 2.0), handoff);
        (dir, g)
    }

    #[test]
    fn impulse_is_deferred_to_fixed_update_and_applied_once() {
        let (_dir, mut g) = grabbable();
        let linear = Vec3::new(1.0, 0.0, 0.0);
        let angular = Vec3::new(0.0, 0.5, 0.0);
        g.handoff.write(VelocityPair::new(linear, angular)).unwrap();

        g.apply_velocities();
        assert_eq!(g.body().velocity, Vec3::zero(), "nothing applied before the tick");

        assert_eq!(g.fixed_update(), Some(VelocityPair::new(linear, angular)));
        assert_eq!(g.body().velocity, linear);
        assert_eq!(g.body().angular_velocity, angular);

        assert_eq!(g.fixed_update(), None);
        assert_eq!(g.body().velocity, linear);
    }

    #[test]
    fn first_apply_without_record_is_zero() {
        let (_dir, mut g) = grabbable();
        assert_eq!(g.apply_velocities(), VelocityPair::default());
        assert_eq!(g.fixed_update(), Some(VelocityPair::default()));
        assert_eq!(g.body().velocity, Vec3::zero());
    }

    #[test]
    fn second_apply_without_new_record_reuses_the_last_one() {
        let (_dir, mut g) = grabbable();
        let record = VelocityPair::new(Vec3::new(3.0, 2.0, 1.0), Vec3::new(4.0, 5.0, 6.0));
        g.handoff.write(record).unwrap();

        assert_eq!(g.apply_velocities(), record);
        assert!(g.handoff.take().unwrap().is_none(), "record consumed");
        assert_eq!(g.apply_velocities(), record);
        assert_eq!(g.default_velocities(), record);

        let next = VelocityPair::new(Vec3::UP, Vec3::zero());
        g.handoff.write(next).unwrap();
        assert_eq!(g.apply_velocities(), next);
    }

    #[test]
    fn unreadable_record_keeps_previous_default() {
        let (dir, mut g) = grabbable();
        let record = VelocityPair::new(Vec3::new(1.0, 1.0, 1.0), Vec3::zero());
        g.handoff.write(record).unwrap();
        g.apply_velocities();

        std::fs::write(dir.path().join("SensorData.txt"), "a\nb\nc\nd\ne\nf\n").unwrap();
        assert_eq!(g.apply_velocities(), record);
        assert!(g.handoff.take().unwrap().is_none(), "corrupt record truncated");
    }

    #[test]
    fn listeners_fire_with_applied_velocities() {
        let (_dir, mut g) = grabbable();
        let seen = Rc::new(RefCell::new(Vec::new()));
        for _ in 0..2 {
            let seen = Rc::clone(&seen);
            g.on_velocities_applied(move |v| seen.borrow_mut().push(*v));
        }

        g.handoff.write(VelocityPair::new(Vec3::UP, Vec3::zero())).unwrap();
        g.apply_velocities();
        g.fixed_update();
        assert_eq!(*seen.borrow(), vec![VelocityPair::new(Vec3::UP, Vec3::zero()); 2]);
    }

    #[test]
    fn grab_makes_kinematic_and_release_restores_with_scaled_mass() {
        let (_dir, mut g) = grabbable();
        assert!(!g.handle_pointer_event(PointerEvent::Select, 1));
        assert!(g.is_grabbed());
        assert!(g.body().kinematic);

        // A second pointer joining does not re-cache state.
        g.handle_pointer_event(PointerEvent::Select, 2);
        g.body_mut().scale = Vec3::new(2.0, 1.0, 1.0);
        assert!(!g.handle_pointer_event(PointerEvent::Unselect, 1));
        assert!(g.is_grabbed());

        assert!(g.handle_pointer_event(PointerEvent::Unselect, 0));
        assert!(!g.body().kinematic);
        assert!((g.body().mass - 4.0).abs() < 1e-6);
    }

    #[test]
    fn release_without_grab_is_ignored() {
        let (_dir, mut g) = grabbable();
        assert!(!g.handle_pointer_event(PointerEvent::Unselect, 0));
        assert_eq!(g.body().mass, 2.0);
    }

    #[test]
    fn mass_scaling_can_be_disabled() {
        let (_dir, g) = grabbable();
        let mut g = g.with_mass_scaling(false);
        g.handle_pointer_event(PointerEvent::Select, 1);
        g.body_mut().scale = Vec3::new(3.0, 3.0, 3.0);
        g.handle_pointer_event(PointerEvent::Unselect, 0);
        assert_eq!(g.body().mass, 2.0);
    }

    #[test]
    fn kinematic_body_ignores_velocity_change() {
        let mut body = SimRigidBody::new(Vec3::zero(), 1.0);
        body.kinematic = true;
        body.add_velocity_change(Vec3::UP, Vec3::UP);
        body.step(1.0);
        assert_eq!(body.velocity, Vec3::zero());
        assert_eq!(body.position, Vec3::zero());
    }

    #[test]
    fn report_line_format() {
        let report = VelocityReport {
            name: "cube",
            position: Vec3::new(1.0, 2.0, 3.0),
            velocities: VelocityPair::new(Vec3::new(0.5, 0.0, -1.0), Vec3::new(0.0, 0.25, 0.0)),
        };
        assert_eq!(
            report.to_string(),
            "Id:(cube), Position: (1.00, 2.00, 3.00), LinearVelocity: (0.50, 0.00, -1.00), AngularVelocity: (0.00, 0.25, 0.00)"
        );
    }
}
