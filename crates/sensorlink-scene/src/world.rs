//! [`World`] – everything the consumer thread owns.
//!
//! The ingestion service only ever reaches the world through dispatcher
//! closures, so every method here runs on the tick thread.

use sensorlink_middleware::IngestTarget;
use sensorlink_types::{Command, SensorRecord, VelocityPair};
use tracing::{debug, error, warn};

use crate::handoff::HandoffFile;
use crate::interpreter::{CommandInterpreter, CommandOutcome, Scene};
use crate::physics::{PhysicsGrabbable, PointerEvent, RigidBody, SimRigidBody};

/// Font size the HUD panel is created with.
pub const HUD_FONT_SIZE: f32 = 24.0;

/// On-screen text showing the latest sensor velocities.
#[derive(Debug, Clone, PartialEq)]
pub struct HudPanel {
    pub text: String,
    pub font_size: f32,
}

impl Default for HudPanel {
    fn default() -> Self {
        Self {
            text: String::new(),
            font_size: HUD_FONT_SIZE,
        }
    }
}

impl HudPanel {
    pub fn show(&mut self, velocities: VelocityPair) {
        let [vx, vy, vz, ax, ay, az] = velocities.to_array();
        self.font_size = HUD_FONT_SIZE;
        self.text = format!("VX: {vx:.2}\nVY: {vy:.2}\nVZ: {vz:.2}\nAX: {ax:.2}\nAY: {ay:.2}\nAZ: {az:.2}");
    }
}

pub struct World<B: RigidBody = SimRigidBody> {
    pub scene: Scene,
    pub interpreter: CommandInterpreter,
    pub hud: Option<HudPanel>,
    pub grabbable: PhysicsGrabbable<B>,
    handoff: HandoffFile,
}

impl<B: RigidBody> World<B> {
    /// `handoff` is where sensor records are written; the grabbable should
    /// read from the same path.
    pub fn new(scene: Scene, handoff: HandoffFile, grabbable: PhysicsGrabbable<B>) -> Self {
        Self {
            scene,
            interpreter: CommandInterpreter::new(),
            hud: Some(HudPanel::default()),
            grabbable,
            handoff,
        }
    }

    pub fn without_hud(mut self) -> Self {
        self.hud = None;
        self
    }

    /// Forward a grab-source event.  Returns `true` when it released the
    /// object; velocities are left to the next sensor-driven apply.
    pub fn pointer_event(&mut self, event: PointerEvent, selecting_points: usize) -> bool {
        self.grabbable.handle_pointer_event(event, selecting_points)
    }

    /// One fixed-rate physics step.
    pub fn fixed_update(&mut self) -> Option<VelocityPair> {
        self.grabbable.fixed_update()
    }
}

impl World<SimRigidBody> {
    /// Fixed step followed by integrating the simulated body over `dt`.
    pub fn step(&mut self, dt: f32) -> Option<VelocityPair> {
        let applied = self.fixed_update();
        self.grabbable.body_mut().step(dt);
        applied
    }
}

impl<B: RigidBody + 'static> IngestTarget for World<B> {
    fn apply_sensor(&mut self, record: SensorRecord) {
        let velocities = record.velocities();
        debug!(latency_ms = record.age().num_milliseconds(), "sensor record received");
        if let Err(e) = self.handoff.write(velocities) {
            error!(error = %e, "failed to write handoff record");
        }
        match &mut self.hud {
            Some(hud) => hud.show(velocities),
            None => warn!("no HUD panel; sensor values not displayed"),
        }
    }

    fn apply_command(&mut self, command: Command) {
        if self.interpreter.apply(command, &mut self.scene) == CommandOutcome::Ignored {
            warn!(command = ?command, "command had no effect");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensorlink_middleware::{IngestionConfig, IngestionService, MainThreadDispatcher};
    use sensorlink_types::Vec3;
    use std::io::Write;
    use std::net::{Ipv4Addr, TcpStream};
    use std::thread;
    use std::time::{Duration, Instant};

    fn world() -> (tempfile::TempDir, World) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("SensorData.txt");
        let grabbable = PhysicsGrabbable::new(
            "cube",
            SimRigidBody::new(Vec3::zero(), 1.0),
            HandoffFile::new(&path),
        );
        let world = World::new(Scene::with_counts(2, 2), HandoffFile::new(&path), grabbable);
        (dir, world)
    }

    #[test]
    fn sensor_record_updates_hud_and_handoff() {
        let (_dir, mut world) = world();
        world.apply_sensor(SensorRecord::from_fields([1.0, 2.0, 3.0, 4.0, 5.0, 6.0]));

        let hud = world.hud.as_ref().unwrap();
        assert_eq!(hud.font_size, 24.0);
        assert_eq!(hud.text, "VX: 3.00\nVY: 2.00\nVZ: 1.00\nAX: 4.00\nAY: 5.00\nAZ: 6.00");

        let applied = world.grabbable.apply_velocities();
        assert_eq!(applied.to_array(), [3.0, 2.0, 1.0, 4.0, 5.0, 6.0]);
        // No new record: the same velocities are applied again.
        assert_eq!(world.grabbable.apply_velocities(), applied);
    }

    #[test]
    fn missing_hud_is_tolerated() {
        let (_dir, world) = world();
        let mut world = world.without_hud();
        world.apply_sensor(SensorRecord::from_fields([0.0; 6]));
        assert!(world.hud.is_none());
    }

    #[test]
    fn commands_through_dispatcher_move_the_scene() {
        let (_dir, mut world) = world();
        let dispatcher = MainThreadDispatcher::<World>::new();
        let handle = dispatcher.handle();
        let start = world.scene.lights[0].transform.position;

        for command in [Command::MoveForward, Command::MoveForward, Command::TeleportRig] {
            handle.enqueue(move |w: &mut World| w.apply_command(command));
        }
        assert_eq!(dispatcher.drain(&mut world), 3);
        assert_eq!(world.scene.lights[0].transform.position, start + Vec3::new(0.0, 0.0, 2.0));
        assert_eq!(world.scene.rig.transform.position, Vec3::new(20.0, 20.0, 20.0));
    }

    #[test]
    fn release_does_not_change_velocity() {
        let (_dir, mut world) = world();
        world.grabbable.body_mut().velocity = Vec3::new(0.0, -3.0, 0.0);

        assert!(!world.pointer_event(PointerEvent::Select, 1));
        assert!(world.pointer_event(PointerEvent::Unselect, 0));

        assert_eq!(world.step(0.5), None);
        assert_eq!(world.grabbable.body().velocity, Vec3::new(0.0, -3.0, 0.0));
        assert_eq!(world.grabbable.body().position, Vec3::new(0.0, -1.5, 0.0));
    }

    #[test]
    fn forward_keystroke_over_tcp_moves_only_first_light() {
        let (_dir, mut world) = world();
        let mut expected = world.scene.clone();
        expected.lights[0].transform.position += Vec3::FORWARD;

        let dispatcher = MainThreadDispatcher::<World>::new();
        let config = IngestionConfig {
            bind_address: Ipv4Addr::LOCALHOST.into(),
            sensor_port: 0,
            command_port: 0,
            ..IngestionConfig::default()
        };
        let mut service = IngestionService::new(config, dispatcher.handle());
        service.start_all().unwrap();

        let mut stream = TcpStream::connect(service.command_addr().unwrap()).unwrap();
        stream.write_all(b"\x00\x00\x00W\n").unwrap();

        let deadline = Instant::now() + Duration::from_secs(3);
        let mut drained = 0;
        while drained == 0 && Instant::now() < deadline {
            drained = dispatcher.drain(&mut world);
            thread::sleep(Duration::from_millis(5));
        }
        service.stop_all();

        assert_eq!(drained, 1);
        assert_eq!(world.scene, expected);
        assert_eq!(world.interpreter.selected_index(), 0);
    }
}
