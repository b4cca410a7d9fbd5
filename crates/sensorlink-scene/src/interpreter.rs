//! Keystroke command state machine.
//!
//! [`CommandInterpreter`] owns the control mode and the two selection
//! cursors; [`Scene`] owns the objects they point at.  Neither is shared
//! with the network threads: commands arrive here already decoded, through
//! the dispatcher, on the consumer's thread.

use std::fmt;

use sensorlink_types::{Command, Vec3};
use tracing::{debug, info, warn};

use crate::transform::Transform;

/// Distance moved by one translation command.
pub const MOVE_STEP: f32 = 1.0;
/// Angle (degrees) turned by one rotation command.
pub const ROTATE_STEP_DEG: f32 = 45.0;
/// Where a newly selected element is placed.
pub const SELECTION_ANCHOR: Vec3 = Vec3::new(0.0, 3.0, 0.0);
/// Where the rig is sent by [`Command::TeleportRig`].
pub const RIG_TELEPORT_TARGET: Vec3 = Vec3::new(20.0, 20.0, 20.0);

/// A named object with a transform.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneObject {
    pub name: String,
    pub transform: Transform,
}

impl SceneObject {
    pub fn new(name: impl Into<String>, position: Vec3) -> Self {
        Self {
            name: name.into(),
            transform: Transform::at(position),
        }
    }
}

/// The objects the command port can drive.
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub lights: Vec<SceneObject>,
    pub cylinders: Vec<SceneObject>,
    pub rig: SceneObject,
}

impl Scene {
    /// `lights` lights and `cylinders` cylinders laid out on a line, plus a
    /// rig at the origin.
    pub fn with_counts(lights: usize, cylinders: usize) -> Self {
        let row = |prefix: &str, n: usize, z: f32| {
            (0..n)
                .map(|i| SceneObject::new(format!("{prefix}-{i}"), Vec3::new(i as f32 * 2.0, 1.0, z)))
                .collect::<Vec<_>>()
        };
        Self {
            lights: row("light", lights, 5.0),
            cylinders: row("cylinder", cylinders, -5.0),
            rig: SceneObject::new("rig", Vec3::zero()),
        }
    }

    pub fn list(&self, target: ControlTarget) -> &[SceneObject] {
        match target {
            ControlTarget::Lights => &self.lights,
            ControlTarget::Cylinders => &self.cylinders,
        }
    }

    fn list_mut(&mut self, target: ControlTarget) -> &mut Vec<SceneObject> {
        match target {
            ControlTarget::Lights => &mut self.lights,
            ControlTarget::Cylinders => &mut self.cylinders,
        }
    }
}

/// Which list the selection commands act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlTarget {
    Lights,
    Cylinders,
}

impl ControlTarget {
    fn toggled(self) -> Self {
        match self {
            Self::Lights => Self::Cylinders,
            Self::Cylinders => Self::Lights,
        }
    }
}

impl fmt::Display for ControlTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Lights => "lights",
            Self::Cylinders => "cylinders",
        })
    }
}

/// What a single command did to the scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Control switched to the given list.
    Toggled(ControlTarget),
    /// The selected element was translated.
    Moved { index: usize },
    /// The selected element was rotated.
    Rotated { index: usize },
    /// The cursor advanced and the new element was placed at the anchor.
    Cycled { index: usize },
    RigTeleported,
    /// The active list is empty.
    Ignored,
}

/// Control mode plus one selection cursor per list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInterpreter {
    target: ControlTarget,
    light_index: usize,
    cylinder_index: usize,
}

impl Default for CommandInterpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandInterpreter {
    /// Starts controlling lights with both cursors at 0.
    pub fn new() -> Self {
        Self {
            target: ControlTarget::Lights,
            light_index: 0,
            cylinder_index: 0,
        }
    }

    pub fn target(&self) -> ControlTarget {
        self.target
    }

    /// Cursor into the currently active list.
    pub fn selected_index(&self) -> usize {
        match self.target {
            ControlTarget::Lights => self.light_index,
            ControlTarget::Cylinders => self.cylinder_index,
        }
    }

    fn cursor_mut(&mut self) -> &mut usize {
        match self.target {
            ControlTarget::Lights => &mut self.light_index,
            ControlTarget::Cylinders => &mut self.cylinder_index,
        }
    }

    /// Apply one decoded command to `scene`.
    pub fn apply(&mut self, command: Command, scene: &mut Scene) -> CommandOutcome {
        match command {
            Command::ToggleTarget => {
                self.target = self.target.toggled();
                match scene.list_mut(self.target).first_mut() {
                    Some(first) => {
                        first.transform.teleport(SELECTION_ANCHOR);
                        info!(mode = %self.target, object = %first.name, "control switched");
                    }
                    None => warn!(mode = %self.target, "control switched to an empty list"),
                }
                return CommandOutcome::Toggled(self.target);
            }
            Command::TeleportRig => {
                scene.rig.transform.teleport(RIG_TELEPORT_TARGET);
                info!(position = %RIG_TELEPORT_TARGET, "rig teleported");
                return CommandOutcome::RigTeleported;
            }
            _ => {}
        }

        let target = self.target;
        let list = scene.list_mut(target);
        if list.is_empty() {
            warn!(mode = %target, command = ?command, "no objects to control; command ignored");
            return CommandOutcome::Ignored;
        }

        let cursor = self.cursor_mut();
        // The list may have shrunk since the cursor last moved.
        if *cursor >= list.len() {
            *cursor = 0;
        }

        if command == Command::CycleSelection {
            *cursor = (*cursor + 1) % list.len();
            let selected = &mut list[*cursor];
            selected.transform.teleport(SELECTION_ANCHOR);
            info!(mode = %target, index = *cursor, object = %selected.name, "selection cycled");
            return CommandOutcome::Cycled { index: *cursor };
        }

        let index = *cursor;
        let selected = &mut list[index];
        match command {
            Command::Pitch => {
                selected.transform.rotate_local(Vec3::RIGHT * ROTATE_STEP_DEG);
                debug!(object = %selected.name, "pitched");
                CommandOutcome::Rotated { index }
            }
            Command::Yaw => {
                selected.transform.rotate_local(Vec3::UP * ROTATE_STEP_DEG);
                debug!(object = %selected.name, "yawed");
                CommandOutcome::Rotated { index }
            }
            other => match other.translation() {
                Some(direction) => {
                    selected.transform.translate(direction * MOVE_STEP);
                    debug!(object = %selected.name, position = %selected.transform.position, "moved");
                    CommandOutcome::Moved { index }
                }
                None => CommandOutcome::Ignored,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn move_forward_translates_selected_light_along_z() {
        let mut scene = Scene::with_counts(3, 3);
        let mut expected = scene.clone();
        expected.lights[0].transform.position += Vec3::new(0.0, 0.0, 1.0);
        let mut interp = CommandInterpreter::new();

        assert_eq!(interp.apply(Command::MoveForward, &mut scene), CommandOutcome::Moved { index: 0 });
        // Nothing else moved, rotated or was re-anchored.
        assert_eq!(scene, expected);
    }

    #[test]
    fn every_axis_has_the_expected_direction() {
        let cases = [
            (Command::MoveForward, Vec3::new(0.0, 0.0, 1.0)),
            (Command::MoveBack, Vec3::new(0.0, 0.0, -1.0)),
            (Command::MoveLeft, Vec3::new(-1.0, 0.0, 0.0)),
            (Command::MoveRight, Vec3::new(1.0, 0.0, 0.0)),
            (Command::MoveUp, Vec3::new(0.0, 1.0, 0.0)),
            (Command::MoveDown, Vec3::new(0.0, -1.0, 0.0)),
        ];
        for (command, delta) in cases {
            let mut scene = Scene::with_counts(1, 0);
            let before = scene.lights[0].transform.position;
            CommandInterpreter::new().apply(command, &mut scene);
            assert_eq!(scene.lights[0].transform.position, before + delta, "{command:?}");
        }
    }

    #[test]
    fn cycling_n_times_returns_to_start_and_anchors_each_pick() {
        let mut scene = Scene::with_counts(4, 2);
        let mut interp = CommandInterpreter::new();

        for step in 1..=4 {
            let outcome = interp.apply(Command::CycleSelection, &mut scene);
            let index = step % 4;
            assert_eq!(outcome, CommandOutcome::Cycled { index });
            assert_eq!(scene.lights[index].transform.position, SELECTION_ANCHOR);
        }
        assert_eq!(interp.selected_index(), 0);
    }

    #[test]
    fn toggle_switches_list_and_anchors_first_element() {
        let mut scene = Scene::with_counts(2, 2);
        let mut interp = CommandInterpreter::new();

        assert_eq!(
            interp.apply(Command::ToggleTarget, &mut scene),
            CommandOutcome::Toggled(ControlTarget::Cylinders)
        );
        assert_eq!(scene.cylinders[0].transform.position, SELECTION_ANCHOR);

        // Cursors are independent per list.
        interp.apply(Command::CycleSelection, &mut scene);
        interp.apply(Command::ToggleTarget, &mut scene);
        assert_eq!(interp.target(), ControlTarget::Lights);
        assert_eq!(interp.selected_index(), 0);
    }

    #[test]
    fn empty_list_ignores_everything_but_toggle_and_rig() {
        let mut scene = Scene::with_counts(0, 1);
        let mut interp = CommandInterpreter::new();

        for command in [Command::MoveUp, Command::Pitch, Command::CycleSelection] {
            assert_eq!(interp.apply(command, &mut scene), CommandOutcome::Ignored);
        }
        assert_eq!(interp.apply(Command::TeleportRig, &mut scene), CommandOutcome::RigTeleported);
        assert_eq!(scene.rig.transform.position, RIG_TELEPORT_TARGET);
        assert_eq!(
            interp.apply(Command::ToggleTarget, &mut scene),
            CommandOutcome::Toggled(ControlTarget::Cylinders)
        );
    }

    #[test]
    fn rotation_leaves_position_alone() {
        let mut scene = Scene::with_counts(1, 0);
        let before = scene.lights[0].transform;
        let mut interp = CommandInterpreter::new();

        assert_eq!(interp.apply(Command::Yaw, &mut scene), CommandOutcome::Rotated { index: 0 });
        let after = scene.lights[0].transform;
        assert_eq!(after.position, before.position);
        assert_ne!(after.rotation, before.rotation);
    }

    #[test]
    fn cursor_recovers_when_list_shrinks() {
        let mut scene = Scene::with_counts(3, 0);
        let mut interp = CommandInterpreter::new();
        interp.apply(Command::CycleSelection, &mut scene);
        interp.apply(Command::CycleSelection, &mut scene);
        scene.lights.truncate(1);

        assert_eq!(interp.apply(Command::MoveUp, &mut scene), CommandOutcome::Moved { index: 0 });
    }
}
