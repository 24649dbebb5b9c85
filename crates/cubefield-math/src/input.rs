// SPDX-License-Identifier: CEPL-1.0
use glam::Vec3;

use crate::Camera;

pub const FOV_MIN: f32 = 1.0;
pub const FOV_MAX: f32 = 45.0;
pub const PITCH_LIMIT: f32 = 89.0;

/// Mouse-look and zoom state owned by the event handler.
///
/// The handler is the only writer of the camera; the renderer reads it.
#[derive(Clone, Debug)]
pub struct InputState {
    pub yaw: f32,
    pub pitch: f32,
    pub sensitivity: f32,
    last_x: f32,
    last_y: f32,
    first_event: bool,
}

impl InputState {
    /// `cursor_origin` is where the cursor is assumed to start (usually the window center).
    pub fn new(cursor_origin: (f32, f32)) -> Self {
        Self {
            yaw: -90.0,
            pitch: 0.0,
            sensitivity: 0.1,
            last_x: cursor_origin.0,
            last_y: cursor_origin.1,
            first_event: true,
        }
    }

    /// Applies a cursor position and recomputes `camera.front`.
    pub fn cursor_moved(&mut self, camera: &mut Camera, x: f32, y: f32) {
        if self.first_event {
            self.last_x = x;
            self.last_y = y;
            self.first_event = false;
        }

        let dx = (x - self.last_x) * self.sensitivity;
        // window y grows downwards
        let dy = (self.last_y - y) * self.sensitivity;
        self.last_x = x;
        self.last_y = y;

        self.yaw += dx;
        self.pitch = (self.pitch + dy).clamp(-PITCH_LIMIT, PITCH_LIMIT);

        let (yaw, pitch) = (self.yaw.to_radians(), self.pitch.to_radians());
        camera.front = Vec3::new(yaw.cos() * pitch.cos(), pitch.sin(), yaw.sin() * pitch.cos())
            .normalize();
    }

    /// Scroll zoom: positive `y_offset` narrows the field of view.
    pub fn scrolled(&mut self, camera: &mut Camera, y_offset: f32) {
        camera.fov = (camera.fov - y_offset).clamp(FOV_MIN, FOV_MAX);
    }
}

impl Default for InputState {
    fn default() -> Self {
        Self::new((640.0, 360.0))
    }
}
