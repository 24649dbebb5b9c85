// SPDX-License-Identifier: CEPL-1.0
//! Camera state and the input rules that mutate it.
mod camera;
mod input;

pub use camera::{Camera, FAR_PLANE, NEAR_PLANE};
pub use glam;
pub use input::{InputState, FOV_MAX, FOV_MIN, PITCH_LIMIT};
