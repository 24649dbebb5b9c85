// SPDX-License-Identifier: CEPL-1.0
//! Window-side glue: winit re-export and routing of window events into camera input and
//! the renderer's surface signal.
use cubefield_math::{Camera, InputState};
use cubefield_render::{RenderSize, SurfaceSignal};
use winit::dpi::PhysicalSize;
use winit::event::{MouseScrollDelta, WindowEvent};

pub use winit;

/// Pixels per scroll "line" for touchpads that report pixel deltas.
const PIXELS_PER_LINE: f64 = 40.0;

pub fn render_size(size: PhysicalSize<u32>) -> RenderSize {
    RenderSize::new(size.width, size.height)
}

/// Vertical scroll in lines, positive away from the user.
pub fn scroll_lines(delta: MouseScrollDelta) -> f32 {
    match delta {
        MouseScrollDelta::LineDelta(_, y) => y,
        MouseScrollDelta::PixelDelta(p) => (p.y / PIXELS_PER_LINE) as f32,
    }
}

/// Applies input and resize events. Returns `true` when the event was consumed.
pub fn route_window_event(
    event: &WindowEvent,
    camera: &mut Camera,
    input: &mut InputState,
    surface: &mut SurfaceSignal,
) -> bool {
    match event {
        WindowEvent::Resized(size) => {
            surface.resize(render_size(*size));
            true
        }
        WindowEvent::CursorMoved { position, .. } => {
            input.cursor_moved(camera, position.x as f32, position.y as f32);
            true
        }
        WindowEvent::MouseWheel { delta, .. } => {
            input.scrolled(camera, scroll_lines(*delta));
            true
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use winit::dpi::PhysicalPosition;

    #[test]
    fn resize_marks_surface() {
        let mut cam = Camera::default();
        let mut input = InputState::default();
        let mut surface = SurfaceSignal::new(RenderSize::new(800, 600));
        let ev = WindowEvent::Resized(PhysicalSize::new(0, 0));
        assert!(route_window_event(&ev, &mut cam, &mut input, &mut surface));
        assert!(surface.resized);
        assert!(surface.size.is_empty());
    }

    #[test]
    fn pixel_scroll_is_scaled_to_lines() {
        assert_eq!(scroll_lines(MouseScrollDelta::LineDelta(0.0, 2.0)), 2.0);
        let px = MouseScrollDelta::PixelDelta(PhysicalPosition::new(0.0, -80.0));
        assert_eq!(scroll_lines(px), -2.0);
    }

    #[test]
    fn other_events_pass_through() {
        let mut cam = Camera::default();
        let mut input = InputState::default();
        let mut surface = SurfaceSignal::default();
        assert!(!route_window_event(
            &WindowEvent::Focused(true),
            &mut cam,
            &mut input,
            &mut surface
        ));
        assert!(!surface.resized);
        assert_eq!(cam, Camera::default());
    }
}
