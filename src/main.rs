//! Relativity Viewfinder - Main Entry Point
//!
//! Opens a window showing the relativistic lookalike sphere, with an egui
//! control panel for the boost velocity, transformation kind, camera
//! position and sensor-driven velocity mode.

use std::sync::Arc;
use std::time::{Duration, Instant};

use relativity_viewfinder::config::ViewfinderConfig;
use relativity_viewfinder::App;
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, KeyEvent, MouseButton, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowAttributes, WindowId};

const WINDOW_TITLE: &str = "Relativity Viewfinder";
const DEFAULT_WIDTH: u32 = 1280;
const DEFAULT_HEIGHT: u32 = 720;
const TARGET_FPS: u32 = 60;

/// Application state machine
enum AppState {
    /// Initial state before window is created
    Uninitialized,
    /// Window and graphics context are ready
    Running { window: Arc<Window>, app: App },
}

/// Main application handler implementing winit's ApplicationHandler trait
struct ViewfinderApp {
    state: AppState,
    next_redraw_at: Instant,
}

impl ViewfinderApp {
    fn new() -> Self {
        Self {
            state: AppState::Uninitialized,
            next_redraw_at: Instant::now(),
        }
    }
}

impl ApplicationHandler for ViewfinderApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        // Only initialize if we haven't already
        if let AppState::Uninitialized = &self.state {
            log::info!("Creating window...");

            let window_attributes = WindowAttributes::default()
                .with_title(WINDOW_TITLE)
                .with_inner_size(LogicalSize::new(DEFAULT_WIDTH, DEFAULT_HEIGHT));

            let window = Arc::new(
                event_loop
                    .create_window(window_attributes)
                    .expect("Failed to create window"),
            );

            let config = ViewfinderConfig::load_or_default();

            log::info!("Initializing wgpu and egui...");
            let app = pollster::block_on(App::new(window.clone(), config));

            log::info!("Relativity Viewfinder ready!");
            log::info!("ESC exit, SPACE inside/outside, G sensor mode, C circles");

            self.state = AppState::Running { window, app };
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let AppState::Running { app, .. } = &mut self.state else {
            return;
        };

        // Let egui handle the event first
        let egui_consumed = app.handle_window_event(&event);

        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, exiting...");
                event_loop.exit();
            }

            // Keyboard input (only if egui doesn't want it)
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key_code),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } if !egui_consumed => match key_code {
                KeyCode::Escape => {
                    log::info!("Escape pressed, exiting...");
                    event_loop.exit();
                }
                // Space toggles inside/outside camera position
                KeyCode::Space => app.toggle_camera_position(),
                // G toggles the sensor-driven velocity mode
                KeyCode::KeyG => app.toggle_sensor_mode(),
                // C toggles the reference circles
                KeyCode::KeyC => app.toggle_circles(),
                // F/B point the camera forward/backward
                KeyCode::KeyF => app.point_forward(),
                KeyCode::KeyB => app.point_backward(),
                _ => {}
            },

            WindowEvent::Resized(physical_size) => {
                app.resize(physical_size);
            }

            WindowEvent::CursorMoved { position, .. } => {
                app.on_mouse_move(position.x as f32, position.y as f32);
            }

            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => match state {
                ElementState::Pressed if !egui_consumed => app.on_mouse_press(),
                ElementState::Pressed => {}
                ElementState::Released => app.on_mouse_release(),
            },

            WindowEvent::RedrawRequested => match app.render() {
                Ok(_) => {}
                Err(wgpu::SurfaceError::Lost) => {
                    log::warn!("Surface lost, reconfiguring...");
                    app.resize(app.size());
                }
                Err(wgpu::SurfaceError::OutOfMemory) => {
                    log::error!("Out of GPU memory!");
                    event_loop.exit();
                }
                Err(e) => {
                    log::warn!("Surface error: {:?}", e);
                }
            },

            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let AppState::Running { window, .. } = &mut self.state else {
            event_loop.set_control_flow(ControlFlow::Wait);
            return;
        };

        // Drive redraws at target FPS
        let frame_duration = Duration::from_nanos(1_000_000_000u64 / TARGET_FPS as u64);
        let now = Instant::now();

        if now >= self.next_redraw_at {
            window.request_redraw();
            self.next_redraw_at += frame_duration;

            // Reset if too far behind
            if now > self.next_redraw_at + frame_duration * 2 {
                self.next_redraw_at = now + frame_duration;
            }
        }

        event_loop.set_control_flow(ControlFlow::WaitUntil(self.next_redraw_at));
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Relativity Viewfinder v{}", env!("CARGO_PKG_VERSION"));

    let event_loop = EventLoop::new().expect("Failed to create event loop");
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = ViewfinderApp::new();
    event_loop.run_app(&mut app).expect("Event loop error");
}
