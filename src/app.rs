//! Application state holding the wgpu graphics context
//!
//! Owns the render pipelines for the lookalike sphere, the reference circles
//! and the velocity control handles, the egui control panel, and the
//! per-frame wiring of the viewfinder controller.

use std::sync::Arc;
use std::time::Instant;

use bytemuck::{Pod, Zeroable};
use glam::{DVec3, Mat4, Vec3};
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::window::Window;

use crate::boost::TransformKind;
use crate::config::ViewfinderConfig;
use crate::render::camera::OrbitCamera;
use crate::render::feeds::{self, FeedVariant};
use crate::render::fov;
use crate::render::{circle_points, uv_sphere, Vertex};
use crate::sensors::{OrientationSensor, WobbleDriver};
use crate::session::{FrameOutput, ViewfinderController};
use crate::velocity::frames::{self, ScreenOrientation};

/// Sphere shader uniforms (must match lookalike.wgsl)
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct SphereUniforms {
    view_proj: [[f32; 4]; 4],
    model: [[f32; 4]; 4],
    tan_half_fov: [f32; 4],
    flags: [u32; 4],
}

/// Flat-color shader uniforms (must match flat.wgsl)
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct FlatUniforms {
    view_proj: [[f32; 4]; 4],
    model: [[f32; 4]; 4],
    color: [f32; 4],
}

/// One uniform buffer + bind group pair for a flat-shaded draw
struct FlatSlot {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

/// What the left mouse button is currently doing
#[derive(Clone, Copy, PartialEq, Eq)]
enum MouseMode {
    Idle,
    Orbit,
    DragHandle { rear: bool },
}

const SKY_COLOR: wgpu::Color = wgpu::Color {
    r: 0.53,
    g: 0.81,
    b: 0.92,
    a: 1.0,
};

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Main application state
pub struct App {
    /// Reference to the window
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    size: PhysicalSize<u32>,
    depth_view: wgpu::TextureView,

    // lookalike sphere
    sphere_pipeline: wgpu::RenderPipeline,
    sphere_vertex_buffer: wgpu::Buffer,
    sphere_index_buffer: wgpu::Buffer,
    sphere_index_count: u32,
    sphere_uniform_buffer: wgpu::Buffer,
    sphere_bind_group: wgpu::BindGroup,
    aspect_user: f64,
    aspect_env: f64,

    // reference circles
    circle_pipeline: wgpu::RenderPipeline,
    circle_vertex_buffer: wgpu::Buffer,
    circle_vertex_count: u32,
    circle_slots: [FlatSlot; 3],

    // control handles
    handle_pipeline: wgpu::RenderPipeline,
    handle_vertex_buffer: wgpu::Buffer,
    handle_index_buffer: wgpu::Buffer,
    handle_index_count: u32,
    handle_slots: [FlatSlot; 2],

    // egui integration
    egui_ctx: egui::Context,
    egui_state: egui_winit::State,
    egui_renderer: egui_wgpu::Renderer,

    // core
    controller: ViewfinderController,
    camera: OrbitCamera,
    sensor: Option<OrientationSensor>,
    started: Instant,
    last_frame_output: FrameOutput,

    // input
    cursor_position: (f32, f32),
    mouse_mode: MouseMode,

    // frame timing
    fps: f64,
    last_fps_update: Instant,
    frames_since_update: u64,
}

impl App {
    /// Create a new App instance with initialized wgpu context
    pub async fn new(window: Arc<Window>, viewfinder_config: ViewfinderConfig) -> Self {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window.clone())
            .expect("Failed to create surface");

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .expect("Failed to find suitable GPU adapter");

        log::info!("Using GPU: {}", adapter.get_info().name);
        log::info!("Backend: {:?}", adapter.get_info().backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Viewfinder Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: adapter.limits(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await
            .expect("Failed to create device");

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .copied()
            .unwrap_or(surface_caps.formats[0]);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 1,
        };
        surface.configure(&device, &config);

        let depth_view = Self::create_depth_view(&device, &config);

        // feed textures
        let user_image = feeds::load_or_placeholder(
            viewfinder_config.user_feed_image.as_deref(),
            FeedVariant::User,
        );
        let env_image = feeds::load_or_placeholder(
            viewfinder_config.env_feed_image.as_deref(),
            FeedVariant::Env,
        );
        let aspect_user = feeds::aspect_ratio(&user_image);
        let aspect_env = feeds::aspect_ratio(&env_image);
        let user_texture_view = Self::upload_feed_texture(&device, &queue, &user_image, "User Feed");
        let env_texture_view = Self::upload_feed_texture(&device, &queue, &env_image, "Env Feed");

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Feed Sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        // lookalike sphere mesh
        let (sphere_vertices, sphere_indices) = uv_sphere(96, 128);
        let sphere_vertex_buffer = Self::init_buffer(
            &device,
            &queue,
            "Sphere Vertex Buffer",
            bytemuck::cast_slice(&sphere_vertices),
            wgpu::BufferUsages::VERTEX,
        );
        let sphere_index_buffer = Self::init_buffer(
            &device,
            &queue,
            "Sphere Index Buffer",
            bytemuck::cast_slice(&sphere_indices),
            wgpu::BufferUsages::INDEX,
        );

        let sphere_uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Sphere Uniform Buffer"),
            size: std::mem::size_of::<SphereUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let sphere_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Sphere Bind Group Layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 2,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 3,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                ],
            });

        let sphere_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Sphere Bind Group"),
            layout: &sphere_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: sphere_uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&user_texture_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&env_texture_view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
            ],
        });

        let vertex_layout = wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[wgpu::VertexAttribute {
                format: wgpu::VertexFormat::Float32x3,
                offset: 0,
                shader_location: 0,
            }],
        };

        let sphere_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Lookalike Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/lookalike.wgsl").into()),
        });

        let sphere_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Sphere Pipeline Layout"),
                bind_group_layouts: &[&sphere_bind_group_layout],
                push_constant_ranges: &[],
            });

        let sphere_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Sphere Pipeline"),
            layout: Some(&sphere_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &sphere_shader,
                entry_point: Some("vs_main"),
                buffers: &[vertex_layout.clone()],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &sphere_shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                // the camera sits inside the sphere, so both faces render
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        // flat pipelines for circles (lines) and handles (triangles)
        let flat_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Flat Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/flat.wgsl").into()),
        });

        let flat_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Flat Bind Group Layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            });

        let flat_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Flat Pipeline Layout"),
                bind_group_layouts: &[&flat_bind_group_layout],
                push_constant_ranges: &[],
            });

        let make_flat_pipeline = |label: &str, topology: wgpu::PrimitiveTopology| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&flat_pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &flat_shader,
                    entry_point: Some("vs_main"),
                    buffers: &[vertex_layout.clone()],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &flat_shader,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: surface_format,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology,
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        };

        let circle_pipeline = make_flat_pipeline("Circle Pipeline", wgpu::PrimitiveTopology::LineStrip);
        let handle_pipeline =
            make_flat_pipeline("Handle Pipeline", wgpu::PrimitiveTopology::TriangleList);

        let circle_vertices = circle_points(100);
        let circle_vertex_buffer = Self::init_buffer(
            &device,
            &queue,
            "Circle Vertex Buffer",
            bytemuck::cast_slice(&circle_vertices),
            wgpu::BufferUsages::VERTEX,
        );

        let (handle_vertices, handle_indices) = uv_sphere(16, 24);
        let handle_vertex_buffer = Self::init_buffer(
            &device,
            &queue,
            "Handle Vertex Buffer",
            bytemuck::cast_slice(&handle_vertices),
            wgpu::BufferUsages::VERTEX,
        );
        let handle_index_buffer = Self::init_buffer(
            &device,
            &queue,
            "Handle Index Buffer",
            bytemuck::cast_slice(&handle_indices),
            wgpu::BufferUsages::INDEX,
        );

        let make_flat_slot = |label: &str| {
            let buffer = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: std::mem::size_of::<FlatUniforms>() as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: &flat_bind_group_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                }],
            });
            FlatSlot { buffer, bind_group }
        };

        let circle_slots = [
            make_flat_slot("Circle Uniforms 0"),
            make_flat_slot("Circle Uniforms 1"),
            make_flat_slot("Circle Uniforms 2"),
        ];
        let handle_slots = [
            make_flat_slot("Handle Uniforms Front"),
            make_flat_slot("Handle Uniforms Rear"),
        ];

        // Initialize egui
        let egui_ctx = egui::Context::default();
        let mut style = (*egui_ctx.style()).clone();
        style.visuals.window_shadow = egui::epaint::Shadow::NONE;
        egui_ctx.set_style(style);

        let egui_state = egui_winit::State::new(
            egui_ctx.clone(),
            egui::ViewportId::ROOT,
            &window,
            Some(window.scale_factor() as f32),
            None,
            None,
        );

        let egui_renderer = egui_wgpu::Renderer::new(&device, surface_format, None, 1, false);

        let controller = ViewfinderController::new(&viewfinder_config);
        let camera = OrbitCamera::new(viewfinder_config.camera_outside_distance as f32);

        let now = Instant::now();

        let mut app = Self {
            window,
            surface,
            device,
            queue,
            config,
            size,
            depth_view,
            sphere_pipeline,
            sphere_vertex_buffer,
            sphere_index_buffer,
            sphere_index_count: sphere_indices.len() as u32,
            sphere_uniform_buffer,
            sphere_bind_group,
            aspect_user,
            aspect_env,
            circle_pipeline,
            circle_vertex_buffer,
            circle_vertex_count: circle_vertices.len() as u32,
            circle_slots,
            handle_pipeline,
            handle_vertex_buffer,
            handle_index_buffer,
            handle_index_count: handle_indices.len() as u32,
            handle_slots,
            egui_ctx,
            egui_state,
            egui_renderer,
            controller,
            camera,
            sensor: None,
            started: now,
            last_frame_output: FrameOutput {
                distortion: glam::DMat4::IDENTITY,
                circles_orientation: glam::DMat4::IDENTITY,
                warning: false,
                camera_distance: 0.001,
                control_radius: 0.2,
                control_size: 0.005,
                handle_direction: None,
            },
            cursor_position: (0.0, 0.0),
            mouse_mode: MouseMode::Idle,
            fps: 60.0,
            last_fps_update: now,
            frames_since_update: 0,
        };
        app.camera
            .set_aspect(app.size.width.max(1) as f32 / app.size.height.max(1) as f32);
        app
    }

    fn create_depth_view(
        device: &wgpu::Device,
        config: &wgpu::SurfaceConfiguration,
    ) -> wgpu::TextureView {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Depth Texture"),
            size: wgpu::Extent3d {
                width: config.width.max(1),
                height: config.height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        texture.create_view(&wgpu::TextureViewDescriptor::default())
    }

    fn init_buffer(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        label: &str,
        data: &[u8],
        usage: wgpu::BufferUsages,
    ) -> wgpu::Buffer {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: data.len() as u64,
            usage: usage | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        queue.write_buffer(&buffer, 0, data);
        buffer
    }

    fn upload_feed_texture(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        image: &image::RgbaImage,
        label: &str,
    ) -> wgpu::TextureView {
        let (width, height) = image.dimensions();
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            image.as_raw(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * 4),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        texture.create_view(&wgpu::TextureViewDescriptor::default())
    }

    /// Handle a window event, returning true if egui consumed it
    pub fn handle_window_event(&mut self, event: &WindowEvent) -> bool {
        let response = self.egui_state.on_window_event(&self.window, event);
        response.consumed
    }

    /// Resize the surface
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.size = new_size;
            self.config.width = new_size.width;
            self.config.height = new_size.height;
            self.surface.configure(&self.device, &self.config);
            self.depth_view = Self::create_depth_view(&self.device, &self.config);
            self.camera
                .set_aspect(new_size.width as f32 / new_size.height as f32);
        }
    }

    /// Get current size
    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    /// Toggle the sensor-driven velocity mode
    pub fn toggle_sensor_mode(&mut self) {
        if self.sensor.is_some() {
            self.detach_sensor();
            self.controller.stop_sensor();
        } else {
            self.controller.start_sensor();
            self.sensor = Some(OrientationSensor::start(WobbleDriver::default()));
        }
    }

    fn detach_sensor(&mut self) {
        if let Some(mut sensor) = self.sensor.take() {
            sensor.stop();
        }
    }

    /// Toggle the inside/outside camera position
    pub fn toggle_camera_position(&mut self) {
        let now = self.started.elapsed().as_secs_f64();
        self.controller.toggle_camera_position(now);
    }

    /// Toggle reference-circle visibility
    pub fn toggle_circles(&mut self) {
        let session = self.controller.session_mut();
        session.show_circles = !session.show_circles;
    }

    /// Point the virtual camera forward (looking along -z)
    pub fn point_forward(&mut self) {
        self.camera.point_forward();
    }

    /// Point the virtual camera backward (looking along +z)
    pub fn point_backward(&mut self) {
        self.camera.point_backward();
    }

    /// Handle mouse movement
    pub fn on_mouse_move(&mut self, x: f32, y: f32) {
        let delta = (x - self.cursor_position.0, y - self.cursor_position.1);
        self.cursor_position = (x, y);

        match self.mouse_mode {
            MouseMode::Idle => {}
            MouseMode::Orbit => {
                self.camera.on_mouse_drag(delta, 0.005);
            }
            MouseMode::DragHandle { rear } => {
                self.update_handle_drag(rear);
            }
        }
    }

    /// Handle left-button press
    pub fn on_mouse_press(&mut self) {
        if let Some(rear) = self.pick_handle() {
            self.controller.resolver_mut().begin_drag();
            self.mouse_mode = MouseMode::DragHandle { rear };
        } else {
            self.mouse_mode = MouseMode::Orbit;
        }
    }

    /// Handle left-button release
    pub fn on_mouse_release(&mut self) {
        if matches!(self.mouse_mode, MouseMode::DragHandle { .. }) {
            self.controller.resolver_mut().end_drag();
        }
        self.mouse_mode = MouseMode::Idle;
    }

    /// Ray from the eye through the cursor, in world space
    fn cursor_ray(&self) -> (Vec3, Vec3) {
        let ndc_x = 2.0 * self.cursor_position.0 / self.size.width.max(1) as f32 - 1.0;
        let ndc_y = 1.0 - 2.0 * self.cursor_position.1 / self.size.height.max(1) as f32;
        let inverse = self.camera.view_projection_matrix().inverse();
        let near = inverse.project_point3(Vec3::new(ndc_x, ndc_y, 0.0));
        let far = inverse.project_point3(Vec3::new(ndc_x, ndc_y, 1.0));
        (near, (far - near).normalize_or_zero())
    }

    /// Which handle (if any) is under the cursor; Some(true) = rear
    fn pick_handle(&self) -> Option<bool> {
        let session = self.controller.session();
        if !self.controller.resolver().is_active() || !session.direction_control {
            return None;
        }

        let (origin, dir) = self.cursor_ray();
        if dir == Vec3::ZERO {
            return None;
        }

        let frame = &self.last_frame_output;
        let axis = frame
            .handle_direction
            .unwrap_or(DVec3::NEG_Z)
            .as_vec3();
        let radius = frame.control_radius as f32;
        let pick_radius = (frame.control_size as f32 * 3.0).max(radius * 0.08);

        let mut best: Option<(bool, f32)> = None;
        for (rear, center) in [(false, axis * radius), (true, -axis * radius)] {
            let to_center = center - origin;
            let along = to_center.dot(dir);
            if along <= 0.0 {
                continue;
            }
            let miss = (to_center - along * dir).length();
            if miss < pick_radius && best.map_or(true, |(_, d)| miss < d) {
                best = Some((rear, miss));
            }
        }
        best.map(|(rear, _)| rear)
    }

    /// Map the cursor onto the control sphere and update the drag angles
    fn update_handle_drag(&mut self, rear: bool) {
        let (origin, dir) = self.cursor_ray();
        if dir == Vec3::ZERO {
            return;
        }
        let radius = self.last_frame_output.control_radius as f32;

        // nearest ray-sphere intersection, or the closest approach point
        // projected onto the sphere when the ray misses
        let b = origin.dot(dir);
        let c = origin.dot(origin) - radius * radius;
        let disc = b * b - c;
        let point = if disc >= 0.0 {
            let t = -b - disc.sqrt();
            let t = if t > 0.0 { t } else { -b + disc.sqrt() };
            origin + dir * t
        } else {
            let closest = origin - b * dir;
            closest.normalize_or_zero() * radius
        };
        if point == Vec3::ZERO {
            return;
        }

        // the rear handle mirrors the grab point through the origin
        let grabbed = if rear { -point } else { point };
        let (theta, phi) = frames::cartesian_to_spherical(grabbed.as_dvec3());
        self.controller.resolver_mut().update_drag(theta, phi);
    }

    /// Render a frame
    pub fn render(&mut self) -> Result<(), wgpu::SurfaceError> {
        let now = self.started.elapsed().as_secs_f64();

        // forward the latest orientation sample; a bad one detaches the source
        let raw = self.sensor.as_ref().and_then(|s| s.take_latest());
        if let Some(raw) = raw {
            if self.controller.on_orientation_sample(raw).is_err() {
                self.detach_sensor();
            }
        }

        let frame = self.controller.tick(now);
        self.last_frame_output = frame;

        let session = self.controller.session().clone();
        self.camera.set_distance(frame.camera_distance as f32);
        let window_aspect = self.size.width.max(1) as f64 / self.size.height.max(1) as f64;
        self.camera
            .set_fov_y_deg(fov::vertical_fov_deg(session.fov.screen, window_aspect) as f32);

        let view_proj = self.camera.view_projection_matrix().to_cols_array_2d();

        // sphere uniforms
        let (hu, vu) = fov::tan_half_fov(session.fov.user, self.aspect_user);
        let (he, ve) = fov::tan_half_fov(session.fov.env, self.aspect_env);
        let sphere_uniforms = SphereUniforms {
            view_proj,
            model: frame.distortion.as_mat4().to_cols_array_2d(),
            tan_half_fov: [hu as f32, vu as f32, he as f32, ve as f32],
            flags: [frame.warning as u32, 0, 0, 0],
        };
        self.queue.write_buffer(
            &self.sphere_uniform_buffer,
            0,
            bytemuck::bytes_of(&sphere_uniforms),
        );

        // circle uniforms: one circle per coordinate plane, oriented by the
        // boost alignment rotation
        let circles = frame.circles_orientation.as_mat4();
        let pre_rotations = [
            Mat4::IDENTITY,
            Mat4::from_rotation_x(std::f32::consts::FRAC_PI_2),
            Mat4::from_rotation_y(std::f32::consts::FRAC_PI_2),
        ];
        let circle_colors = [
            [0.27, 0.27, 0.27, 1.0],
            [0.67, 0.67, 0.67, 1.0],
            [0.67, 0.67, 0.67, 1.0],
        ];
        for ((slot, pre), color) in self
            .circle_slots
            .iter()
            .zip(pre_rotations)
            .zip(circle_colors)
        {
            let uniforms = FlatUniforms {
                view_proj,
                model: (circles * pre).to_cols_array_2d(),
                color,
            };
            self.queue
                .write_buffer(&slot.buffer, 0, bytemuck::bytes_of(&uniforms));
        }

        // handle uniforms: front at +r*beta_hat, rear mirrored, tinted by speed
        let show_handles =
            self.controller.resolver().is_active() && session.direction_control;
        if show_handles {
            let axis = frame.handle_direction.unwrap_or(DVec3::NEG_Z).as_vec3();
            let radius = frame.control_radius as f32;
            let size = frame.control_size as f32;
            let blend = self.controller.resolver().speed().abs().clamp(0.0, 1.0) as f32;
            let front_color = lerp_color([1.0; 4], [0.0, 0.0, 1.0, 1.0], blend);
            let rear_color = lerp_color([1.0; 4], [1.0, 0.27, 0.0, 1.0], blend);

            for (slot, (center, color)) in self.handle_slots.iter().zip([
                (axis * radius, front_color),
                (-axis * radius, rear_color),
            ]) {
                let model = Mat4::from_translation(center) * Mat4::from_scale(Vec3::splat(size));
                let uniforms = FlatUniforms {
                    view_proj,
                    model: model.to_cols_array_2d(),
                    color,
                };
                self.queue
                    .write_buffer(&slot.buffer, 0, bytemuck::bytes_of(&uniforms));
            }
        }

        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Scene Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(SKY_COLOR),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            render_pass.set_pipeline(&self.sphere_pipeline);
            render_pass.set_bind_group(0, &self.sphere_bind_group, &[]);
            render_pass.set_vertex_buffer(0, self.sphere_vertex_buffer.slice(..));
            render_pass
                .set_index_buffer(self.sphere_index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            render_pass.draw_indexed(0..self.sphere_index_count, 0, 0..1);

            if session.show_circles {
                render_pass.set_pipeline(&self.circle_pipeline);
                render_pass.set_vertex_buffer(0, self.circle_vertex_buffer.slice(..));
                for slot in &self.circle_slots {
                    render_pass.set_bind_group(0, &slot.bind_group, &[]);
                    render_pass.draw(0..self.circle_vertex_count, 0..1);
                }
            }

            if show_handles {
                render_pass.set_pipeline(&self.handle_pipeline);
                render_pass.set_vertex_buffer(0, self.handle_vertex_buffer.slice(..));
                render_pass.set_index_buffer(
                    self.handle_index_buffer.slice(..),
                    wgpu::IndexFormat::Uint32,
                );
                for slot in &self.handle_slots {
                    render_pass.set_bind_group(0, &slot.bind_group, &[]);
                    render_pass.draw_indexed(0..self.handle_index_count, 0, 0..1);
                }
            }
        }

        self.render_ui(&mut encoder, &view);

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        self.update_fps();

        Ok(())
    }

    fn render_ui(&mut self, encoder: &mut wgpu::CommandEncoder, view: &wgpu::TextureView) {
        let raw_input = self.egui_state.take_egui_input(&self.window);

        // snapshot state before running egui
        let session = self.controller.session().clone();
        let frame = self.last_frame_output;
        let sensor_active = self.controller.resolver().is_active();
        let sensor_tracking = self.controller.resolver().is_tracking();
        let fps = self.fps;

        let mut beta = session.stored_beta;
        let mut transform = session.transform;
        let mut fov_screen = session.fov.screen;
        let mut fov_user = session.fov.user;
        let mut fov_env = session.fov.env;
        let mut show_circles = session.show_circles;
        let mut direction_control = session.direction_control;
        let mut screen_orientation = session.screen_orientation;
        let mut speed = self.controller.resolver().speed();

        let mut toggle_position = false;
        let mut toggle_sensor = false;
        let mut point_action: Option<u8> = None;

        let full_output = self.egui_ctx.run(raw_input, |ctx| {
            egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.label("Relativity Viewfinder");
                    ui.separator();
                    ui.label(format!("FPS: {:.1}", fps));
                    ui.separator();
                    ui.label(format!(
                        "beta = ({:.2}, {:.2}, {:.2})",
                        session.beta.x, session.beta.y, session.beta.z
                    ));
                    if frame.warning {
                        ui.separator();
                        ui.colored_label(
                            egui::Color32::RED,
                            "|beta| >= 1: showing last valid view",
                        );
                    }
                });
            });

            egui::SidePanel::left("controls").show(ctx, |ui| {
                ui.heading("Physics");
                ui.separator();
                ui.add(egui::Slider::new(&mut beta.x, -0.99..=0.99).text("beta x"));
                ui.add(egui::Slider::new(&mut beta.y, -0.99..=0.99).text("beta y"));
                ui.add(egui::Slider::new(&mut beta.z, -0.99..=0.99).text("beta z"));
                egui::ComboBox::from_label("Transformation")
                    .selected_text(transform.name())
                    .show_ui(ui, |ui| {
                        for kind in TransformKind::all() {
                            ui.selectable_value(&mut transform, *kind, kind.name());
                        }
                    });

                ui.separator();
                ui.heading("Virtual camera");
                ui.separator();
                ui.label(session.camera_position.name());
                if ui.button("Move inside <-> outside").clicked() {
                    toggle_position = true;
                }
                ui.horizontal(|ui| {
                    if ui.button("Forward").clicked() {
                        point_action = Some(0);
                    }
                    if ui.button("Backward").clicked() {
                        point_action = Some(1);
                    }
                });
                ui.horizontal(|ui| {
                    if ui.button("Beta").clicked() {
                        point_action = Some(2);
                    }
                    if ui.button("-Beta").clicked() {
                        point_action = Some(3);
                    }
                });
                ui.horizontal(|ui| {
                    if ui.button("Beta +90").clicked() {
                        point_action = Some(4);
                    }
                    if ui.button("Beta -90").clicked() {
                        point_action = Some(5);
                    }
                });
                ui.add(egui::Slider::new(&mut fov_screen, 10.0..=170.0).text("Field of view"));

                ui.separator();
                ui.heading("Sensor mode");
                ui.separator();
                if ui
                    .button(if sensor_active {
                        "Stop sensor mode"
                    } else {
                        "Start sensor mode"
                    })
                    .clicked()
                {
                    toggle_sensor = true;
                }
                if sensor_active {
                    ui.label(if sensor_tracking {
                        "Tracking orientation"
                    } else {
                        "Waiting for first sample..."
                    });
                    ui.add(egui::Slider::new(&mut speed, -1.0..=1.0).text("speed"));
                    ui.checkbox(&mut direction_control, "Direction control handles");
                }

                ui.separator();
                ui.heading("Advanced");
                ui.separator();
                ui.add(egui::Slider::new(&mut fov_user, 10.0..=170.0).text("FOV user feed"));
                ui.add(egui::Slider::new(&mut fov_env, 10.0..=170.0).text("FOV env feed"));
                ui.checkbox(&mut show_circles, "Show reference circles");
                egui::ComboBox::from_label("Screen orientation")
                    .selected_text(screen_orientation.name())
                    .show_ui(ui, |ui| {
                        for o in ScreenOrientation::all() {
                            ui.selectable_value(&mut screen_orientation, *o, o.name());
                        }
                    });
            });
        });

        // apply UI changes
        for axis in 0..3 {
            if (beta[axis] - session.stored_beta[axis]).abs() > f64::EPSILON {
                self.controller.set_beta_component(axis, beta[axis]);
            }
        }
        if (speed - self.controller.resolver().speed()).abs() > f64::EPSILON {
            self.controller.resolver_mut().set_speed(speed);
        }
        {
            let state = self.controller.session_mut();
            state.transform = transform;
            state.fov.screen = fov_screen;
            state.fov.user = fov_user;
            state.fov.env = fov_env;
            state.show_circles = show_circles;
            state.direction_control = direction_control;
            state.screen_orientation = screen_orientation;
        }
        if toggle_position {
            self.toggle_camera_position();
        }
        if toggle_sensor {
            self.toggle_sensor_mode();
        }
        if let Some(action) = point_action {
            let beta = self.controller.session().beta;
            let pointed = match action {
                0 => {
                    self.camera.point_forward();
                    true
                }
                1 => {
                    self.camera.point_backward();
                    true
                }
                2 => self.camera.point_beta(beta),
                3 => self.camera.point_minus_beta(beta),
                4 => self.camera.point_beta_rotated(beta, true),
                _ => self.camera.point_beta_rotated(beta, false),
            };
            if !pointed {
                log::info!("beta = 0, so there is no beta direction to point at");
            }
        }

        self.egui_state
            .handle_platform_output(&self.window, full_output.platform_output);

        let paint_jobs = self
            .egui_ctx
            .tessellate(full_output.shapes, full_output.pixels_per_point);

        for (id, image_delta) in &full_output.textures_delta.set {
            self.egui_renderer
                .update_texture(&self.device, &self.queue, *id, image_delta);
        }

        let screen_descriptor = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [self.config.width, self.config.height],
            pixels_per_point: self.window.scale_factor() as f32,
        };

        self.egui_renderer.update_buffers(
            &self.device,
            &self.queue,
            encoder,
            &paint_jobs,
            &screen_descriptor,
        );

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("egui Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            let render_pass_static: &mut wgpu::RenderPass<'static> =
                unsafe { std::mem::transmute(&mut render_pass) };

            self.egui_renderer
                .render(render_pass_static, &paint_jobs, &screen_descriptor);
        }

        for id in &full_output.textures_delta.free {
            self.egui_renderer.free_texture(id);
        }
    }

    fn update_fps(&mut self) {
        self.frames_since_update += 1;

        let now = Instant::now();
        let elapsed = now.duration_since(self.last_fps_update).as_secs_f64();
        if elapsed >= 1.0 {
            self.fps = self.frames_since_update as f64 / elapsed;
            self.frames_since_update = 0;
            self.last_fps_update = now;
        }
    }
}

fn lerp_color(a: [f32; 4], b: [f32; 4], t: f32) -> [f32; 4] {
    let mut out = [0.0; 4];
    for i in 0..4 {
        out[i] = a[i] + (b[i] - a[i]) * t;
    }
    out
}
