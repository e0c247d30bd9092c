use anyhow::Result;
use log::*;
use renderer::Renderer;
use winit::dpi::LogicalSize;
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::window::{Window, WindowBuilder};

pub mod config;
pub mod error;
mod renderer;
mod vulkan;

pub use config::EngineConfig;
pub use error::RenderError;

#[derive(Debug)]
pub struct Engine {
    window: Window,
    renderer: Renderer,
    event_loop: EventLoop<()>,
}

impl Engine {
    pub fn new(config: &EngineConfig) -> Result<Engine> {
        // Window
        let event_loop = EventLoop::new()?;
        let window = WindowBuilder::new()
            .with_title(config.window.title.as_str())
            .with_inner_size(LogicalSize::new(config.window.width, config.window.height))
            .build(&event_loop)?;

        let renderer = unsafe { Renderer::create(&window, &config.renderer)? };

        Ok(Engine {
            window,
            renderer,
            event_loop,
        })
    }

    /// Runs until the window is closed or a frame fails. The renderer is torn
    /// down before the window it draws into.
    pub fn run(self) -> Result<()> {
        let Engine {
            window,
            mut renderer,
            event_loop,
        } = self;

        let resize = renderer.resize_signal();
        let mut failure = None;

        event_loop.run(|event, elwt| {
            // Without a redraw request the loop sleeps until the next event.
            elwt.set_control_flow(ControlFlow::Wait);

            match event {
                // Request a redraw when all events were processed, unless
                // there is nothing to draw into.
                Event::AboutToWait => {
                    if renderer.poll_surface() {
                        window.request_redraw();
                    }
                }
                Event::WindowEvent { event, .. } => match event {
                    WindowEvent::RedrawRequested if !elwt.exiting() => {
                        if let Err(error) = unsafe { renderer.render(&window) } {
                            error!("Frame failed: {:#}", error);
                            failure = Some(error);
                            elwt.exit();
                        }
                    }
                    WindowEvent::Resized(size) => resize.notify(size.width, size.height),
                    WindowEvent::CloseRequested => {
                        info!("Window closed.");
                        elwt.exit();
                    }
                    _ => {}
                },
                _ => {}
            }
        })?;

        drop(renderer);
        drop(window);

        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
