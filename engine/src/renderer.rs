use std::cell::Cell;
use std::rc::Rc;

use anyhow::Result;
use log::*;
use vulkanalia::vk;
use winit::window::Window;

use crate::config::RendererConfig;
use crate::vulkan::{window_extent, VulkanRenderer};

/// Latest framebuffer size reported by the window, waiting to be picked up
/// by the renderer. Clones share the same slot.
#[derive(Clone, Debug, Default)]
pub struct ResizeSignal(Rc<Cell<Option<vk::Extent2D>>>);

impl ResizeSignal {
    pub fn notify(&self, width: u32, height: u32) {
        self.0.set(Some(vk::Extent2D { width, height }));
    }

    pub fn take(&self) -> Option<vk::Extent2D> {
        self.0.take()
    }
}

/// What the next redraw does.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FramePlan {
    /// The window has no area; nothing is acquired or submitted.
    Skip,
    Draw { resized: bool },
}

/// Whether frames can be drawn and whether the chain must be rebuilt before
/// the next one.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SurfaceTracker {
    minimized: bool,
    resize_pending: bool,
}

impl SurfaceTracker {
    /// Folds in the latest resize, if any.
    pub fn update(&mut self, resize: Option<vk::Extent2D>) {
        if let Some(extent) = resize {
            let minimized = extent.width == 0 || extent.height == 0;
            if minimized != self.minimized {
                debug!(
                    "Window {} at {}x{}.",
                    if minimized { "minimized" } else { "restored" },
                    extent.width,
                    extent.height
                );
            }
            self.minimized = minimized;
            self.resize_pending = true;
        }
    }

    pub fn suspended(&self) -> bool {
        self.minimized
    }

    /// `None` while suspended; otherwise whether a resize is pending, which
    /// is cleared by the call.
    pub fn next_frame(&mut self) -> Option<bool> {
        if self.minimized {
            None
        } else {
            Some(std::mem::take(&mut self.resize_pending))
        }
    }

    /// Folds in `resize` and decides the next redraw.
    pub fn plan(&mut self, resize: Option<vk::Extent2D>) -> FramePlan {
        self.update(resize);
        match self.next_frame() {
            Some(resized) => FramePlan::Draw { resized },
            None => FramePlan::Skip,
        }
    }
}

#[derive(Debug)]
pub struct Renderer {
    vk_renderer: VulkanRenderer,
    resize: ResizeSignal,
    surface: SurfaceTracker,
}

impl Renderer {
    pub unsafe fn create(window: &Window, config: &RendererConfig) -> Result<Self> {
        let vk_renderer = VulkanRenderer::new(window, config)?;

        Ok(Self {
            vk_renderer,
            resize: ResizeSignal::default(),
            surface: SurfaceTracker::default(),
        })
    }

    /// Handle for the window event handler to report resizes through.
    pub fn resize_signal(&self) -> ResizeSignal {
        self.resize.clone()
    }

    /// Picks up pending resizes and reports whether frames can be drawn.
    pub fn poll_surface(&mut self) -> bool {
        self.surface.update(self.resize.take());
        !self.surface.suspended()
    }

    /// Renders a frame unless the window has no area.
    pub unsafe fn render(&mut self, window: &Window) -> Result<()> {
        match self.surface.plan(self.resize.take()) {
            FramePlan::Draw { resized } => self.vk_renderer.render(window_extent(window), resized),
            FramePlan::Skip => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_clones_share_one_slot() {
        let signal = ResizeSignal::default();
        let handler = signal.clone();

        handler.notify(640, 480);
        handler.notify(800, 600);
        assert_eq!(
            signal.take(),
            Some(vk::Extent2D {
                width: 800,
                height: 600
            })
        );
        assert_eq!(signal.take(), None);
    }

    #[test]
    fn zero_area_suspends_until_restored() {
        let signal = ResizeSignal::default();
        let mut surface = SurfaceTracker::default();
        assert_eq!(surface.next_frame(), Some(false));

        signal.notify(0, 0);
        surface.update(signal.take());
        assert!(surface.suspended());
        for _ in 0..3 {
            surface.update(signal.take());
            assert_eq!(surface.next_frame(), None);
        }

        signal.notify(800, 600);
        surface.update(signal.take());
        assert!(!surface.suspended());

        // Exactly one rebuild is requested for the new size.
        assert_eq!(surface.next_frame(), Some(true));
        assert_eq!(surface.next_frame(), Some(false));
    }

    #[test]
    fn redraws_while_minimized_draw_nothing() {
        let signal = ResizeSignal::default();
        let mut surface = SurfaceTracker::default();
        assert_eq!(surface.plan(signal.take()), FramePlan::Draw { resized: false });

        signal.notify(0, 0);
        let plans: Vec<_> = (0..4).map(|_| surface.plan(signal.take())).collect();
        assert!(plans.iter().all(|plan| *plan == FramePlan::Skip));

        signal.notify(1024, 768);
        let plans: Vec<_> = (0..3).map(|_| surface.plan(signal.take())).collect();
        assert_eq!(
            plans,
            vec![
                FramePlan::Draw { resized: true },
                FramePlan::Draw { resized: false },
                FramePlan::Draw { resized: false },
            ]
        );
    }

    #[test]
    fn one_zero_dimension_is_enough_to_suspend() {
        let mut surface = SurfaceTracker::default();
        surface.update(Some(vk::Extent2D {
            width: 1024,
            height: 0,
        }));
        assert!(surface.suspended());

        surface.update(Some(vk::Extent2D {
            width: 1024,
            height: 768,
        }));
        assert_eq!(surface.next_frame(), Some(true));
    }

    #[test]
    fn resizes_without_minimizing_keep_rendering() {
        let mut surface = SurfaceTracker::default();
        surface.update(Some(vk::Extent2D {
            width: 1280,
            height: 720,
        }));
        surface.update(None);
        assert_eq!(surface.next_frame(), Some(true));
    }
}
