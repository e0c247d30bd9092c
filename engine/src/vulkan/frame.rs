use std::sync::Arc;

use anyhow::Result;
use log::*;
use vulkanalia::vk;

use super::command_buffer::CommandPool;
use super::device::VulkanDevice;
use super::sync::{Fence, Semaphore};
use crate::error::RenderError;

/// Index of the active frame slot. Advances once per submitted frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FrameCounter {
    index: usize,
    slots: usize,
}

impl FrameCounter {
    pub fn new(slots: usize) -> Self {
        Self {
            index: 0,
            slots: slots.max(1),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn advance(&mut self) {
        self.index = (self.index + 1) % self.slots;
    }
}

/// The per-slot objects a frame in flight holds on to until its fence
/// signals.
#[derive(Debug)]
pub struct FrameSlot {
    pub image_available: Semaphore,
    pub render_finished: Semaphore,
    pub in_flight: Fence,
    pub command_buffer: vk::CommandBuffer,
}

/// Every frame slot and the pool their command buffers come from. Slots are
/// dropped before the pool.
#[derive(Debug)]
pub struct FrameSlots {
    pub slots: Vec<FrameSlot>,
    command_pool: CommandPool,
}

impl FrameSlots {
    pub unsafe fn new(device: Arc<VulkanDevice>, count: usize) -> Result<Self> {
        let command_pool = CommandPool::new(
            device.clone(),
            device.queue_families.graphics,
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        )?;

        let slots = command_pool
            .allocate(count as u32)?
            .into_iter()
            .map(|command_buffer| -> Result<FrameSlot> {
                Ok(FrameSlot {
                    image_available: Semaphore::new(device.clone())?,
                    render_finished: Semaphore::new(device.clone())?,
                    in_flight: Fence::new(device.clone(), true)?,
                    command_buffer,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        debug!("Created {} frame slots.", slots.len());

        Ok(Self {
            slots,
            command_pool,
        })
    }
}

/// What became of an image acquisition.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Acquired {
    Image(u32),
    /// The chain no longer matches the surface and must be rebuilt first.
    Stale,
}

/// A suboptimal image is still rendered; the following present reports it
/// again and triggers the rebuild.
pub fn classify_acquire(result: Result<(u32, vk::SuccessCode), vk::ErrorCode>) -> Result<Acquired> {
    match result {
        Ok((index, _)) => Ok(Acquired::Image(index)),
        Err(vk::ErrorCode::OUT_OF_DATE_KHR) => Ok(Acquired::Stale),
        Err(code) => Err(RenderError::gpu("acquire_next_image_khr")(code).into()),
    }
}

/// Whether the chain has to be rebuilt after presenting.
pub fn classify_present(
    result: Result<vk::SuccessCode, vk::ErrorCode>,
    resized: bool,
) -> Result<bool> {
    match result {
        Ok(vk::SuccessCode::SUBOPTIMAL_KHR) | Err(vk::ErrorCode::OUT_OF_DATE_KHR) => Ok(true),
        Ok(_) => Ok(resized),
        Err(code) => Err(RenderError::gpu("queue_present_khr")(code).into()),
    }
}

/// Whether the presentation chain still has to be rebuilt for the current
/// window. A rebuild is only possible while the window has area; until then
/// the chain stays stale and the next frame retries.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ChainState {
    stale: bool,
}

impl ChainState {
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Returns whether a rebuild for `window_size` can go ahead now. A size
    /// with no area defers it and marks the chain stale.
    pub fn begin_rebuild(&mut self, window_size: vk::Extent2D) -> bool {
        if window_size.width == 0 || window_size.height == 0 {
            self.stale = true;
            false
        } else {
            true
        }
    }

    pub fn rebuilt(&mut self) {
        self.stale = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_cycles_through_slots() {
        for slots in 1..=4 {
            let mut counter = FrameCounter::new(slots);
            for n in 0..(3 * slots + 1) {
                assert_eq!(counter.index(), n % slots);
                counter.advance();
            }
        }
    }

    #[test]
    fn counter_advance_n_is_modular() {
        let mut counter = FrameCounter::new(2);
        counter.advance();
        let start = counter.index();
        for _ in 0..7 {
            counter.advance();
        }
        assert_eq!(counter.index(), (start + 7) % 2);
    }

    #[test]
    fn out_of_date_acquire_is_recoverable() {
        assert_eq!(
            classify_acquire(Ok((2, vk::SuccessCode::SUCCESS))).unwrap(),
            Acquired::Image(2)
        );
        assert_eq!(
            classify_acquire(Ok((1, vk::SuccessCode::SUBOPTIMAL_KHR))).unwrap(),
            Acquired::Image(1)
        );
        assert_eq!(
            classify_acquire(Err(vk::ErrorCode::OUT_OF_DATE_KHR)).unwrap(),
            Acquired::Stale
        );
    }

    #[test]
    fn other_acquire_errors_are_fatal() {
        let error = classify_acquire(Err(vk::ErrorCode::DEVICE_LOST)).unwrap_err();
        assert!(matches!(
            error.downcast_ref::<RenderError>(),
            Some(RenderError::GpuOperationFailed {
                code: vk::ErrorCode::DEVICE_LOST,
                ..
            })
        ));
    }

    #[test]
    fn present_requests_rebuild_when_stale_or_resized() {
        assert!(!classify_present(Ok(vk::SuccessCode::SUCCESS), false).unwrap());
        assert!(classify_present(Ok(vk::SuccessCode::SUCCESS), true).unwrap());
        assert!(classify_present(Ok(vk::SuccessCode::SUBOPTIMAL_KHR), false).unwrap());
        assert!(classify_present(Err(vk::ErrorCode::OUT_OF_DATE_KHR), false).unwrap());
        assert!(classify_present(Err(vk::ErrorCode::SURFACE_LOST_KHR), false).is_err());
    }

    #[test]
    fn rebuild_waits_for_a_window_with_area() {
        let mut chain = ChainState::default();
        assert!(!chain.is_stale());

        let hidden = vk::Extent2D {
            width: 0,
            height: 0,
        };
        assert!(!chain.begin_rebuild(hidden));
        assert!(chain.is_stale());
        assert!(!chain.begin_rebuild(vk::Extent2D {
            width: 640,
            height: 0,
        }));
        assert!(chain.is_stale());

        let restored = vk::Extent2D {
            width: 640,
            height: 480,
        };
        assert!(chain.begin_rebuild(restored));
        chain.rebuilt();
        assert!(!chain.is_stale());
    }
}
