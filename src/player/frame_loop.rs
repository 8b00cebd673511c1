use crate::error::PlayerResult;

/// Work run once per display frame. Returning `false` ends the loop.
pub type FrameCallback = Box<dyn FnMut() -> bool>;

/// Source of per-frame callbacks (requestAnimationFrame in the browser).
pub trait FrameScheduler {
    type Task: FrameTask;

    /// Starts a repeating task that yields between iterations.
    fn start(&self, tick: FrameCallback) -> PlayerResult<Self::Task>;
}

pub trait FrameTask {
    /// Stops the loop. Calling it more than once is harmless.
    fn cancel(&mut self);

    fn is_active(&self) -> bool;
}
