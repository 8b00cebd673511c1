use std::{
    cell::{Cell, RefCell},
    rc::{Rc, Weak},
};

use log::warn;
use wasm_bindgen::{JsCast, prelude::Closure};

use crate::{
    error::{PlayerError, PlayerResult},
    player::frame_loop::{FrameCallback, FrameScheduler, FrameTask},
};

type FrameClosure = Rc<RefCell<Option<Closure<dyn FnMut()>>>>;

struct LoopState {
    tick: RefCell<FrameCallback>,
    handle: Cell<Option<i32>>,
    active: Cell<bool>,
    in_frame: Cell<bool>,
}

/// `requestAnimationFrame`-driven loops.
#[derive(Default)]
pub struct AnimationFrames;

impl FrameScheduler for AnimationFrames {
    type Task = AnimationFrameTask;

    fn start(&self, tick: FrameCallback) -> PlayerResult<AnimationFrameTask> {
        let state = Rc::new(LoopState {
            tick: RefCell::new(tick),
            handle: Cell::new(None),
            active: Cell::new(true),
            in_frame: Cell::new(false),
        });
        let closure: FrameClosure = Rc::new(RefCell::new(None));

        let loop_state = Rc::clone(&state);
        let loop_closure = Rc::downgrade(&closure);
        *closure.borrow_mut() = Some(Closure::<dyn FnMut()>::new(move || {
            run_frame(&loop_state, &loop_closure);
        }));

        state.handle.set(Some(request_frame(&closure)?));

        Ok(AnimationFrameTask { state, closure })
    }
}

fn run_frame(state: &LoopState, closure: &Weak<RefCell<Option<Closure<dyn FnMut()>>>>) {
    state.handle.set(None);
    if !state.active.get() {
        return;
    }

    // The tick may cancel this loop, so nothing else is borrowed while it runs.
    state.in_frame.set(true);
    let keep_going = match state.tick.try_borrow_mut() {
        Ok(mut tick) => (*tick)(),
        Err(_) => false,
    };
    state.in_frame.set(false);

    if !keep_going || !state.active.get() {
        state.active.set(false);
        return;
    }
    let Some(closure) = closure.upgrade() else {
        state.active.set(false);
        return;
    };
    match request_frame(&closure) {
        Ok(handle) => state.handle.set(Some(handle)),
        Err(err) => {
            warn!("Frame loop stopped: {}", err);
            state.active.set(false);
        }
    }
}

fn request_frame(closure: &FrameClosure) -> PlayerResult<i32> {
    let window = web_sys::window().ok_or_else(|| PlayerError::new("No window".to_string()))?;
    let closure = closure.borrow();
    let Some(callback) = closure.as_ref() else {
        return Err(PlayerError::new("Frame callback released".to_string()));
    };
    Ok(window.request_animation_frame(callback.as_ref().unchecked_ref())?)
}

pub struct AnimationFrameTask {
    state: Rc<LoopState>,
    closure: FrameClosure,
}

impl FrameTask for AnimationFrameTask {
    fn cancel(&mut self) {
        self.state.active.set(false);
        if let (Some(handle), Some(window)) = (self.state.handle.take(), web_sys::window()) {
            let _ = window.cancel_animation_frame(handle);
        }

        let Some(closure) = self.closure.borrow_mut().take() else {
            return;
        };
        if self.state.in_frame.get() {
            // Cancelled from inside its own callback: free it after the frame.
            wasm_bindgen_futures::spawn_local(async move { drop(closure) });
        }
    }

    fn is_active(&self) -> bool {
        self.state.active.get()
    }
}

impl Drop for AnimationFrameTask {
    fn drop(&mut self) {
        self.cancel();
    }
}
