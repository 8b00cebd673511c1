use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use futures::{
    FutureExt,
    channel::oneshot,
    future::{Map, Shared},
};

type AbortReceiver = Shared<oneshot::Receiver<()>>;

/// Future returned by [`AbortSignal::aborted`].
pub type Aborted = Map<AbortReceiver, fn(Result<(), oneshot::Canceled>)>;

struct AbortState {
    aborted: Cell<bool>,
    completer: RefCell<Option<oneshot::Sender<()>>>,
    receiver: AbortReceiver,
    listeners: RefCell<Vec<Box<dyn FnOnce()>>>,
}

/// Owner side of a cancellation pair. Dropping the controller does not abort.
pub struct AbortController {
    state: Rc<AbortState>,
}

#[derive(Clone)]
pub struct AbortSignal {
    state: Rc<AbortState>,
}

impl AbortController {
    pub fn new() -> AbortController {
        let (completer, receiver) = oneshot::channel();
        AbortController {
            state: Rc::new(AbortState {
                aborted: Cell::new(false),
                completer: RefCell::new(Some(completer)),
                receiver: receiver.shared(),
                listeners: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            state: Rc::clone(&self.state),
        }
    }

    pub fn abort(&self) {
        if self.state.aborted.replace(true) {
            return;
        }

        if let Some(completer) = self.state.completer.borrow_mut().take() {
            let _ = completer.send(());
        }

        let listeners = std::mem::take(&mut *self.state.listeners.borrow_mut());
        for listener in listeners {
            listener();
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.state.aborted.get()
    }
}

impl Default for AbortController {
    fn default() -> Self {
        Self::new()
    }
}

impl AbortSignal {
    pub fn is_aborted(&self) -> bool {
        self.state.aborted.get()
    }

    /// Runs `listener` once the signal fires, or right away if it already has.
    pub fn on_abort(&self, listener: impl FnOnce() + 'static) {
        if self.is_aborted() {
            listener();
        } else {
            self.state.listeners.borrow_mut().push(Box::new(listener));
        }
    }

    /// Future that resolves when the signal fires.
    pub fn aborted(&self) -> Aborted {
        fn ignore(_: Result<(), oneshot::Canceled>) {}
        self.state.receiver.clone().map(ignore as fn(_))
    }
}
