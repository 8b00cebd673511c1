use std::{cell::RefCell, rc::Rc};

use futures::{FutureExt, future::LocalBoxFuture};
use js_sys::Object;
use log::warn;
use manual_future::ManualFuture;
use wasm_bindgen::{JsCast, prelude::Closure};
use wasm_bindgen_futures::JsFuture;
use web_sys::{HtmlAudioElement, HtmlMediaElement};

use crate::{
    error::{PlayerError, PlayerResult},
    player::playback::{HAVE_METADATA, MediaElement, MediaEvent},
};

#[derive(Clone, PartialEq)]
pub struct LessonAudioElement {
    element: HtmlAudioElement,
}

impl LessonAudioElement {
    pub fn new(element: HtmlAudioElement) -> LessonAudioElement {
        LessonAudioElement { element }
    }

    pub fn as_media_element(&self) -> &HtmlMediaElement {
        &self.element
    }

    pub fn as_object(&self) -> &Object {
        self.element.unchecked_ref()
    }

    /// Forwards play/pause/ended to `handler` until the returned guard drops.
    pub fn listen(&self, handler: Rc<dyn Fn(MediaEvent)>) -> PlayerResult<MediaListeners> {
        let mut listeners = MediaListeners {
            element: self.element.clone(),
            closures: Vec::new(),
        };
        for (event_name, event) in [
            ("play", MediaEvent::Play),
            ("pause", MediaEvent::Pause),
            ("ended", MediaEvent::Ended),
        ] {
            let handler = Rc::clone(&handler);
            let closure = Closure::<dyn FnMut()>::new(move || handler(event));
            self.element
                .add_event_listener_with_callback(event_name, closure.as_ref().unchecked_ref())?;
            listeners.closures.push((event_name, closure));
        }
        Ok(listeners)
    }
}

pub struct MediaListeners {
    element: HtmlAudioElement,
    closures: Vec<(&'static str, Closure<dyn FnMut()>)>,
}

impl Drop for MediaListeners {
    fn drop(&mut self) {
        for (event_name, closure) in self.closures.drain(..) {
            let _ = self
                .element
                .remove_event_listener_with_callback(event_name, closure.as_ref().unchecked_ref());
        }
    }
}

/// Listeners for a single metadata wait, removed when the wait ends or is
/// dropped.
struct OnceListeners {
    element: HtmlAudioElement,
    events: Vec<&'static str>,
    callback: Closure<dyn FnMut()>,
}

impl Drop for OnceListeners {
    fn drop(&mut self) {
        for event_name in self.events.drain(..) {
            let _ = self.element.remove_event_listener_with_callback(
                event_name,
                self.callback.as_ref().unchecked_ref(),
            );
        }
    }
}

impl MediaElement for LessonAudioElement {
    fn src(&self) -> String {
        self.element.src()
    }

    fn set_src(&self, src: &str) {
        self.element.set_src(src);
    }

    fn clear_src(&self) {
        let _ = self.element.remove_attribute("src");
        self.element.load();
    }

    fn ready_state(&self) -> u16 {
        self.element.ready_state()
    }

    fn is_paused(&self) -> bool {
        self.element.paused()
    }

    fn metadata_ready(&self) -> LocalBoxFuture<'static, ()> {
        if self.element.ready_state() >= HAVE_METADATA {
            return async {}.boxed_local();
        }

        let (future, completer) = ManualFuture::<()>::new();
        let completer = RefCell::new(Some(completer));
        let callback = Closure::<dyn FnMut()>::new(move || {
            if let Some(completer) = completer.borrow_mut().take() {
                async_std::task::spawn_local(async move {
                    completer.complete(()).await;
                });
            }
        });

        // An undecodable source never reaches HAVE_METADATA; `error` lets
        // `play` run and report it.
        let mut guard = OnceListeners {
            element: self.element.clone(),
            events: Vec::new(),
            callback,
        };
        for event_name in ["loadedmetadata", "error"] {
            if let Err(err) = self.element.add_event_listener_with_callback(
                event_name,
                guard.callback.as_ref().unchecked_ref(),
            ) {
                warn!("Cannot wait for metadata: {}", PlayerError::from(err));
                return async {}.boxed_local();
            }
            guard.events.push(event_name);
        }

        async move {
            future.await;
            drop(guard);
        }
        .boxed_local()
    }

    fn play(&self) -> LocalBoxFuture<'static, PlayerResult<()>> {
        let promise = self.element.play();
        async move {
            JsFuture::from(promise?)
                .await
                .map_err(|err| PlayerError::playback(PlayerError::from(err).message))?;
            Ok(())
        }
        .boxed_local()
    }

    fn pause(&self) {
        let _ = self.element.pause();
    }
}
