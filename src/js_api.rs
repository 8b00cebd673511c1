use std::{cell::RefCell, collections::VecDeque};

use js_sys::{Object, Reflect};
use wasm_bindgen::prelude::*;

use crate::player::download::DownloadState;

pub fn safe_string(s: &str) -> String {
    String::from_utf8_lossy(s.as_bytes()).into_owned()
}

pub fn safe_js_string(s: &str) -> JsValue {
    JsValue::from_str(&safe_string(s))
}

#[allow(non_snake_case)]
#[wasm_bindgen(module = "saylo-js-api")]
extern "C" {
    pub fn onDownloadStateChanged(snapshot: Object);
    pub fn onTalkingChanged(is_talking: bool);
    pub fn onAmplitudeChanged(amplitude: f32, mouth_open: bool);
}

/// Something the page is told about.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    DownloadStateChanged(DownloadState),
    TalkingChanged(bool),
    AmplitudeChanged { amplitude: f32, mouth_open: bool },
}

impl Notification {
    fn dispatch(self) {
        match self {
            Notification::DownloadStateChanged(state) => {
                JsApi::dispatch_download_state_changed(&state)
            }
            Notification::TalkingChanged(is_talking) => JsApi::dispatch_talking_changed(is_talking),
            Notification::AmplitudeChanged {
                amplitude,
                mouth_open,
            } => JsApi::dispatch_amplitude_changed(amplitude, mouth_open),
        }
    }
}

/// FIFO of outbound items. Items sent while the receiver is busy wait for the
/// next flush; delivery never holds a borrow of the queue.
pub struct OutboundQueue<T> {
    pending: RefCell<VecDeque<T>>,
}

impl<T> OutboundQueue<T> {
    pub const fn new() -> OutboundQueue<T> {
        OutboundQueue {
            pending: RefCell::new(VecDeque::new()),
        }
    }

    pub fn send(&self, item: T, busy: bool, deliver: impl Fn(T)) {
        self.pending.borrow_mut().push_back(item);
        if !busy {
            self.flush(deliver);
        }
    }

    pub fn flush(&self, deliver: impl Fn(T)) {
        loop {
            let next = self.pending.borrow_mut().pop_front();
            let Some(item) = next else {
                break;
            };
            deliver(item);
        }
    }
}

impl<T> Default for OutboundQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

thread_local! {
    static OUTBOX: OutboundQueue<Notification> = const { OutboundQueue::new() };
}

pub struct JsApi {}

impl JsApi {
    /// Delivers `notification` now, or after the lesson is released when
    /// `lesson_busy` is set.
    pub fn notify(notification: Notification, lesson_busy: bool) {
        OUTBOX.with(|outbox| outbox.send(notification, lesson_busy, Notification::dispatch));
    }

    pub fn flush_notifications() {
        OUTBOX.with(|outbox| outbox.flush(Notification::dispatch));
    }

    pub fn dispatch_download_state_changed(state: &DownloadState) {
        onDownloadStateChanged(download_state_snapshot(state));
    }

    pub fn dispatch_talking_changed(is_talking: bool) {
        onTalkingChanged(is_talking);
    }

    pub fn dispatch_amplitude_changed(amplitude: f32, mouth_open: bool) {
        onAmplitudeChanged(amplitude, mouth_open);
    }
}

fn download_state_snapshot(state: &DownloadState) -> Object {
    let snapshot = Object::new();
    let set = |key: &str, value: JsValue| {
        let _ = Reflect::set(&snapshot, &JsValue::from_str(key), &value);
    };

    set("status", JsValue::from_str(state.status()));
    set(
        "progress",
        state
            .progress()
            .and_then(|progress| progress.fraction())
            .map(JsValue::from_f64)
            .unwrap_or(JsValue::NULL),
    );
    set(
        "objectUrl",
        state
            .resource()
            .map(|resource| safe_js_string(resource.url()))
            .unwrap_or(JsValue::NULL),
    );
    set(
        "error",
        state
            .error_text()
            .map(|text| safe_js_string(&text))
            .unwrap_or(JsValue::NULL),
    );
    set(
        "label",
        state
            .progress_text()
            .map(|text| safe_js_string(&text))
            .unwrap_or(JsValue::NULL),
    );
    snapshot
}
