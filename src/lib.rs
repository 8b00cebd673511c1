pub mod config;
pub mod error;
mod js_api;
pub mod player;
mod utils;
pub mod web;

use std::{cell::RefCell, rc::Rc};

use js_api::{JsApi, Notification};
use log::{Level, warn};
use url::Url;
use utils::{init_logging, set_panic_hook};
use wasm_bindgen::prelude::*;

pub use config::{AnalyzerOptions, LessonConfig};
pub use error::{PlayerError, PlayerErrorCode, PlayerResult};

use player::{
    LipSyncPlayer,
    animation::mouth_value,
    net_task::{resolve_source_url, sanitize_base_path},
    playback::MediaEvent,
};
use web::{
    WebPlatform,
    media::{LessonAudioElement, MediaListeners},
    rive::RiveStateMachine,
};

struct MountedLesson {
    player: LipSyncPlayer<WebPlatform>,
    _media_listeners: MediaListeners,
}

thread_local! {
    static LESSON: RefCell<Option<MountedLesson>> = const { RefCell::new(None) };
    static BASE_PATH: RefCell<Option<Url>> = const { RefCell::new(None) };
}

// Notifications raised while the lesson is borrowed are delivered once the
// borrow ends.
fn with_player<R>(f: impl FnOnce(&LipSyncPlayer<WebPlatform>) -> R) -> Option<R> {
    let result = LESSON.with(|lesson| match lesson.try_borrow() {
        Ok(lesson) => lesson.as_ref().map(|mounted| f(&mounted.player)),
        Err(_) => {
            warn!("Lesson is busy");
            None
        }
    });
    flush_notifications();
    result
}

fn with_player_mut<R>(f: impl FnOnce(&mut LipSyncPlayer<WebPlatform>) -> R) -> Option<R> {
    let result = LESSON.with(|lesson| match lesson.try_borrow_mut() {
        Ok(mut lesson) => lesson.as_mut().map(|mounted| f(&mut mounted.player)),
        Err(_) => {
            warn!("Lesson is busy");
            None
        }
    });
    flush_notifications();
    result
}

fn lesson_busy() -> bool {
    LESSON.with(|lesson| lesson.try_borrow_mut().is_err())
}

fn notify(notification: Notification) {
    JsApi::notify(notification, lesson_busy());
}

fn flush_notifications() {
    if !lesson_busy() {
        JsApi::flush_notifications();
    }
}

fn resolve_audio_src(src: &str) -> PlayerResult<String> {
    BASE_PATH.with(|base_path| resolve_source_url(src, base_path.borrow().as_ref()))
}

#[wasm_bindgen]
pub fn set_base_path(path: String) -> Result<(), JsValue> {
    let base_path = sanitize_base_path(&path)?;
    BASE_PATH.with(|value| *value.borrow_mut() = Some(base_path));
    Ok(())
}

/// Mounts a lesson from its JSON config and starts downloading its audio.
/// Replaces any lesson already mounted.
#[wasm_bindgen]
pub fn mount_lesson(config_json: String, audio: web_sys::HtmlAudioElement) -> Result<(), JsValue> {
    let previous = LESSON.with(|lesson| lesson.borrow_mut().take());
    drop(previous);

    let mut config = LessonConfig::from_json(&config_json)?;
    config.audio_src = resolve_audio_src(&config.audio_src)?;

    let mut player = LipSyncPlayer::<WebPlatform>::new(config, web::services())?;
    player
        .download_state()
        .subscribe(|state| notify(Notification::DownloadStateChanged(state.clone())));
    player
        .talking()
        .subscribe(|talking| notify(Notification::TalkingChanged(*talking)));
    player.amplitude().subscribe(|amplitude| {
        notify(Notification::AmplitudeChanged {
            amplitude: *amplitude,
            mouth_open: mouth_value(*amplitude) > 0.0,
        })
    });

    let element = LessonAudioElement::new(audio);
    player.attach_element(element.clone())?;
    let media_listeners = element.listen(Rc::new(|event: MediaEvent| {
        with_player(|player| player.handle_media_event(event));
    }))?;

    player.load()?;
    notify(Notification::DownloadStateChanged(
        player.download_state().get(),
    ));

    LESSON.with(|lesson| {
        *lesson.borrow_mut() = Some(MountedLesson {
            player,
            _media_listeners: media_listeners,
        })
    });
    Ok(())
}

/// Binds the loaded Rive instance that drives the character.
#[wasm_bindgen]
pub fn bind_character(rive: JsValue) {
    with_player_mut(|player| {
        let state_machine = player.config().state_machine.clone();
        player.bind_animation(RiveStateMachine::new(rive, &state_machine));
    });
}

#[wasm_bindgen]
pub fn unbind_character() {
    with_player_mut(|player| player.unbind_animation());
}

#[wasm_bindgen]
pub fn set_audio_source(src: String) -> Result<(), JsValue> {
    let src = resolve_audio_src(&src)?;
    with_player_mut(|player| player.set_source(&src)).transpose()?;
    Ok(())
}

#[wasm_bindgen]
pub async fn play() -> Result<(), JsValue> {
    let play = with_player(|player| player.play());
    if let Some(play) = play {
        play.await?;
    }
    Ok(())
}

#[wasm_bindgen]
pub fn pause() {
    with_player(|player| player.pause());
}

#[wasm_bindgen]
pub fn unmount_lesson() {
    let previous = LESSON.with(|lesson| lesson.borrow_mut().take());
    drop(previous);
}

#[wasm_bindgen]
pub fn progress_text() -> Option<String> {
    with_player(|player| player.progress_text()).flatten()
}

#[wasm_bindgen]
pub fn error_text() -> Option<String> {
    with_player(|player| player.error_text()).flatten()
}

#[wasm_bindgen]
pub fn amplitude() -> f32 {
    with_player(|player| player.amplitude().get()).unwrap_or(0.0)
}

#[wasm_bindgen]
pub fn amplitude_text() -> String {
    with_player(|player| player.amplitude_text()).unwrap_or_else(|| "amp: 0.000".to_string())
}

#[wasm_bindgen]
pub fn is_talking() -> bool {
    with_player(|player| player.talking().get()).unwrap_or(false)
}

#[wasm_bindgen]
pub fn can_play() -> bool {
    with_player(|player| player.can_play()).unwrap_or(false)
}

#[wasm_bindgen(start)]
pub fn main() {
    set_panic_hook();
    init_logging(Level::Info);
}
