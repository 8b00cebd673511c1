pub mod audio;
pub mod blob;
pub mod fetch;
pub mod frames;
pub mod media;
pub mod rive;

use std::rc::Rc;

use futures::task::{LocalFutureObj, LocalSpawn, SpawnError};

use crate::player::{Platform, PlatformServices, amplitude::SharedAudio};

use audio::{JsWeakSourceCache, WebAudioContext};
use blob::ObjectUrlStore;
use fetch::FetchTransport;
use frames::AnimationFrames;
use media::LessonAudioElement;
use rive::RiveStateMachine;

pub struct WebPlatform;

impl Platform for WebPlatform {
    type Transport = FetchTransport;
    type Store = ObjectUrlStore;
    type Media = LessonAudioElement;
    type Context = WebAudioContext;
    type Frames = AnimationFrames;
    type Animation = RiveStateMachine;
}

/// Spawns onto the browser's microtask queue.
pub struct WasmSpawner;

impl LocalSpawn for WasmSpawner {
    fn spawn_local_obj(&self, future: LocalFutureObj<'static, ()>) -> Result<(), SpawnError> {
        async_std::task::spawn_local(future);
        Ok(())
    }
}

thread_local! {
    // One context per page; browsers cap how many can be open.
    static SHARED_AUDIO: Rc<SharedAudio<WebAudioContext>> =
        Rc::new(SharedAudio::new(WebAudioContext::create, JsWeakSourceCache::new()));
}

pub fn shared_audio() -> Rc<SharedAudio<WebAudioContext>> {
    SHARED_AUDIO.with(Rc::clone)
}

pub fn services() -> PlatformServices<WebPlatform> {
    PlatformServices {
        transport: Rc::new(FetchTransport),
        store: Rc::new(ObjectUrlStore),
        audio: shared_audio(),
        frames: AnimationFrames,
        spawner: Rc::new(WasmSpawner),
    }
}
