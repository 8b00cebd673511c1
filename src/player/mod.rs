pub mod abort;
pub mod amplitude;
pub mod animation;
pub mod download;
pub mod frame_loop;
pub mod net_task;
pub mod playback;
pub mod signal;

use std::{cell::RefCell, rc::Rc};

use futures::{future::LocalBoxFuture, task::LocalSpawn};
use log::debug;

use crate::{
    config::LessonConfig,
    error::{PlayerError, PlayerResult},
};

use amplitude::{AmplitudeAnalyzer, AudioContextBackend, SharedAudio};
use animation::{AnimationBridge, StateMachineInputs};
use download::DownloadState;
use frame_loop::FrameScheduler;
use net_task::{ResourceStore, Transport};
use playback::{MediaElement, MediaEvent, PlaybackController};
use signal::{ListenerId, Signal};

/// The set of capabilities a host environment provides to the player.
pub trait Platform: 'static {
    type Transport: Transport + 'static;
    type Store: ResourceStore + 'static;
    type Media: MediaElement + Clone + PartialEq + 'static;
    type Context: AudioContextBackend<Element = Self::Media> + 'static;
    type Frames: FrameScheduler + 'static;
    type Animation: StateMachineInputs + 'static;
}

pub struct PlatformServices<P: Platform> {
    pub transport: Rc<P::Transport>,
    pub store: Rc<P::Store>,
    pub audio: Rc<SharedAudio<P::Context>>,
    pub frames: P::Frames,
    pub spawner: Rc<dyn LocalSpawn>,
}

/// One lesson's audio-to-animation pipeline: download, playback, amplitude
/// analysis and the character's state machine inputs.
pub struct LipSyncPlayer<P: Platform> {
    config: LessonConfig,
    controller: PlaybackController<P::Transport, P::Store, P::Media>,
    analyzer: AmplitudeAnalyzer<P::Context, P::Frames>,
    bridge: Rc<RefCell<AnimationBridge<P::Animation>>>,
    amplitude_listener: ListenerId,
    talking_listener: ListenerId,
}

impl<P: Platform> LipSyncPlayer<P> {
    pub fn new(config: LessonConfig, services: PlatformServices<P>) -> PlayerResult<Self> {
        config.validate()?;

        let controller =
            PlaybackController::new(services.transport, services.store, services.spawner);
        let analyzer = AmplitudeAnalyzer::new(services.audio, services.frames, config.analyzer);
        let bridge = Rc::new(RefCell::new(AnimationBridge::new(config.binding())));

        let amplitude_bridge = Rc::clone(&bridge);
        let amplitude_listener = analyzer.amplitude().subscribe(move |amplitude| {
            amplitude_bridge.borrow_mut().update_amplitude(*amplitude);
        });
        let talking_bridge = Rc::clone(&bridge);
        let talking_listener = controller.talking().subscribe(move |talking| {
            talking_bridge.borrow_mut().update_talking(*talking);
        });

        Ok(LipSyncPlayer {
            config,
            controller,
            analyzer,
            bridge,
            amplitude_listener,
            talking_listener,
        })
    }

    pub fn config(&self) -> &LessonConfig {
        &self.config
    }

    /// Attaches the audio element and taps it for amplitude.
    pub fn attach_element(&mut self, element: P::Media) -> PlayerResult<()> {
        self.analyzer.connect(&element)?;
        self.controller.attach_element(element);
        Ok(())
    }

    pub fn bind_animation(&mut self, runtime: P::Animation) {
        self.bridge.borrow_mut().bind(runtime);
    }

    pub fn unbind_animation(&mut self) -> Option<P::Animation> {
        self.bridge.borrow_mut().unbind()
    }

    /// Starts downloading `audio_src`; replaces any running session.
    pub fn set_source(&mut self, audio_src: &str) -> PlayerResult<()> {
        if audio_src.trim().is_empty() {
            return Err(PlayerError::invalid_config("audioSrc must not be empty"));
        }
        if self.controller.current_source() == Some(audio_src) {
            return Ok(());
        }
        self.config.audio_src = audio_src.to_owned();
        self.controller.load_source(audio_src)
    }

    /// Starts the download for the configured audio source.
    pub fn load(&mut self) -> PlayerResult<()> {
        let audio_src = self.config.audio_src.clone();
        self.controller.load_source(&audio_src)
    }

    pub fn play(&self) -> LocalBoxFuture<'static, PlayerResult<()>> {
        self.controller.play(self.analyzer.resume_context())
    }

    pub fn pause(&self) {
        self.controller.pause();
    }

    pub fn handle_media_event(&self, event: MediaEvent) {
        self.controller.handle_media_event(event);
    }

    pub fn download_state(&self) -> &Signal<DownloadState> {
        self.controller.download_state()
    }

    pub fn amplitude(&self) -> &Signal<f32> {
        self.analyzer.amplitude()
    }

    pub fn talking(&self) -> &Signal<bool> {
        self.controller.talking()
    }

    pub fn can_play(&self) -> bool {
        self.download_state().get().is_ready()
    }

    pub fn progress_text(&self) -> Option<String> {
        self.download_state().get().progress_text()
    }

    pub fn error_text(&self) -> Option<String> {
        self.download_state().get().error_text()
    }

    pub fn amplitude_text(&self) -> String {
        format!("amp: {:.3}", self.amplitude().get())
    }

    pub fn is_sampling(&self) -> bool {
        self.analyzer.is_sampling()
    }

    /// Tears the lesson down: cancels the download, releases the resource and
    /// stops sampling.
    pub fn unmount(&mut self) {
        debug!("Unmounting lesson {}", self.config.audio_src);
        self.controller.end_session();
        self.analyzer.disconnect();
    }
}

impl<P: Platform> Drop for LipSyncPlayer<P> {
    fn drop(&mut self) {
        self.unmount();
        self.analyzer.amplitude().unsubscribe(self.amplitude_listener);
        self.controller.talking().unsubscribe(self.talking_listener);
    }
}
