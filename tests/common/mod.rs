#![allow(dead_code)]

use std::{
    cell::{Cell, RefCell},
    collections::{HashMap, VecDeque},
    rc::{Rc, Weak},
};

use futures::{
    FutureExt, StreamExt,
    channel::{mpsc, oneshot},
    executor::LocalPool,
    future::LocalBoxFuture,
};
use saylo_lipsync::{
    LessonConfig, PlayerError, PlayerResult,
    player::{
        LipSyncPlayer, Platform, PlatformServices,
        abort::AbortSignal,
        amplitude::{
            AnalyserBackend, AudioContextBackend, SharedAudio, WeakHandle, WeakSourceRegistry,
        },
        animation::StateMachineInputs,
        frame_loop::{FrameCallback, FrameScheduler, FrameTask},
        net_task::{FetchResponse, ResourceHandle, ResourceStore, ResponseBody, Transport},
        playback::{HAVE_METADATA, MediaElement},
    },
};

// Transport

enum ScriptedBody {
    Stream(mpsc::UnboundedReceiver<PlayerResult<Vec<u8>>>),
    Buffered(Vec<u8>),
}

enum Scripted {
    Response {
        status: u16,
        content_length: Option<u64>,
        content_type: Option<String>,
        body: ScriptedBody,
    },
    Failure(PlayerError),
}

/// Feeds a streamed response body chunk by chunk.
pub struct ChunkSender {
    sender: mpsc::UnboundedSender<PlayerResult<Vec<u8>>>,
}

impl ChunkSender {
    pub fn send(&self, chunk: Vec<u8>) {
        let _ = self.sender.unbounded_send(Ok(chunk));
    }

    pub fn fail(&self, error: PlayerError) {
        let _ = self.sender.unbounded_send(Err(error));
    }

    pub fn finish(self) {
        self.sender.close_channel();
    }
}

#[derive(Default)]
pub struct ScriptedTransport {
    routes: RefCell<HashMap<String, VecDeque<Scripted>>>,
    requests: RefCell<Vec<String>>,
    signals: RefCell<Vec<AbortSignal>>,
}

impl ScriptedTransport {
    pub fn stream(&self, url: &str, status: u16, content_length: Option<u64>) -> ChunkSender {
        let (sender, receiver) = mpsc::unbounded();
        self.push(
            url,
            Scripted::Response {
                status,
                content_length,
                content_type: Some("audio/mpeg".to_string()),
                body: ScriptedBody::Stream(receiver),
            },
        );
        ChunkSender { sender }
    }

    pub fn buffered(&self, url: &str, content_type: Option<&str>, payload: Vec<u8>) {
        self.push(
            url,
            Scripted::Response {
                status: 200,
                content_length: Some(payload.len() as u64),
                content_type: content_type.map(str::to_string),
                body: ScriptedBody::Buffered(payload),
            },
        );
    }

    pub fn fail(&self, url: &str, error: PlayerError) {
        self.push(url, Scripted::Failure(error));
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.borrow().clone()
    }

    pub fn signals(&self) -> Vec<AbortSignal> {
        self.signals.borrow().clone()
    }

    pub fn last_signal(&self) -> Option<AbortSignal> {
        self.signals.borrow().last().cloned()
    }

    fn push(&self, url: &str, scripted: Scripted) {
        self.routes
            .borrow_mut()
            .entry(url.to_string())
            .or_default()
            .push_back(scripted);
    }
}

impl Transport for ScriptedTransport {
    fn fetch(
        &self,
        url: &str,
        signal: &AbortSignal,
    ) -> LocalBoxFuture<'static, PlayerResult<FetchResponse>> {
        self.requests.borrow_mut().push(url.to_string());
        self.signals.borrow_mut().push(signal.clone());

        let scripted = self
            .routes
            .borrow_mut()
            .get_mut(url)
            .and_then(|queue| queue.pop_front());
        let result = match scripted {
            Some(Scripted::Response {
                status,
                content_length,
                content_type,
                body,
            }) => Ok(FetchResponse {
                status,
                content_length,
                content_type,
                body: match body {
                    ScriptedBody::Stream(receiver) => ResponseBody::Stream(receiver.boxed_local()),
                    ScriptedBody::Buffered(payload) => {
                        ResponseBody::Buffered(async move { Ok(payload) }.boxed_local())
                    }
                },
            }),
            Some(Scripted::Failure(error)) => Err(error),
            None => Err(PlayerError::new(format!("No route for {}", url))),
        };
        async move { result }.boxed_local()
    }
}

// Resource store

#[derive(Default)]
pub struct MemoryStore {
    next_id: Cell<usize>,
    created: RefCell<Vec<(ResourceHandle, Vec<u8>, String)>>,
    released: RefCell<Vec<ResourceHandle>>,
}

impl MemoryStore {
    pub fn created(&self) -> Vec<ResourceHandle> {
        self.created
            .borrow()
            .iter()
            .map(|(handle, _, _)| handle.clone())
            .collect()
    }

    pub fn contents(&self, handle: &ResourceHandle) -> Option<(Vec<u8>, String)> {
        self.created
            .borrow()
            .iter()
            .find(|(created, _, _)| created == handle)
            .map(|(_, bytes, content_type)| (bytes.clone(), content_type.clone()))
    }

    pub fn released(&self) -> Vec<ResourceHandle> {
        self.released.borrow().clone()
    }

    pub fn live(&self) -> usize {
        self.created.borrow().len() - self.released.borrow().len()
    }
}

impl ResourceStore for MemoryStore {
    fn create(&self, parts: &[Vec<u8>], content_type: &str) -> PlayerResult<ResourceHandle> {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        let handle = ResourceHandle::new(format!("blob:memory/{}", id));
        self.created
            .borrow_mut()
            .push((handle.clone(), parts.concat(), content_type.to_string()));
        Ok(handle)
    }

    fn release(&self, handle: &ResourceHandle) -> PlayerResult<()> {
        self.released.borrow_mut().push(handle.clone());
        Ok(())
    }
}

// Media element

pub struct MediaState {
    src: RefCell<String>,
    ready_state: Cell<u16>,
    paused: Cell<bool>,
    loads_on_src: Cell<bool>,
    refuse_play: RefCell<Option<String>>,
    metadata: RefCell<Vec<oneshot::Sender<()>>>,
    calls: RefCell<Vec<String>>,
}

/// Element handle with identity equality, like a DOM node reference.
#[derive(Clone)]
pub struct FakeMedia(Rc<MediaState>);

impl PartialEq for FakeMedia {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl FakeMedia {
    pub fn new() -> FakeMedia {
        FakeMedia(Rc::new(MediaState {
            src: RefCell::new(String::new()),
            ready_state: Cell::new(0),
            paused: Cell::new(true),
            loads_on_src: Cell::new(true),
            refuse_play: RefCell::new(None),
            metadata: RefCell::new(Vec::new()),
            calls: RefCell::new(Vec::new()),
        }))
    }

    /// Keeps `ready_state` at zero after `set_src` until
    /// [`FakeMedia::load_metadata`] is called.
    pub fn hold_metadata(&self) {
        self.0.loads_on_src.set(false);
    }

    pub fn load_metadata(&self) {
        self.0.ready_state.set(HAVE_METADATA);
        for sender in self.0.metadata.borrow_mut().drain(..) {
            let _ = sender.send(());
        }
    }

    pub fn refuse_play(&self, reason: &str) {
        *self.0.refuse_play.borrow_mut() = Some(reason.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.calls.borrow().clone()
    }

    fn record(&self, call: String) {
        self.0.calls.borrow_mut().push(call);
    }
}

impl WeakHandle for FakeMedia {
    type Weak = Weak<MediaState>;

    fn downgrade(&self) -> Weak<MediaState> {
        Rc::downgrade(&self.0)
    }

    fn is_same(&self, weak: &Weak<MediaState>) -> bool {
        std::ptr::eq(Rc::as_ptr(&self.0), weak.as_ptr())
    }

    fn is_expired(weak: &Weak<MediaState>) -> bool {
        weak.strong_count() == 0
    }
}

impl MediaElement for FakeMedia {
    fn src(&self) -> String {
        self.0.src.borrow().clone()
    }

    fn set_src(&self, src: &str) {
        self.record(format!("set_src {}", src));
        *self.0.src.borrow_mut() = src.to_string();
        self.0.ready_state.set(0);
        if self.0.loads_on_src.get() {
            self.load_metadata();
        }
    }

    fn clear_src(&self) {
        self.record("clear_src".to_string());
        self.0.src.borrow_mut().clear();
        self.0.ready_state.set(0);
    }

    fn ready_state(&self) -> u16 {
        self.0.ready_state.get()
    }

    fn is_paused(&self) -> bool {
        self.0.paused.get()
    }

    fn metadata_ready(&self) -> LocalBoxFuture<'static, ()> {
        if self.ready_state() >= HAVE_METADATA {
            return async {}.boxed_local();
        }
        let (sender, receiver) = oneshot::channel();
        self.0.metadata.borrow_mut().push(sender);
        receiver.map(|_| ()).boxed_local()
    }

    fn play(&self) -> LocalBoxFuture<'static, PlayerResult<()>> {
        self.record("play".to_string());
        let result = match self.0.refuse_play.borrow().clone() {
            Some(reason) => Err(PlayerError::new(reason)),
            None => {
                self.0.paused.set(false);
                Ok(())
            }
        };
        async move { result }.boxed_local()
    }

    fn pause(&self) {
        self.record("pause".to_string());
        self.0.paused.set(true);
    }
}

// Audio context

#[derive(Default)]
pub struct AudioLog {
    pub contexts_created: Cell<usize>,
    pub running: Cell<bool>,
    pub resumes: Cell<usize>,
    pub sources_created: Cell<usize>,
    pub connections: Cell<usize>,
    pub analysers: RefCell<Vec<FakeAnalyser>>,
    pub samples: Rc<RefCell<Vec<u8>>>,
    tapped: RefCell<Vec<Weak<MediaState>>>,
    hold_resume: Cell<bool>,
    pending_resumes: RefCell<Vec<oneshot::Sender<()>>>,
}

impl AudioLog {
    /// Leaves `resume` pending until [`AudioLog::finish_resumes`] is called.
    pub fn hold_resume(&self) {
        self.hold_resume.set(true);
    }

    pub fn finish_resumes(&self) {
        self.hold_resume.set(false);
        for sender in self.pending_resumes.borrow_mut().drain(..) {
            let _ = sender.send(());
        }
    }

    pub fn set_samples(&self, samples: Vec<u8>) {
        *self.samples.borrow_mut() = samples;
    }

    pub fn analyser_count(&self) -> usize {
        self.analysers.borrow().len()
    }

    pub fn disconnected_analysers(&self) -> usize {
        self.analysers
            .borrow()
            .iter()
            .filter(|analyser| analyser.is_disconnected())
            .count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FakeSource(pub usize);

#[derive(Clone)]
pub struct FakeAnalyser {
    bins: usize,
    disconnected: Rc<Cell<bool>>,
    samples: Rc<RefCell<Vec<u8>>>,
}

impl FakeAnalyser {
    pub fn is_disconnected(&self) -> bool {
        self.disconnected.get()
    }
}

impl AnalyserBackend for FakeAnalyser {
    fn frequency_bin_count(&self) -> usize {
        self.bins
    }

    fn byte_time_domain_data(&self, buffer: &mut [u8]) {
        let samples = self.samples.borrow();
        for (index, slot) in buffer.iter_mut().enumerate() {
            *slot = if samples.is_empty() {
                128
            } else {
                samples[index % samples.len()]
            };
        }
    }

    fn disconnect(&self) -> PlayerResult<()> {
        self.disconnected.set(true);
        Ok(())
    }
}

pub struct FakeContext {
    log: Rc<AudioLog>,
}

impl AudioContextBackend for FakeContext {
    type Element = FakeMedia;
    type Source = FakeSource;
    type Analyser = FakeAnalyser;

    fn is_running(&self) -> bool {
        self.log.running.get()
    }

    fn resume(&self) -> LocalBoxFuture<'static, PlayerResult<()>> {
        self.log.resumes.set(self.log.resumes.get() + 1);
        if self.log.hold_resume.get() {
            let (sender, receiver) = oneshot::channel();
            self.log.pending_resumes.borrow_mut().push(sender);
            let log = Rc::clone(&self.log);
            return async move {
                let _ = receiver.await;
                log.running.set(true);
                Ok(())
            }
            .boxed_local();
        }
        self.log.running.set(true);
        async { Ok(()) }.boxed_local()
    }

    fn create_analyser(
        &self,
        options: &saylo_lipsync::AnalyzerOptions,
    ) -> PlayerResult<FakeAnalyser> {
        let analyser = FakeAnalyser {
            bins: options.fft_size as usize / 2,
            disconnected: Rc::new(Cell::new(false)),
            samples: Rc::clone(&self.log.samples),
        };
        self.log.analysers.borrow_mut().push(analyser.clone());
        Ok(analyser)
    }

    fn create_media_element_source(&self, element: &FakeMedia) -> PlayerResult<FakeSource> {
        let mut tapped = self.log.tapped.borrow_mut();
        if tapped.iter().any(|weak| element.is_same(weak)) {
            return Err(PlayerError::new(
                "InvalidStateError: element already has a source node".to_string(),
            ));
        }
        tapped.push(element.downgrade());

        let id = self.log.sources_created.get() + 1;
        self.log.sources_created.set(id);
        Ok(FakeSource(id))
    }

    fn connect(&self, _source: &FakeSource, _analyser: &FakeAnalyser) -> PlayerResult<()> {
        self.log.connections.set(self.log.connections.get() + 1);
        Ok(())
    }
}

pub fn shared_audio(log: &Rc<AudioLog>) -> Rc<SharedAudio<FakeContext>> {
    let log = Rc::clone(log);
    Rc::new(SharedAudio::new(
        move || {
            log.contexts_created.set(log.contexts_created.get() + 1);
            Ok(FakeContext {
                log: Rc::clone(&log),
            })
        },
        WeakSourceRegistry::<FakeMedia, FakeSource>::new(),
    ))
}

// Frames

struct ManualLoop {
    tick: RefCell<FrameCallback>,
    active: Cell<bool>,
}

/// Frame scheduler driven by the test through [`ManualFrames::tick`].
#[derive(Clone, Default)]
pub struct ManualFrames {
    loops: Rc<RefCell<Vec<Rc<ManualLoop>>>>,
}

impl ManualFrames {
    /// Runs one frame of every active loop.
    pub fn tick(&self) {
        let loops: Vec<Rc<ManualLoop>> = self.loops.borrow().clone();
        for frame_loop in loops {
            if !frame_loop.active.get() {
                continue;
            }
            let keep_going = {
                let mut tick = frame_loop.tick.borrow_mut();
                (*tick)()
            };
            if !keep_going {
                frame_loop.active.set(false);
            }
        }
    }

    pub fn active_loops(&self) -> usize {
        self.loops
            .borrow()
            .iter()
            .filter(|frame_loop| frame_loop.active.get())
            .count()
    }

    pub fn started_loops(&self) -> usize {
        self.loops.borrow().len()
    }
}

pub struct ManualTask(Rc<ManualLoop>);

impl FrameScheduler for ManualFrames {
    type Task = ManualTask;

    fn start(&self, tick: FrameCallback) -> PlayerResult<ManualTask> {
        let frame_loop = Rc::new(ManualLoop {
            tick: RefCell::new(tick),
            active: Cell::new(true),
        });
        self.loops.borrow_mut().push(Rc::clone(&frame_loop));
        Ok(ManualTask(frame_loop))
    }
}

impl FrameTask for ManualTask {
    fn cancel(&mut self) {
        self.0.active.set(false);
    }

    fn is_active(&self) -> bool {
        self.0.active.get()
    }
}

// Animation runtime

#[derive(Default)]
pub struct RiveLog {
    available: Cell<bool>,
    numeric: RefCell<Vec<(String, f64)>>,
    boolean: RefCell<Vec<(String, bool)>>,
}

#[derive(Clone)]
pub struct FakeRive(Rc<RiveLog>);

impl FakeRive {
    pub fn new() -> FakeRive {
        let log = RiveLog::default();
        log.available.set(true);
        FakeRive(Rc::new(log))
    }

    /// Inputs not resolved yet, as while the Rive file is still loading.
    pub fn loading() -> FakeRive {
        FakeRive(Rc::new(RiveLog::default()))
    }

    pub fn set_available(&self, available: bool) {
        self.0.available.set(available);
    }

    pub fn numeric_writes(&self) -> Vec<(String, f64)> {
        self.0.numeric.borrow().clone()
    }

    pub fn boolean_writes(&self) -> Vec<(String, bool)> {
        self.0.boolean.borrow().clone()
    }

    pub fn last_numeric(&self, name: &str) -> Option<f64> {
        self.0
            .numeric
            .borrow()
            .iter()
            .rev()
            .find(|(input, _)| input == name)
            .map(|(_, value)| *value)
    }

    pub fn last_boolean(&self, name: &str) -> Option<bool> {
        self.0
            .boolean
            .borrow()
            .iter()
            .rev()
            .find(|(input, _)| input == name)
            .map(|(_, value)| *value)
    }
}

impl StateMachineInputs for FakeRive {
    fn set_numeric_input(&self, name: &str, value: f64) -> PlayerResult<()> {
        if !self.0.available.get() {
            return Err(PlayerError::binding_unavailable(name));
        }
        self.0.numeric.borrow_mut().push((name.to_string(), value));
        Ok(())
    }

    fn set_boolean_input(&self, name: &str, value: bool) -> PlayerResult<()> {
        if !self.0.available.get() {
            return Err(PlayerError::binding_unavailable(name));
        }
        self.0.boolean.borrow_mut().push((name.to_string(), value));
        Ok(())
    }
}

// Platform

pub struct TestPlatform;

impl Platform for TestPlatform {
    type Transport = ScriptedTransport;
    type Store = MemoryStore;
    type Media = FakeMedia;
    type Context = FakeContext;
    type Frames = ManualFrames;
    type Animation = FakeRive;
}

pub struct Harness {
    pub pool: LocalPool,
    pub transport: Rc<ScriptedTransport>,
    pub store: Rc<MemoryStore>,
    pub audio_log: Rc<AudioLog>,
    pub audio: Rc<SharedAudio<FakeContext>>,
    pub frames: ManualFrames,
}

impl Harness {
    pub fn new() -> Harness {
        let audio_log = Rc::new(AudioLog::default());
        Harness {
            pool: LocalPool::new(),
            transport: Rc::new(ScriptedTransport::default()),
            store: Rc::new(MemoryStore::default()),
            audio: shared_audio(&audio_log),
            audio_log,
            frames: ManualFrames::default(),
        }
    }

    pub fn services(&self) -> PlatformServices<TestPlatform> {
        PlatformServices {
            transport: Rc::clone(&self.transport),
            store: Rc::clone(&self.store),
            audio: Rc::clone(&self.audio),
            frames: self.frames.clone(),
            spawner: Rc::new(self.pool.spawner()),
        }
    }

    pub fn player(&self, audio_src: &str) -> LipSyncPlayer<TestPlatform> {
        let config = LessonConfig::new(audio_src, "/rive/character.riv", "State Machine 1");
        LipSyncPlayer::new(config, self.services()).unwrap()
    }

    pub fn run(&mut self) {
        self.pool.run_until_stalled();
    }
}

/// Time-domain buffer whose samples sit `offset` steps above the midpoint.
pub fn constant_samples(offset: u8, len: usize) -> Vec<u8> {
    vec![128 + offset; len]
}
