use std::{
    cell::{OnceCell, RefCell},
    rc::{Rc, Weak},
};

use futures::{FutureExt, future::LocalBoxFuture};
use log::{debug, warn};

use crate::{config::AnalyzerOptions, error::PlayerResult};

use super::{
    frame_loop::{FrameScheduler, FrameTask},
    signal::Signal,
};

/// Gain applied to the RMS of a time-domain buffer before clamping.
pub const AMPLITUDE_GAIN: f32 = 2.2;

pub trait AnalyserBackend {
    fn frequency_bin_count(&self) -> usize;
    fn byte_time_domain_data(&self, buffer: &mut [u8]);
    fn disconnect(&self) -> PlayerResult<()>;
}

/// Audio-processing context the analyzer taps into.
pub trait AudioContextBackend {
    /// Audio element handle. Equality is identity.
    type Element: Clone + PartialEq;
    type Source: Clone;
    type Analyser: AnalyserBackend;

    fn is_running(&self) -> bool;
    fn resume(&self) -> LocalBoxFuture<'static, PlayerResult<()>>;
    fn create_analyser(&self, options: &AnalyzerOptions) -> PlayerResult<Self::Analyser>;
    /// May only succeed once per element for the element's whole lifetime.
    fn create_media_element_source(&self, element: &Self::Element) -> PlayerResult<Self::Source>;
    /// Wires source -> analyser -> destination.
    fn connect(&self, source: &Self::Source, analyser: &Self::Analyser) -> PlayerResult<()>;
}

/// Remembers the source node created for each element without owning the
/// element.
pub trait SourceCache<E, S> {
    fn get(&self, element: &E) -> Option<S>;
    fn insert(&self, element: &E, source: S);
}

/// Element handles that can be tracked through a non-owning reference.
pub trait WeakHandle {
    type Weak;

    fn downgrade(&self) -> Self::Weak;
    fn is_same(&self, weak: &Self::Weak) -> bool;
    fn is_expired(weak: &Self::Weak) -> bool;
}

impl<T> WeakHandle for Rc<T> {
    type Weak = Weak<T>;

    fn downgrade(&self) -> Weak<T> {
        Rc::downgrade(self)
    }

    fn is_same(&self, weak: &Weak<T>) -> bool {
        std::ptr::eq(Rc::as_ptr(self), weak.as_ptr())
    }

    fn is_expired(weak: &Weak<T>) -> bool {
        weak.strong_count() == 0
    }
}

/// Identity-keyed side table holding weak element references. Entries for
/// dropped elements are pruned on insert.
pub struct WeakSourceRegistry<E: WeakHandle, S> {
    entries: RefCell<Vec<(E::Weak, S)>>,
}

impl<E: WeakHandle, S> WeakSourceRegistry<E, S> {
    pub fn new() -> Self {
        WeakSourceRegistry {
            entries: RefCell::new(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries
            .borrow()
            .iter()
            .filter(|(weak, _)| !E::is_expired(weak))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E: WeakHandle, S> Default for WeakSourceRegistry<E, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: WeakHandle, S: Clone> SourceCache<E, S> for WeakSourceRegistry<E, S> {
    fn get(&self, element: &E) -> Option<S> {
        self.entries
            .borrow()
            .iter()
            .find(|(weak, _)| element.is_same(weak))
            .map(|(_, source)| source.clone())
    }

    fn insert(&self, element: &E, source: S) {
        let mut entries = self.entries.borrow_mut();
        entries.retain(|(weak, _)| !E::is_expired(weak) && !element.is_same(weak));
        entries.push((element.downgrade(), source));
    }
}

/// Process-wide audio state: the context, created lazily and never closed,
/// and the per-element source cache.
pub struct SharedAudio<C: AudioContextBackend> {
    factory: Box<dyn Fn() -> PlayerResult<C>>,
    context: OnceCell<C>,
    sources: Box<dyn SourceCache<C::Element, C::Source>>,
}

impl<C: AudioContextBackend> SharedAudio<C> {
    pub fn new(
        factory: impl Fn() -> PlayerResult<C> + 'static,
        sources: impl SourceCache<C::Element, C::Source> + 'static,
    ) -> SharedAudio<C> {
        SharedAudio {
            factory: Box::new(factory),
            context: OnceCell::new(),
            sources: Box::new(sources),
        }
    }

    pub fn context(&self) -> Option<&C> {
        self.context.get()
    }

    pub fn ensure_context(&self) -> PlayerResult<&C> {
        if let Some(context) = self.context.get() {
            return Ok(context);
        }
        let created = (self.factory)()?;
        debug!("Audio context created");
        Ok(self.context.get_or_init(move || created))
    }

    /// Returns the cached source node for `element`, creating it on first use.
    pub fn source_for(&self, element: &C::Element) -> PlayerResult<C::Source> {
        if let Some(source) = self.sources.get(element) {
            return Ok(source);
        }
        let source = self.ensure_context()?.create_media_element_source(element)?;
        self.sources.insert(element, source.clone());
        Ok(source)
    }
}

struct AnalyzerSession<C: AudioContextBackend> {
    element: Option<C::Element>,
    source: Option<C::Source>,
    analyser: Option<C::Analyser>,
    buffer: Vec<u8>,
}

impl<C: AudioContextBackend> AnalyzerSession<C> {
    fn is_live_for(&self, element: &C::Element) -> bool {
        self.element.as_ref() == Some(element) && self.analyser.is_some() && self.source.is_some()
    }
}

/// Taps an audio element and publishes its loudness once per frame.
pub struct AmplitudeAnalyzer<C: AudioContextBackend + 'static, F: FrameScheduler> {
    shared: Rc<SharedAudio<C>>,
    frames: F,
    options: AnalyzerOptions,
    amplitude: Signal<f32>,
    session: Rc<RefCell<AnalyzerSession<C>>>,
    frame_task: Option<F::Task>,
}

impl<C: AudioContextBackend + 'static, F: FrameScheduler> AmplitudeAnalyzer<C, F> {
    pub fn new(shared: Rc<SharedAudio<C>>, frames: F, options: AnalyzerOptions) -> Self {
        AmplitudeAnalyzer {
            shared,
            frames,
            options,
            amplitude: Signal::new(0.0),
            session: Rc::new(RefCell::new(AnalyzerSession {
                element: None,
                source: None,
                analyser: None,
                buffer: Vec::new(),
            })),
            frame_task: None,
        }
    }

    pub fn amplitude(&self) -> &Signal<f32> {
        &self.amplitude
    }

    pub fn is_connected(&self) -> bool {
        self.session.borrow().analyser.is_some()
    }

    pub fn is_sampling(&self) -> bool {
        self.frame_task
            .as_ref()
            .is_some_and(|task| task.is_active())
    }

    /// Wires `element` into the analysis graph and starts sampling. A no-op
    /// when `element` is already connected and its nodes are live.
    pub fn connect(&mut self, element: &C::Element) -> PlayerResult<()> {
        if self.session.borrow().is_live_for(element) {
            return Ok(());
        }

        let shared = Rc::clone(&self.shared);
        let context = shared.ensure_context()?;
        let analyser = context.create_analyser(&self.options)?;
        let source = shared.source_for(element)?;

        self.stop_sampling();
        let previous = self.session.borrow_mut().analyser.take();
        if let Some(previous) = previous {
            if let Err(err) = previous.disconnect() {
                warn!("Failed to disconnect previous analyser: {}", err);
            }
        }

        context.connect(&source, &analyser)?;

        {
            let mut session = self.session.borrow_mut();
            session.buffer = vec![0; analyser.frequency_bin_count()];
            session.analyser = Some(analyser);
            session.source = Some(source);
            session.element = Some(element.clone());
        }

        let task = self
            .frames
            .start(sample_loop(Rc::downgrade(&self.session), self.amplitude.clone()))?;
        self.frame_task = Some(task);
        debug!("Amplitude analyzer connected");
        Ok(())
    }

    /// Resumes the shared context when the platform suspended it. Call from a
    /// user-initiated handler.
    pub fn resume_context(&self) -> LocalBoxFuture<'static, PlayerResult<()>> {
        let shared = Rc::clone(&self.shared);
        async move {
            let resume = match shared.context() {
                Some(context) if !context.is_running() => context.resume(),
                _ => return Ok(()),
            };
            resume.await
        }
        .boxed_local()
    }

    /// Stops sampling and drops the analyser. The context and the element's
    /// source node stay alive for reuse.
    pub fn disconnect(&mut self) {
        self.stop_sampling();

        let mut session = self.session.borrow_mut();
        let analyser = session.analyser.take();
        if let Some(analyser) = analyser {
            if let Err(err) = analyser.disconnect() {
                warn!("Failed to disconnect analyser: {}", err);
            }
        }
        session.buffer = Vec::new();
    }

    fn stop_sampling(&mut self) {
        if let Some(mut task) = self.frame_task.take() {
            task.cancel();
        }
    }
}

impl<C: AudioContextBackend + 'static, F: FrameScheduler> Drop for AmplitudeAnalyzer<C, F> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn sample_loop<C: AudioContextBackend + 'static>(
    session: Weak<RefCell<AnalyzerSession<C>>>,
    amplitude: Signal<f32>,
) -> Box<dyn FnMut() -> bool> {
    Box::new(move || {
        let Some(session) = session.upgrade() else {
            return false;
        };
        let value = {
            let mut session = session.borrow_mut();
            let AnalyzerSession {
                analyser, buffer, ..
            } = &mut *session;
            let Some(analyser) = analyser.as_ref() else {
                return false;
            };
            analyser.byte_time_domain_data(buffer);
            amplitude_from_time_domain(buffer)
        };
        amplitude.set(value);
        true
    })
}

/// Loudness of an unsigned 8-bit time-domain buffer: RMS of the samples
/// mapped to [-1, 1], boosted by [`AMPLITUDE_GAIN`] and clamped to [0, 1].
pub fn amplitude_from_time_domain(data: &[u8]) -> f32 {
    if data.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = data
        .iter()
        .map(|sample| {
            let value = (*sample as f32 - 128.0) / 128.0;
            value * value
        })
        .sum();
    let rms = (sum_squares / data.len() as f32).sqrt();
    (rms * AMPLITUDE_GAIN).clamp(0.0, 1.0)
}
