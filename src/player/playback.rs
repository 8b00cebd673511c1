use std::{cell::RefCell, rc::Rc};

use futures::{
    FutureExt,
    future::LocalBoxFuture,
    task::{LocalSpawn, LocalSpawnExt},
};
use log::{debug, warn};

use crate::error::{PlayerError, PlayerResult};

use super::{
    abort::AbortController,
    download::DownloadState,
    net_task::{DownloadProgress, ResourceHandle, ResourceStore, Transport, download_to_resource},
    signal::Signal,
};

/// `HTMLMediaElement.HAVE_METADATA`.
pub const HAVE_METADATA: u16 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaEvent {
    Play,
    Pause,
    Ended,
}

/// The `<audio>` element the lesson plays through.
pub trait MediaElement {
    fn src(&self) -> String;
    fn set_src(&self, src: &str);
    /// Detaches the current source so the element no longer references it.
    fn clear_src(&self);
    fn ready_state(&self) -> u16;
    fn is_paused(&self) -> bool;
    /// Resolves once `ready_state` reaches [`HAVE_METADATA`]; immediately if it
    /// already has.
    fn metadata_ready(&self) -> LocalBoxFuture<'static, ()>;
    fn play(&self) -> LocalBoxFuture<'static, PlayerResult<()>>;
    fn pause(&self);
}

struct DownloadSession {
    source: String,
    abort: AbortController,
    resource: Rc<RefCell<Option<ResourceHandle>>>,
}

/// Owns the download lifecycle of the lesson audio and the play/pause intent.
pub struct PlaybackController<T, S, M>
where
    T: Transport + 'static,
    S: ResourceStore + 'static,
    M: MediaElement + Clone + 'static,
{
    transport: Rc<T>,
    store: Rc<S>,
    spawner: Rc<dyn LocalSpawn>,
    element: Option<M>,
    download: Signal<DownloadState>,
    talking: Signal<bool>,
    session: Option<DownloadSession>,
}

impl<T, S, M> PlaybackController<T, S, M>
where
    T: Transport + 'static,
    S: ResourceStore + 'static,
    M: MediaElement + Clone + 'static,
{
    pub fn new(transport: Rc<T>, store: Rc<S>, spawner: Rc<dyn LocalSpawn>) -> Self {
        PlaybackController {
            transport,
            store,
            spawner,
            element: None,
            download: Signal::new(DownloadState::Idle),
            talking: Signal::new(false),
            session: None,
        }
    }

    pub fn download_state(&self) -> &Signal<DownloadState> {
        &self.download
    }

    pub fn talking(&self) -> &Signal<bool> {
        &self.talking
    }

    pub fn element(&self) -> Option<&M> {
        self.element.as_ref()
    }

    pub fn current_source(&self) -> Option<&str> {
        self.session.as_ref().map(|session| session.source.as_str())
    }

    pub fn attach_element(&mut self, element: M) {
        self.element = Some(element);
    }

    pub fn detach_element(&mut self) -> Option<M> {
        self.talking.set(false);
        self.element.take()
    }

    /// Starts a download session for `source`, cancelling and cleaning up the
    /// previous one.
    pub fn load_source(&mut self, source: &str) -> PlayerResult<()> {
        self.end_session();
        self.download.set(DownloadState::Idle);

        let abort = AbortController::new();
        let signal = abort.signal();
        let resource = Rc::new(RefCell::new(None));
        self.session = Some(DownloadSession {
            source: source.to_owned(),
            abort,
            resource: Rc::clone(&resource),
        });

        self.download.set(DownloadState::Downloading {
            progress: DownloadProgress::Unknown,
        });
        debug!("Downloading lesson audio {}", source);

        let transport = Rc::clone(&self.transport);
        let store = Rc::clone(&self.store);
        let download = self.download.clone();
        let url = source.to_owned();
        self.spawner
            .spawn_local(async move {
                let result =
                    download_to_resource(&*transport, &*store, &url, &signal, |progress| {
                        if !signal.is_aborted() {
                            download.set(DownloadState::Downloading { progress });
                        }
                    })
                    .await;

                match result {
                    Ok(handle) if signal.is_aborted() => {
                        // Session ended while the resource was being created.
                        if let Err(err) = store.release(&handle) {
                            warn!("Failed to release stale resource: {}", err);
                        }
                    }
                    Ok(handle) => {
                        *resource.borrow_mut() = Some(handle.clone());
                        download.set(DownloadState::Ready { resource: handle });
                    }
                    Err(_) if signal.is_aborted() => {
                        debug!("Download of {} cancelled", url);
                    }
                    Err(err) => {
                        warn!("Download of {} failed: {}", url, err);
                        download.set(DownloadState::Error {
                            message: err.message,
                        });
                    }
                }
            })
            .map_err(|e| PlayerError::new(format!("Failed to spawn download: {}", e)))
    }

    /// Cancels any in-flight download and releases the session's resource.
    pub fn end_session(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        session.abort.abort();

        let handle = session.resource.borrow_mut().take();
        if let Some(handle) = handle {
            if let Some(element) = &self.element {
                if element.src() == handle.url() {
                    element.pause();
                    element.clear_src();
                    self.talking.set(false);
                }
            }
            if let Err(err) = self.store.release(&handle) {
                warn!("Failed to release {}: {}", handle.url(), err);
            }
        }
        self.download.set(DownloadState::Idle);
    }

    /// Starts playback of the downloaded resource. Does nothing until the
    /// download is ready, and leaves the element alone if the session ends
    /// while the returned future is suspended. `resume_context` runs first so
    /// the audio context is unlocked inside the user gesture.
    pub fn play(
        &self,
        resume_context: LocalBoxFuture<'static, PlayerResult<()>>,
    ) -> LocalBoxFuture<'static, PlayerResult<()>> {
        let (Some(element), Some(session), DownloadState::Ready { resource }) = (
            self.element.clone(),
            self.session.as_ref(),
            self.download.get(),
        ) else {
            return async { Ok(()) }.boxed_local();
        };
        let signal = session.abort.signal();

        async move {
            resume_context.await?;
            if signal.is_aborted() {
                debug!("Session ended before playback started");
                return Ok(());
            }

            if element.src() != resource.url() {
                element.set_src(resource.url());
                element.metadata_ready().await;
                if signal.is_aborted() {
                    debug!("Session ended while waiting for metadata");
                    return Ok(());
                }
            }

            element.play().await.map_err(|err| {
                warn!("Playback refused: {}", err);
                PlayerError::playback(err.message)
            })
        }
        .boxed_local()
    }

    pub fn pause(&self) {
        if let Some(element) = &self.element {
            element.pause();
        }
    }

    pub fn handle_media_event(&self, event: MediaEvent) {
        self.talking.set(matches!(event, MediaEvent::Play));
    }
}

impl<T, S, M> Drop for PlaybackController<T, S, M>
where
    T: Transport + 'static,
    S: ResourceStore + 'static,
    M: MediaElement + Clone + 'static,
{
    fn drop(&mut self) {
        self.end_session();
    }
}
