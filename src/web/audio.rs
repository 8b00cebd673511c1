use futures::{FutureExt, future::LocalBoxFuture};
use js_sys::{Array, Function, Reflect, WeakMap};
use log::warn;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{AnalyserNode, AudioContext, AudioContextState, MediaElementAudioSourceNode};

use crate::{
    config::AnalyzerOptions,
    error::{PlayerError, PlayerResult},
    player::amplitude::{AnalyserBackend, AudioContextBackend, SourceCache},
};

use super::media::LessonAudioElement;

pub struct WebAudioContext {
    context: AudioContext,
}

impl WebAudioContext {
    /// Creates an `AudioContext`, falling back to `webkitAudioContext` on older
    /// Safari.
    pub fn create() -> PlayerResult<WebAudioContext> {
        match AudioContext::new() {
            Ok(context) => Ok(WebAudioContext { context }),
            Err(err) => {
                warn!("AudioContext unavailable, trying webkitAudioContext");
                let window =
                    web_sys::window().ok_or_else(|| PlayerError::new("No window".to_string()))?;
                let constructor = Reflect::get(&window, &JsValue::from_str("webkitAudioContext"))?;
                if constructor.is_undefined() {
                    return Err(err.into());
                }
                let constructor: Function = constructor.dyn_into()?;
                let context = Reflect::construct(&constructor, &Array::new())?;
                Ok(WebAudioContext {
                    context: context.unchecked_into(),
                })
            }
        }
    }
}

impl AudioContextBackend for WebAudioContext {
    type Element = LessonAudioElement;
    type Source = MediaElementAudioSourceNode;
    type Analyser = AnalyserNode;

    fn is_running(&self) -> bool {
        self.context.state() == AudioContextState::Running
    }

    fn resume(&self) -> LocalBoxFuture<'static, PlayerResult<()>> {
        let promise = self.context.resume();
        async move {
            JsFuture::from(promise?).await?;
            Ok(())
        }
        .boxed_local()
    }

    fn create_analyser(&self, options: &AnalyzerOptions) -> PlayerResult<AnalyserNode> {
        let analyser = self.context.create_analyser()?;
        analyser.set_fft_size(options.fft_size);
        analyser.set_smoothing_time_constant(options.smoothing_time_constant);
        Ok(analyser)
    }

    fn create_media_element_source(
        &self,
        element: &LessonAudioElement,
    ) -> PlayerResult<MediaElementAudioSourceNode> {
        Ok(self
            .context
            .create_media_element_source(element.as_media_element())?)
    }

    fn connect(
        &self,
        source: &MediaElementAudioSourceNode,
        analyser: &AnalyserNode,
    ) -> PlayerResult<()> {
        source.connect_with_audio_node(analyser)?;
        analyser.connect_with_audio_node(&self.context.destination())?;
        Ok(())
    }
}

impl AnalyserBackend for AnalyserNode {
    fn frequency_bin_count(&self) -> usize {
        AnalyserNode::frequency_bin_count(self) as usize
    }

    fn byte_time_domain_data(&self, buffer: &mut [u8]) {
        self.get_byte_time_domain_data(buffer);
    }

    fn disconnect(&self) -> PlayerResult<()> {
        web_sys::AudioNode::disconnect(self)?;
        Ok(())
    }
}

/// Source nodes keyed by the `<audio>` element in a JS `WeakMap`, so the cache
/// never keeps an element alive.
pub struct JsWeakSourceCache {
    sources: WeakMap,
}

impl JsWeakSourceCache {
    pub fn new() -> JsWeakSourceCache {
        JsWeakSourceCache {
            sources: WeakMap::new(),
        }
    }
}

impl Default for JsWeakSourceCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceCache<LessonAudioElement, MediaElementAudioSourceNode> for JsWeakSourceCache {
    fn get(&self, element: &LessonAudioElement) -> Option<MediaElementAudioSourceNode> {
        let source = self.sources.get(element.as_object());
        if source.is_undefined() {
            None
        } else {
            Some(source.unchecked_into())
        }
    }

    fn insert(&self, element: &LessonAudioElement, source: MediaElementAudioSourceNode) {
        self.sources.set(element.as_object(), &source);
    }
}
