use futures::{FutureExt, StreamExt, future::LocalBoxFuture, stream};
use js_sys::Uint8Array;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{ReadableStreamDefaultReader, Request, RequestInit, Response};

use crate::{
    error::{PlayerError, PlayerResult},
    player::{
        abort::AbortSignal,
        net_task::{FetchResponse, ResponseBody, Transport},
    },
};

/// `window.fetch` with a streamed body when the browser exposes one.
#[derive(Default)]
pub struct FetchTransport;

impl Transport for FetchTransport {
    fn fetch(
        &self,
        url: &str,
        signal: &AbortSignal,
    ) -> LocalBoxFuture<'static, PlayerResult<FetchResponse>> {
        let url = url.to_owned();
        let signal = signal.clone();
        async move {
            let window =
                web_sys::window().ok_or_else(|| PlayerError::new("No window".to_string()))?;

            let controller = web_sys::AbortController::new()?;
            let init = RequestInit::new();
            init.set_signal(Some(&controller.signal()));
            signal.on_abort(move || controller.abort());

            let request = Request::new_with_str_and_init(&url, &init)?;
            let response: Response = JsFuture::from(window.fetch_with_request(&request))
                .await?
                .dyn_into()?;

            let headers = response.headers();
            let content_length = headers
                .get("Content-Length")?
                .and_then(|value| value.trim().parse::<u64>().ok());
            let content_type = headers.get("Content-Type")?;

            let body = match response.body() {
                Some(stream) => {
                    let reader: ReadableStreamDefaultReader = stream.get_reader().unchecked_into();
                    ResponseBody::Stream(read_chunks(reader))
                }
                None => {
                    let buffer = response.array_buffer()?;
                    ResponseBody::Buffered(
                        async move {
                            let buffer = JsFuture::from(buffer).await?;
                            Ok(Uint8Array::new(&buffer).to_vec())
                        }
                        .boxed_local(),
                    )
                }
            };

            Ok(FetchResponse {
                status: response.status(),
                content_length,
                content_type,
                body,
            })
        }
        .boxed_local()
    }
}

fn read_chunks(
    reader: ReadableStreamDefaultReader,
) -> stream::LocalBoxStream<'static, PlayerResult<Vec<u8>>> {
    stream::unfold(Some(reader), |reader| async move {
        let reader = reader?;
        match read_chunk(&reader).await {
            Ok(Some(chunk)) => Some((Ok(chunk), Some(reader))),
            Ok(None) => {
                let _ = reader.release_lock();
                None
            }
            Err(err) => Some((Err(err), None)),
        }
    })
    .boxed_local()
}

async fn read_chunk(reader: &ReadableStreamDefaultReader) -> PlayerResult<Option<Vec<u8>>> {
    let result = JsFuture::from(reader.read()).await?;
    let done = js_sys::Reflect::get(&result, &JsValue::from_str("done"))?;
    if done.as_bool().unwrap_or(false) {
        return Ok(None);
    }

    let value = js_sys::Reflect::get(&result, &JsValue::from_str("value"))?;
    if value.is_undefined() {
        return Ok(Some(Vec::new()));
    }
    Ok(Some(value.unchecked_into::<Uint8Array>().to_vec()))
}
