use js_sys::{Array, Uint8Array};
use log::debug;
use web_sys::{Blob, BlobPropertyBag, Url};

use crate::{
    error::PlayerResult,
    player::net_task::{ResourceHandle, ResourceStore},
};

/// Keeps downloaded audio as a `Blob` behind an object URL.
#[derive(Default)]
pub struct ObjectUrlStore;

impl ResourceStore for ObjectUrlStore {
    fn create(&self, parts: &[Vec<u8>], content_type: &str) -> PlayerResult<ResourceHandle> {
        let blob_parts = Array::new();
        for part in parts {
            blob_parts.push(&Uint8Array::from(part.as_slice()));
        }

        let options = BlobPropertyBag::new();
        options.set_type(content_type);
        let blob = Blob::new_with_u8_array_sequence_and_options(&blob_parts, &options)?;
        let url = Url::create_object_url_with_blob(&blob)?;
        debug!("Object URL created: {} ({} bytes)", url, blob.size());

        Ok(ResourceHandle::new(url))
    }

    fn release(&self, handle: &ResourceHandle) -> PlayerResult<()> {
        Url::revoke_object_url(handle.url())?;
        debug!("Object URL revoked: {}", handle.url());
        Ok(())
    }
}
