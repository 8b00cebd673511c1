use wasm_bindgen::JsValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerErrorCode {
    Generic,
    /// The server answered with a non-success status.
    NetworkError,
    /// The download was cancelled through its abort signal.
    Aborted,
    /// The browser refused to start playback.
    PlaybackError,
    /// A named state machine input could not be resolved.
    BindingUnavailable,
    InvalidConfig,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct PlayerError {
    pub code: PlayerErrorCode,
    pub message: String,
}

pub type PlayerResult<T> = Result<T, PlayerError>;

impl PlayerError {
    pub fn new(message: String) -> PlayerError {
        Self::new_code(PlayerErrorCode::Generic, message)
    }

    pub fn new_code(code: PlayerErrorCode, message: String) -> PlayerError {
        PlayerError { code, message }
    }

    pub fn network(status: u16) -> PlayerError {
        Self::new_code(
            PlayerErrorCode::NetworkError,
            format!("Download failed ({})", status),
        )
    }

    pub fn aborted() -> PlayerError {
        Self::new_code(PlayerErrorCode::Aborted, "Download aborted".to_string())
    }

    pub fn playback(message: impl Into<String>) -> PlayerError {
        Self::new_code(PlayerErrorCode::PlaybackError, message.into())
    }

    pub fn binding_unavailable(input_name: &str) -> PlayerError {
        Self::new_code(
            PlayerErrorCode::BindingUnavailable,
            format!("State machine input `{}` is not available", input_name),
        )
    }

    pub fn invalid_config(message: impl Into<String>) -> PlayerError {
        Self::new_code(PlayerErrorCode::InvalidConfig, message.into())
    }

    pub fn is_aborted(&self) -> bool {
        self.code == PlayerErrorCode::Aborted
    }
}

impl From<JsValue> for PlayerError {
    fn from(value: JsValue) -> Self {
        let message = js_sys::Reflect::get(&value, &JsValue::from_str("message"))
            .ok()
            .and_then(|message| message.as_string())
            .or_else(|| value.as_string())
            .unwrap_or_else(|| format!("{:?}", value));
        PlayerError::new(message)
    }
}

impl From<PlayerError> for JsValue {
    fn from(error: PlayerError) -> Self {
        js_sys::Error::new(&error.message).into()
    }
}

impl From<serde_json::Error> for PlayerError {
    fn from(error: serde_json::Error) -> Self {
        PlayerError::invalid_config(format!("Invalid lesson config: {}", error))
    }
}
