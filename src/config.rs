use serde::{Deserialize, Serialize};

use crate::{
    error::{PlayerError, PlayerResult},
    player::animation::{AnimationInputBinding, DEFAULT_MOUTH_INPUT, DEFAULT_TALK_INPUT},
};

pub const DEFAULT_FFT_SIZE: u32 = 1024;
pub const DEFAULT_SMOOTHING_TIME_CONSTANT: f64 = 0.85;

const MIN_FFT_SIZE: u32 = 32;
const MAX_FFT_SIZE: u32 = 32768;

/// Per-lesson parameters handed over by the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonConfig {
    pub audio_src: String,
    pub rive_src: String,
    pub state_machine: String,
    #[serde(default = "default_mouth_input")]
    pub mouth_input_name: String,
    #[serde(default = "default_talk_input")]
    pub talk_input_name: String,
    #[serde(default)]
    pub analyzer: AnalyzerOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalyzerOptions {
    pub fft_size: u32,
    pub smoothing_time_constant: f64,
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        Self {
            fft_size: DEFAULT_FFT_SIZE,
            smoothing_time_constant: DEFAULT_SMOOTHING_TIME_CONSTANT,
        }
    }
}

impl AnalyzerOptions {
    pub fn validate(&self) -> PlayerResult<()> {
        if !self.fft_size.is_power_of_two()
            || !(MIN_FFT_SIZE..=MAX_FFT_SIZE).contains(&self.fft_size)
        {
            return Err(PlayerError::invalid_config(format!(
                "fftSize must be a power of two between {} and {}, got {}",
                MIN_FFT_SIZE, MAX_FFT_SIZE, self.fft_size
            )));
        }
        if !(0.0..=1.0).contains(&self.smoothing_time_constant) {
            return Err(PlayerError::invalid_config(format!(
                "smoothingTimeConstant must be within [0, 1], got {}",
                self.smoothing_time_constant
            )));
        }
        Ok(())
    }
}

fn default_mouth_input() -> String {
    DEFAULT_MOUTH_INPUT.to_string()
}

fn default_talk_input() -> String {
    DEFAULT_TALK_INPUT.to_string()
}

impl LessonConfig {
    pub fn new(audio_src: &str, rive_src: &str, state_machine: &str) -> LessonConfig {
        LessonConfig {
            audio_src: audio_src.to_owned(),
            rive_src: rive_src.to_owned(),
            state_machine: state_machine.to_owned(),
            mouth_input_name: default_mouth_input(),
            talk_input_name: default_talk_input(),
            analyzer: AnalyzerOptions::default(),
        }
    }

    pub fn from_json(json: &str) -> PlayerResult<LessonConfig> {
        let config: LessonConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PlayerResult<()> {
        if self.audio_src.trim().is_empty() {
            return Err(PlayerError::invalid_config("audioSrc must not be empty"));
        }
        self.analyzer.validate()
    }

    pub fn binding(&self) -> AnimationInputBinding {
        AnimationInputBinding {
            mouth_input: self.mouth_input_name.clone(),
            talk_input: self.talk_input_name.clone(),
        }
    }
}
