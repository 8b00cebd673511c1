use log::debug;

use crate::error::PlayerResult;

pub const MOUTH_OPEN_THRESHOLD: f32 = 0.028;
pub const DEFAULT_MOUTH_INPUT: &str = "mouthOpen";
pub const DEFAULT_TALK_INPUT: &str = "Talk";

/// Named inputs of a running animation state machine. Both setters fail with
/// `BindingUnavailable` while the input cannot be resolved.
pub trait StateMachineInputs {
    fn set_numeric_input(&self, name: &str, value: f64) -> PlayerResult<()>;
    fn set_boolean_input(&self, name: &str, value: bool) -> PlayerResult<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnimationInputBinding {
    pub mouth_input: String,
    pub talk_input: String,
}

impl Default for AnimationInputBinding {
    fn default() -> Self {
        AnimationInputBinding {
            mouth_input: DEFAULT_MOUTH_INPUT.to_string(),
            talk_input: DEFAULT_TALK_INPUT.to_string(),
        }
    }
}

/// Open/closed mouth gate. Inclusive at the threshold.
pub fn mouth_value(amplitude: f32) -> f64 {
    if amplitude >= MOUTH_OPEN_THRESHOLD {
        1.0
    } else {
        0.0
    }
}

/// Pushes amplitude and talking state into the character's state machine.
pub struct AnimationBridge<R: StateMachineInputs> {
    binding: AnimationInputBinding,
    runtime: Option<R>,
    mouth: f64,
    talking: bool,
    // Last values the runtime accepted; `None` forces a write.
    written_mouth: Option<f64>,
    written_talking: Option<bool>,
}

impl<R: StateMachineInputs> AnimationBridge<R> {
    pub fn new(binding: AnimationInputBinding) -> Self {
        AnimationBridge {
            binding,
            runtime: None,
            mouth: 0.0,
            talking: false,
            written_mouth: None,
            written_talking: None,
        }
    }

    pub fn binding(&self) -> &AnimationInputBinding {
        &self.binding
    }

    pub fn is_bound(&self) -> bool {
        self.runtime.is_some()
    }

    /// Attaches a (new) state machine instance and pushes the current values.
    pub fn bind(&mut self, runtime: R) {
        self.runtime = Some(runtime);
        self.invalidate();
        self.flush();
    }

    pub fn unbind(&mut self) -> Option<R> {
        self.invalidate();
        self.runtime.take()
    }

    pub fn set_binding(&mut self, binding: AnimationInputBinding) {
        if self.binding != binding {
            self.binding = binding;
            self.invalidate();
            self.flush();
        }
    }

    pub fn update_amplitude(&mut self, amplitude: f32) {
        self.mouth = mouth_value(amplitude);
        self.flush();
    }

    pub fn update_talking(&mut self, talking: bool) {
        self.talking = talking;
        self.flush();
    }

    fn invalidate(&mut self) {
        self.written_mouth = None;
        self.written_talking = None;
    }

    fn flush(&mut self) {
        let Some(runtime) = self.runtime.as_ref() else {
            return;
        };

        if self.written_mouth != Some(self.mouth) {
            match runtime.set_numeric_input(&self.binding.mouth_input, self.mouth) {
                Ok(()) => self.written_mouth = Some(self.mouth),
                Err(err) => debug!("Skipping mouth update: {}", err),
            }
        }

        if self.written_talking != Some(self.talking) {
            match runtime.set_boolean_input(&self.binding.talk_input, self.talking) {
                Ok(()) => self.written_talking = Some(self.talking),
                Err(err) => debug!("Skipping talk update: {}", err),
            }
        }
    }
}
