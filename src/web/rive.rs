use js_sys::{Array, Function, Reflect};
use wasm_bindgen::{JsCast, JsValue};

use crate::{
    error::{PlayerError, PlayerResult},
    player::animation::StateMachineInputs,
};

/// A loaded Rive instance and the name of the state machine that drives the
/// character.
pub struct RiveStateMachine {
    rive: JsValue,
    state_machine: String,
}

impl RiveStateMachine {
    pub fn new(rive: JsValue, state_machine: &str) -> RiveStateMachine {
        RiveStateMachine {
            rive,
            state_machine: state_machine.to_owned(),
        }
    }

    fn find_input(&self, name: &str) -> PlayerResult<JsValue> {
        let inputs_fn = Reflect::get(&self.rive, &JsValue::from_str("stateMachineInputs"))?;
        let Some(inputs_fn) = inputs_fn.dyn_ref::<Function>() else {
            return Err(PlayerError::binding_unavailable(name));
        };
        let inputs = inputs_fn.call1(&self.rive, &JsValue::from_str(&self.state_machine))?;
        if !Array::is_array(&inputs) {
            return Err(PlayerError::binding_unavailable(name));
        }

        let inputs: Array = inputs.unchecked_into();
        inputs
            .iter()
            .find(|input| {
                Reflect::get(input, &JsValue::from_str("name"))
                    .ok()
                    .and_then(|value| value.as_string())
                    .is_some_and(|input_name| input_name == name)
            })
            .ok_or_else(|| PlayerError::binding_unavailable(name))
    }

    fn set_value(&self, name: &str, value: &JsValue) -> PlayerResult<()> {
        let input = self.find_input(name)?;
        Reflect::set(&input, &JsValue::from_str("value"), value)?;
        Ok(())
    }
}

impl StateMachineInputs for RiveStateMachine {
    fn set_numeric_input(&self, name: &str, value: f64) -> PlayerResult<()> {
        self.set_value(name, &JsValue::from_f64(value))
    }

    fn set_boolean_input(&self, name: &str, value: bool) -> PlayerResult<()> {
        self.set_value(name, &JsValue::from_bool(value))
    }
}
