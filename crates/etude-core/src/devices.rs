use etude_ports::midi::{MidiError, MidiInputPort, MidiOutputPort};
use etude_ports::types::{MidiInputDevice, MidiOutputDevice};
use std::sync::Arc;
use tracing::debug;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceChange {
    pub inputs: Vec<MidiInputDevice>,
    pub outputs: Option<Vec<MidiOutputDevice>>,
}

/// Polls the device lists and reports only when they change.
pub struct DeviceWatcher {
    inputs: Arc<dyn MidiInputPort>,
    outputs: Option<Arc<dyn MidiOutputPort>>,
    last_inputs: Option<Vec<MidiInputDevice>>,
    last_outputs: Option<Vec<MidiOutputDevice>>,
}

impl DeviceWatcher {
    pub fn new(inputs: Arc<dyn MidiInputPort>) -> Self {
        Self {
            inputs,
            outputs: None,
            last_inputs: None,
            last_outputs: None,
        }
    }

    pub fn with_outputs(mut self, outputs: Arc<dyn MidiOutputPort>) -> Self {
        self.outputs = Some(outputs);
        self
    }

    /// `Ok(None)` when nothing changed since the previous poll. The first
    /// successful poll always reports.
    pub fn poll(&mut self) -> Result<Option<DeviceChange>, MidiError> {
        let mut inputs = self.inputs.list_inputs()?;
        inputs.sort_by(|a, b| a.id.cmp(&b.id));
        let outputs = match self.outputs.as_ref() {
            Some(port) => {
                let mut outputs = port.list_outputs()?;
                outputs.sort_by(|a, b| a.id.cmp(&b.id));
                Some(outputs)
            }
            None => None,
        };

        let inputs_changed = self.last_inputs.as_ref() != Some(&inputs);
        let outputs_changed = outputs.is_some() && self.last_outputs != outputs;
        if !inputs_changed && !outputs_changed {
            return Ok(None);
        }

        debug!(
            inputs = inputs.len(),
            outputs = outputs.as_ref().map(Vec::len),
            "device list changed"
        );
        self.last_inputs = Some(inputs.clone());
        if outputs.is_some() {
            self.last_outputs = outputs.clone();
        }
        Ok(Some(DeviceChange { inputs, outputs }))
    }
}
