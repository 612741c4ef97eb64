mod common;

use common::{device, FakeMidiInput, FakeMidiOutput};
use etude_core::DeviceWatcher;
use etude_ports::midi::MidiError;
use pretty_assertions::assert_eq;
use std::sync::Arc;

#[test]
fn reports_only_when_the_list_changes() {
    let input = Arc::new(FakeMidiInput::with_device("piano"));
    let mut watcher = DeviceWatcher::new(input.clone());

    let first = watcher.poll().expect("poll").expect("first poll reports");
    assert_eq!(first.inputs, vec![device("piano")]);
    assert_eq!(first.outputs, None);
    assert_eq!(watcher.poll().expect("poll"), None);

    input.devices.lock().push(device("organ"));
    let change = watcher.poll().expect("poll").expect("new device reported");
    assert_eq!(change.inputs.len(), 2);
    assert_eq!(watcher.poll().expect("poll"), None);
}

#[test]
fn device_order_does_not_count_as_a_change() {
    let input = Arc::new(FakeMidiInput::default());
    input.devices.lock().extend([device("b"), device("a")]);
    let mut watcher = DeviceWatcher::new(input.clone());
    watcher.poll().expect("poll");

    input.devices.lock().reverse();
    assert_eq!(watcher.poll().expect("poll"), None);
}

#[test]
fn outputs_are_listed_with_inputs() {
    let mut watcher = DeviceWatcher::new(Arc::new(FakeMidiInput::default()))
        .with_outputs(Arc::new(FakeMidiOutput::default()));

    let change = watcher.poll().expect("poll").expect("first poll reports");
    assert!(change.inputs.is_empty());
    assert_eq!(change.outputs.map(|o| o.len()), Some(1));
}

#[test]
fn unavailable_backend_is_an_error() {
    let input = FakeMidiInput {
        unavailable: true,
        ..FakeMidiInput::default()
    };
    let mut watcher = DeviceWatcher::new(Arc::new(input));

    assert!(matches!(watcher.poll(), Err(MidiError::DeviceUnavailable(_))));
}
