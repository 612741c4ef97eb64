pub mod audio;
pub mod clock;
pub mod midi;
pub mod sound;
pub mod synth;
pub mod types;

pub use audio::*;
pub use clock::*;
pub use midi::*;
pub use sound::*;
pub use synth::*;
pub use types::*;
