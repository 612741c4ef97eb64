pub mod interchange;
pub mod midi_import;
pub mod model;
pub mod tempo;

pub use interchange::*;
pub use midi_import::*;
pub use model::*;
pub use tempo::*;
