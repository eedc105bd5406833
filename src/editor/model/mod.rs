mod draft;
mod state;
mod step;

pub use draft::{Direction, Draft, EditState};
pub use state::{MasterBuilder, StepBuilder};
pub use step::StepInput;
