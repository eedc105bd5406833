pub mod convert;
pub mod model;

pub use convert::{
    builder_to_master, builder_to_scenario, copy_name, master_to_builder, scenario_to_builder,
};
pub use model::{Direction, Draft, EditState, MasterBuilder, StepBuilder, StepInput};
