//! Longitudinal user modelling and response simulation.

pub mod inferencer;
pub mod model;
pub mod simulator;

pub use inferencer::MentalStateInferencer;
pub use model::UserMentalModel;
pub use simulator::{Criterion, Framing, MentalSimulator, ResponseScenario, ScenarioStyle};
