pub use basin::Basin;
pub use boundary::{FlowBoundary, LevelBoundary};
pub use compound::{CompoundTerm, CompoundVariable, ListenVariable};
pub use continuous_control::{ContinuousControl, ControlledParameter};
pub use discrete_control::{Condition, DiscreteControl};
pub use flow_demand::FlowDemand;
pub use level_demand::LevelDemand;
pub use linear_resistance::LinearResistance;
pub use manning_resistance::ManningResistance;
pub use outlet::Outlet;
pub use pid_control::PidControl;
pub use pump::Pump;
pub use rating_curve::TabulatedRatingCurve;
pub use user_demand::UserDemand;

//List all the submodules here
pub mod basin;
pub mod boundary;
pub mod compound;
pub mod continuous_control;
pub mod discrete_control;
pub mod flow_demand;
pub mod level_demand;
pub mod linear_resistance;
pub mod manning_resistance;
pub mod outlet;
pub mod pid_control;
pub mod pump;
pub mod rating_curve;
pub mod user_demand;
