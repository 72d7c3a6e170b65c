pub mod vehicles;

pub use vehicles::{PollReport, VehiclePoller};
