pub mod controller;
pub mod gate;
pub mod manager;
pub mod marker;
pub mod reconcile;
pub mod surface;
