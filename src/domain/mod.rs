// Domain layer: menu / order models and the port to the remote ordering system.

pub mod model;
pub mod ports;
