// Domain layer: bus keys and ports (interfaces) toward external collaborators.

pub mod model;
pub mod ports;
