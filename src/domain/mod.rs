//! Domain layer: data models, collaborator ports, and the error taxonomy.

pub mod errors;
pub mod models;
pub mod ports;
