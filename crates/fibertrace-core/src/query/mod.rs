pub mod adjacency;
pub mod attenuation;
pub mod batch;
pub mod guards;
pub mod otdr;
pub mod tracer;
pub mod vfl;
