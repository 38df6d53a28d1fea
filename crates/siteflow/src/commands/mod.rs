pub mod deploy;
pub mod destroy;
pub mod outputs;
pub mod plan;
pub mod synth;
pub mod validate;
