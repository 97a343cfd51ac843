// Application layer: the tool surface handed to the assistant host.

pub mod tools;

pub use tools::LunchTools;
