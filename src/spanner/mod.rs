pub mod client;
pub mod mutation;

pub use client::*;
pub use mutation::*;
