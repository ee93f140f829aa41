pub mod tcp;

pub use tcp::serve;
