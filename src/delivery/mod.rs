//! Delivery adapters over the use-case layer.

pub mod http;
