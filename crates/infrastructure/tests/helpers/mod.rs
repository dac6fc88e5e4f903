#![allow(dead_code)]

pub mod builders;
pub mod mock_upstream;

pub use builders::*;
pub use mock_upstream::*;
