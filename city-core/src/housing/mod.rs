pub mod city;
pub mod entities;

pub use city::*;
pub use entities::*;
