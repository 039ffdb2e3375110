pub mod nanops;
pub mod special;
