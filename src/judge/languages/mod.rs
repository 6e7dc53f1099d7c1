pub mod c;
pub mod python;
