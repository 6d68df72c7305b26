pub mod x64;

pub use x64::Register;
