pub mod analysis;
pub mod capture;
pub mod device;
pub mod features;
pub mod file;
pub mod ring;
