pub mod admin;
pub mod media;
pub mod quota;
pub mod uploads;
