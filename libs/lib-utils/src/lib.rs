pub mod mac;
pub mod time;
