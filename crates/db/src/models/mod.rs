pub mod notification;
pub mod preference;
pub mod recipient;
pub mod webhook;
