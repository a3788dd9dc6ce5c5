pub mod daemon;
pub mod dbus_api;
pub mod ids;
pub mod logging;
pub mod storage;
pub mod sync;
