pub const APP_ID_BASE: &str = "org.notesync";

pub const DBUS_NAME_SYNC: &str = "org.notesync.Sync1";
pub const DBUS_INTERFACE_SYNC: &str = "org.notesync.Sync1";
pub const DBUS_OBJECT_PATH_SYNC: &str = "/org/notesync/Sync1";

pub const DBUS_ERROR_STOPPED: &str = "org.notesync.Sync1.Error.Stopped";
pub const DBUS_ERROR_INVALID_ARGUMENT: &str = "org.notesync.Sync1.Error.InvalidArgument";
pub const DBUS_ERROR_FAILED: &str = "org.notesync.Sync1.Error.Failed";

pub const KEYRING_SERVICE: &str = APP_ID_BASE;
