//! Raw inotify event bits as delivered to listeners.

pub const MODIFY: u32 = libc::IN_MODIFY;
pub const ATTRIB: u32 = libc::IN_ATTRIB;
pub const CREATE: u32 = libc::IN_CREATE;
pub const DELETE: u32 = libc::IN_DELETE;
pub const MOVED_FROM: u32 = libc::IN_MOVED_FROM;
pub const MOVED_TO: u32 = libc::IN_MOVED_TO;
pub const DELETE_SELF: u32 = libc::IN_DELETE_SELF;
pub const MOVE_SELF: u32 = libc::IN_MOVE_SELF;
pub const UNMOUNT: u32 = libc::IN_UNMOUNT;
pub const Q_OVERFLOW: u32 = libc::IN_Q_OVERFLOW;
pub const IGNORED: u32 = libc::IN_IGNORED;
pub const ISDIR: u32 = libc::IN_ISDIR;

/// Events every directory is subscribed to.
pub const WATCH_INTEREST: u32 =
    MODIFY | ATTRIB | CREATE | DELETE | MOVED_FROM | MOVED_TO | DELETE_SELF | MOVE_SELF;

/// A directory entry appeared.
pub const ENTRY_ADDED: u32 = CREATE | MOVED_TO;

/// A directory entry went away.
pub const ENTRY_REMOVED: u32 = DELETE | MOVED_FROM;

const NAMES: &[(u32, &str)] = &[
    (MODIFY, "MODIFY"),
    (ATTRIB, "ATTRIB"),
    (CREATE, "CREATE"),
    (DELETE, "DELETE"),
    (MOVED_FROM, "MOVED_FROM"),
    (MOVED_TO, "MOVED_TO"),
    (DELETE_SELF, "DELETE_SELF"),
    (MOVE_SELF, "MOVE_SELF"),
    (UNMOUNT, "UNMOUNT"),
    (Q_OVERFLOW, "Q_OVERFLOW"),
    (IGNORED, "IGNORED"),
    (ISDIR, "ISDIR"),
];

pub fn is_dir(mask: u32) -> bool {
    mask & ISDIR != 0
}

/// Render a mask as `CREATE|ISDIR`. Unknown bits are shown in hex.
pub fn describe(mask: u32) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut rest = mask;
    for &(bit, name) in NAMES {
        if mask & bit != 0 {
            parts.push(name.to_string());
            rest &= !bit;
        }
    }
    if rest != 0 {
        parts.push(format!("{rest:#x}"));
    }
    if parts.is_empty() {
        return "NONE".to_string();
    }
    parts.join("|")
}
