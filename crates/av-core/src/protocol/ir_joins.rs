//! Standard join table for IR-controlled devices.
//!
//! Explicit join-mapping mode binds IR commands by name to fixed digital joins,
//! so the same touch-panel page can drive any IR device whose driver uses the
//! conventional command names.  Commands the driver lacks are simply not
//! bound.

use crate::protocol::join_map::{JoinCapabilities, JoinData, JoinKind, JoinMap};

/// `(command, join, description)` in join order.
const STANDARD_IR_JOINS: &[(&str, u32, &str)] = &[
    ("PLAY", 1, "Play"),
    ("STOP", 2, "Stop"),
    ("PAUSE", 3, "Pause"),
    ("FSCAN", 4, "Forward scan"),
    ("RSCAN", 5, "Reverse scan"),
    ("F_SKIP", 6, "Forward skip"),
    ("R_SKIP", 7, "Reverse skip"),
    ("RECORD", 8, "Record"),
    ("POWER", 9, "Power toggle"),
    ("0", 10, "Digit 0"),
    ("1", 11, "Digit 1"),
    ("2", 12, "Digit 2"),
    ("3", 13, "Digit 3"),
    ("4", 14, "Digit 4"),
    ("5", 15, "Digit 5"),
    ("6", 16, "Digit 6"),
    ("7", 17, "Digit 7"),
    ("8", 18, "Digit 8"),
    ("9", 19, "Digit 9"),
    ("+10", 20, "Plus ten"),
    ("ENTER", 21, "Enter"),
    ("CH+", 22, "Channel up"),
    ("CH-", 23, "Channel down"),
    ("LAST", 24, "Last channel"),
    ("PAGE_UP", 25, "Page up"),
    ("PAGE_DOWN", 26, "Page down"),
    ("UP_ARROW", 27, "Up"),
    ("DN_ARROW", 28, "Down"),
    ("LEFT_ARROW", 29, "Left"),
    ("RIGHT_ARROW", 30, "Right"),
    ("SELECT", 31, "Select"),
    ("MENU", 32, "Menu"),
    ("EXIT", 33, "Exit"),
    ("GUIDE", 34, "Guide"),
    ("INFO", 35, "Info"),
    ("VOL+", 36, "Volume up"),
    ("VOL-", 37, "Volume down"),
    ("MUTE", 38, "Mute"),
    ("POWER_ON", 39, "Power on"),
    ("POWER_OFF", 40, "Power off"),
    ("DVR", 41, "DVR"),
    ("RED", 42, "Red"),
    ("GREEN", 43, "Green"),
    ("YELLOW", 44, "Yellow"),
    ("BLUE", 45, "Blue"),
    ("HOME", 46, "Home"),
    ("RETURN", 47, "Return"),
    ("EJECT", 48, "Eject"),
];

/// The standard IR join map, before any offset.
pub fn standard_ir_join_map() -> JoinMap {
    JoinMap::from_joins(STANDARD_IR_JOINS.iter().map(|(name, join, description)| {
        (
            *name,
            JoinData::new(*join, JoinKind::Digital, JoinCapabilities::FromRemote)
                .with_description(*description),
        )
    }))
}
