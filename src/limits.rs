use crate::model::Ms;

pub const MAX_TITLE_LEN: usize = 200;
pub const MAX_DESCRIPTION_LEN: usize = 4_000;
pub const MAX_ROOM_NAME_LEN: usize = 120;
pub const MAX_LOCATION_LEN: usize = 200;
pub const MAX_EQUIPMENT_ITEMS: usize = 32;
pub const MAX_ROOM_CAPACITY: u32 = 10_000;

pub const MAX_ROOMS: usize = 10_000;
pub const MAX_RESERVATIONS_PER_ROOM: usize = 100_000;

/// 2000-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// 2200-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 7_258_118_400_000;

/// Local calendar offsets outside ±18h do not exist.
pub const MAX_UTC_OFFSET_MINUTES: i32 = 18 * 60;

pub const MAX_UPCOMING_LIMIT: usize = 100;
