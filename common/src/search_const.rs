//! Shared constants for search paging and map rendering.

pub const PAGE_SIZE: u64 = 20;

pub const DEFAULT_LEGEND_BUCKETS: usize = 10;

/// Map colours as `0xRRGGBB`. The last slot is reserved for "other".
pub const COLOUR_PALETTE: [u32; 12] = [
    0x3366CC, 0xDC3912, 0xFF9900, 0x109618, 0x990099, 0x0099C6,
    0xDD4477, 0x66AA00, 0xB82E2E, 0x316395, 0x994499, 0x808080,
];

pub const OTHER_LABEL: &str = "Other";

pub fn colour_hex(index: usize) -> String {
    let colour = COLOUR_PALETTE[index.min(COLOUR_PALETTE.len() - 1)];
    format!("{:06X}", colour)
}
