//! Replayer lookup tables

/// Entries per finetune row (36 notes + terminating zero)
pub const PERIODS_PER_FINETUNE: usize = 37;

/// Amiga periods for finetunes 0..=7 then -8..=-1, 37 entries each.
///
/// Arpeggio may index up to 15 entries past the last row; those reads land
/// in the trailing zero pad.
#[rustfmt::skip]
pub static PERIOD_TABLE: [i16; 16 * PERIODS_PER_FINETUNE + 15] = [
    // 0
    856,808,762,720,678,640,604,570,538,508,480,453,
    428,404,381,360,339,320,302,285,269,254,240,226,
    214,202,190,180,170,160,151,143,135,127,120,113,0,
    // 1
    850,802,757,715,674,637,601,567,535,505,477,450,
    425,401,379,357,337,318,300,284,268,253,239,225,
    213,201,189,179,169,159,150,142,134,126,119,113,0,
    // 2
    844,796,752,709,670,632,597,563,532,502,474,447,
    422,398,376,355,335,316,298,282,266,251,237,224,
    211,199,188,177,167,158,149,141,133,125,118,112,0,
    // 3
    838,791,746,704,665,628,592,559,528,498,470,444,
    419,395,373,352,332,314,296,280,264,249,235,222,
    209,198,187,176,166,157,148,140,132,125,118,111,0,
    // 4
    832,785,741,699,660,623,588,555,524,495,467,441,
    416,392,370,350,330,312,294,278,262,247,233,220,
    208,196,185,175,165,156,147,139,131,124,117,110,0,
    // 5
    826,779,736,694,655,619,584,551,520,491,463,437,
    413,390,368,347,328,309,292,276,260,245,232,219,
    206,195,184,174,164,155,146,138,130,123,116,109,0,
    // 6
    820,774,730,689,651,614,580,547,516,487,460,434,
    410,387,365,345,325,307,290,274,258,244,230,217,
    205,193,183,172,163,154,145,137,129,122,115,109,0,
    // 7
    814,768,725,684,646,610,575,543,513,484,457,431,
    407,384,363,342,323,305,288,272,256,242,228,216,
    204,192,181,171,161,152,144,136,128,121,114,108,0,
    // -8
    907,856,808,762,720,678,640,604,570,538,508,480,
    453,428,404,381,360,339,320,302,285,269,254,240,
    226,214,202,190,180,170,160,151,143,135,127,120,0,
    // -7
    900,850,802,757,715,675,636,601,567,535,505,477,
    450,425,401,379,357,337,318,300,284,268,253,238,
    225,212,200,189,179,169,159,150,142,134,126,119,0,
    // -6
    894,844,796,752,709,670,632,597,563,532,502,474,
    447,422,398,376,355,335,316,298,282,266,251,237,
    223,211,199,188,177,167,158,149,141,133,125,118,0,
    // -5
    887,838,791,746,704,665,628,592,559,528,498,470,
    444,419,395,373,352,332,314,296,280,264,249,235,
    222,209,198,187,176,166,157,148,140,132,125,118,0,
    // -4
    881,832,785,741,699,660,623,588,555,524,494,467,
    441,416,392,370,350,330,312,294,278,262,247,233,
    220,208,196,185,175,165,156,147,139,131,123,117,0,
    // -3
    875,826,779,736,694,655,619,584,551,520,491,463,
    437,413,390,368,347,328,309,292,276,260,245,232,
    219,206,195,184,174,164,155,146,138,130,123,116,0,
    // -2
    868,820,774,730,689,651,614,580,547,516,487,460,
    434,410,387,365,345,325,307,290,274,258,244,230,
    217,205,193,183,172,163,154,145,137,129,122,115,0,
    // -1
    862,814,768,725,684,646,610,575,543,513,484,457,
    431,407,384,363,342,323,305,288,272,256,242,228,
    216,203,192,181,171,161,152,144,136,128,121,114,0,
    // arpeggio overflow pad
    0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,
];

/// Sine half-wave shared by vibrato and tremolo
#[rustfmt::skip]
pub static VIBRATO_TABLE: [u8; 32] = [
    0, 24, 49, 74, 97,120,141,161,180,197,212,224,235,244,250,253,
    255,253,250,244,235,224,212,197,180,161,141,120, 97, 74, 49, 24,
];

/// EFx (invert loop) speeds
pub static FUNK_TABLE: [u8; 16] = [0, 5, 6, 7, 8, 10, 11, 13, 16, 19, 22, 26, 32, 43, 64, 128];

/// Finetune row `fine_tune` (low nibble) of [`PERIOD_TABLE`]
#[inline]
pub fn finetune_row(fine_tune: u8) -> &'static [i16] {
    let start = (fine_tune as usize & 0x0F) * PERIODS_PER_FINETUNE;
    &PERIOD_TABLE[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_are_zero_terminated() {
        for ft in 0..16u8 {
            let row = finetune_row(ft);
            assert_eq!(row[PERIODS_PER_FINETUNE - 1], 0, "row {} not terminated", ft);
            assert!(
                row[..36].windows(2).all(|w| w[0] >= w[1]),
                "row {} must be descending",
                ft
            );
        }
    }

    #[test]
    fn test_known_periods() {
        assert_eq!(finetune_row(0)[12], 428);
        assert_eq!(finetune_row(0)[35], 113);
        assert_eq!(finetune_row(8)[0], 907);
        assert_eq!(finetune_row(15)[35], 114);
    }
}
