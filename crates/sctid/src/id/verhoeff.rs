//! Verhoeff check digit over decimal strings.
//!
//! Detects every single-digit substitution and every adjacent transposition,
//! which is why SNOMED CT uses it for the trailing digit of each identifier.

/// Multiplication table of the dihedral group D5.
const MULTIPLY: [[u8; 10]; 10] = [
    [0, 1, 2, 3, 4, 5, 6, 7, 8, 9],
    [1, 2, 3, 4, 0, 6, 7, 8, 9, 5],
    [2, 3, 4, 0, 1, 7, 8, 9, 5, 6],
    [3, 4, 0, 1, 2, 8, 9, 5, 6, 7],
    [4, 0, 1, 2, 3, 9, 5, 6, 7, 8],
    [5, 9, 8, 7, 6, 0, 4, 3, 2, 1],
    [6, 5, 9, 8, 7, 1, 0, 4, 3, 2],
    [7, 6, 5, 9, 8, 2, 1, 0, 4, 3],
    [8, 7, 6, 5, 9, 3, 2, 1, 0, 4],
    [9, 8, 7, 6, 5, 4, 3, 2, 1, 0],
];

/// Position-dependent permutation, cycling every 8 digits.
const PERMUTE: [[u8; 10]; 8] = [
    [0, 1, 2, 3, 4, 5, 6, 7, 8, 9],
    [1, 5, 7, 6, 2, 8, 3, 0, 9, 4],
    [5, 8, 0, 3, 7, 9, 6, 1, 4, 2],
    [8, 9, 1, 6, 0, 4, 3, 5, 2, 7],
    [9, 4, 5, 3, 1, 2, 6, 8, 7, 0],
    [4, 2, 8, 6, 5, 7, 3, 9, 0, 1],
    [2, 7, 9, 3, 8, 0, 6, 4, 1, 5],
    [7, 0, 4, 6, 9, 1, 3, 2, 5, 8],
];

const INVERSE: [u8; 10] = [0, 4, 3, 2, 1, 5, 6, 7, 8, 9];

fn fold(digits: &[u8], offset: usize) -> u8 {
    digits
        .iter()
        .rev()
        .enumerate()
        .fold(0_u8, |acc, (i, &d)| {
            debug_assert!(d.is_ascii_digit());
            let p = PERMUTE[(i + offset) % 8][usize::from(d - b'0')];
            MULTIPLY[usize::from(acc)][usize::from(p)]
        })
}

/// Computes the check digit (0-9) to append to `digits`.
///
/// `digits` must be ASCII decimal digits.
pub fn verhoeff_check_digit(digits: &[u8]) -> u8 {
    INVERSE[usize::from(fold(digits, 1))]
}

/// Returns `true` if the last digit of `digits` is a valid check digit for
/// the ones before it.
pub fn verhoeff_is_valid(digits: &[u8]) -> bool {
    !digits.is_empty() && fold(digits, 0) == 0
}
