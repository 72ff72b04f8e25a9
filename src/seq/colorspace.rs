//! Colorspace encoding: each color digit (0-3) encodes the transition between two adjacent bases.

/// Converts nucleotide into row/column index of the transition tables.
/// Returns 4 for `N`, `.` and all other unexpected symbols.
#[inline]
const fn base_index(nt: u8) -> usize {
    match nt {
        b'A' | b'a' => 0,
        b'C' | b'c' => 1,
        b'G' | b'g' => 2,
        b'T' | b't' => 3,
        _ => 4,
    }
}

/// Converts color digit into column index. Returns 4 for `4`, `.`, `N` and other symbols.
#[inline]
const fn color_index(color: u8) -> usize {
    match color {
        b'0'..=b'3' => (color - b'0') as usize,
        _ => 4,
    }
}

/// Decoding table: previous base x color -> next base.
const DECODE: [[u8; 5]; 5] = [
    //  0     1     2     3     4/.
    [b'A', b'C', b'G', b'T', b'N'], // A
    [b'C', b'A', b'T', b'G', b'N'], // C
    [b'G', b'T', b'A', b'C', b'N'], // G
    [b'T', b'G', b'C', b'A', b'N'], // T
    [b'N', b'N', b'N', b'N', b'N'], // N/.
];

/// Encoding table: previous base x next base -> color.
const ENCODE: [[u8; 5]; 5] = [
    //  A     C     G     T     N/.
    [b'0', b'1', b'2', b'3', b'4'], // A
    [b'1', b'0', b'3', b'2', b'4'], // C
    [b'2', b'3', b'0', b'1', b'4'], // G
    [b'3', b'2', b'1', b'0', b'4'], // T
    [b'4', b'4', b'4', b'4', b'4'], // N/.
];

/// Returns true if the symbol is one of the four unambiguous colors.
#[inline]
pub fn is_valid_color(color: u8) -> bool {
    color_index(color) < 4
}

/// Decodes colorspace sequence `<primer base><colors>` into basespace.
/// Output has the same length as the input: the first base is the primer itself.
/// Once an ambiguous base appears, all following bases are `N`.
pub fn decode(seq: &[u8]) -> Vec<u8> {
    let Some((&primer, colors)) = seq.split_first() else { return Vec::new() };
    let mut res = Vec::with_capacity(seq.len());
    let mut base = primer;
    res.push(base);
    for &color in colors {
        base = DECODE[base_index(base)][color_index(color)];
        res.push(base);
    }
    res
}

/// Encodes basespace sequence into `<first base><colors>`.
/// Transitions involving `N` or `.` are encoded as `4`.
pub fn encode(seq: &[u8]) -> Vec<u8> {
    let Some(&first) = seq.first() else { return Vec::new() };
    let mut res = Vec::with_capacity(seq.len());
    res.push(first);
    res.extend(seq.windows(2).map(|w| ENCODE[base_index(w[0])][base_index(w[1])]));
    res
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_known() {
        assert_eq!(decode(b"T0123"), b"TTGAT".to_vec());
        assert_eq!(decode(b"A3210"), b"ATCAA".to_vec());
        assert_eq!(decode(b"G"), b"G".to_vec());
        assert!(decode(b"").is_empty());
    }

    #[test]
    fn ambiguous_colors() {
        assert_eq!(decode(b"A1.22"), b"ACNNN".to_vec());
        assert_eq!(decode(b"N0123"), b"NNNNN".to_vec());
        assert_eq!(encode(b"ACNT"), b"A144".to_vec());
    }

    #[test]
    fn encode_decode_inverse() {
        let colors: &[&[u8]] = &[b"T0123", b"A", b"C3300112233", b"G0000", b"T32103210321"];
        for &cs in colors {
            assert_eq!(encode(&decode(cs)), cs.to_vec(), "{}", String::from_utf8_lossy(cs));
        }
        let bases: &[&[u8]] = &[b"ACGTTGCA", b"AAAA", b"GATTACA"];
        for &bs in bases {
            assert_eq!(decode(&encode(bs)), bs.to_vec());
        }
    }

    #[test]
    fn color_validity() {
        assert!(b"0123".iter().all(|&c| is_valid_color(c)));
        assert!(b"4.NA".iter().all(|&c| !is_valid_color(c)));
    }
}
