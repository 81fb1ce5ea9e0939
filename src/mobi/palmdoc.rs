/// PalmDOC LZ77 decompression
///
/// - Bytes 0x01-0x08: copy the next `n` bytes literally
/// - Bytes 0x00, 0x09-0x7F: literal character
/// - Bytes 0x80-0xBF: back-reference; with the next byte,
///   distance = (val & 0x3FFF) >> 3, length = (val & 7) + 3
/// - Bytes 0xC0-0xFF: space + (byte ^ 0x80)
pub fn decompress(input: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(input.len() * 2);
    let mut i = 0;

    while i < input.len() {
        let c = input[i];
        i += 1;

        match c {
            1..=8 => {
                let end = (i + c as usize).min(input.len());
                output.extend_from_slice(&input[i..end]);
                i = end;
            }
            0 | 0x09..=0x7F => output.push(c),
            0xC0..=0xFF => {
                output.push(b' ');
                output.push(c ^ 0x80);
            }
            _ => {
                let Some(&next) = input.get(i) else {
                    break;
                };
                i += 1;

                let combined = (u16::from(c) << 8) | u16::from(next);
                let distance = ((combined & 0x3FFF) >> 3) as usize;
                let length = ((combined & 7) + 3) as usize;

                // copies may overlap the bytes they produce
                if distance > 0 && distance <= output.len() {
                    for _ in 0..length {
                        output.push(output[output.len() - distance]);
                    }
                }
            }
        }
    }

    output
}
