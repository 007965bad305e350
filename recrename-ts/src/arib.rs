//! ARIB STD-B24 8-unit character string decoding.
//!
//! EPG strings are ISO 2022 style: four graphic sets G0..G3 are designated
//! by escape sequences and invoked into GL (0x21..0x7E) and GR (0xA1..0xFE)
//! by locking or single shifts. The initial state is G0 = Kanji,
//! G1 = Alphanumeric, G2 = Hiragana, G3 = Katakana, GL = G0, GR = G2.

use encoding_rs::EUC_JP;

/// Replacement for glyphs that have no Unicode mapping (DRCS, mosaics).
pub const GETA: char = '\u{3013}';

const HIRAGANA_TAIL: [char; 8] = ['ゝ', 'ゞ', 'ー', '。', '「', '」', '、', '・'];
const KATAKANA_TAIL: [char; 8] = ['ヽ', 'ヾ', 'ー', '。', '「', '」', '、', '・'];

/// Additional symbols in row 90 that EPG titles use as markers.
const ADDITIONAL_SYMBOLS_90: [&str; 35] = [
    "【HV】", "【SD】", "【Ｐ】", "【Ｗ】", "【MV】", "【手】", "【字】", "【双】",
    "【デ】", "【Ｓ】", "【二】", "【多】", "【解】", "【SS】", "【Ｂ】", "【Ｎ】",
    "■", "●", "【天】", "【交】", "【映】", "【無】", "【料】", "【年齢制限】",
    "【前】", "【後】", "【再】", "【新】", "【初】", "【終】", "【生】", "【販】",
    "【声】", "【吹】", "【PPV】",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Charset {
    Kanji,
    Alphanumeric,
    Hiragana,
    Katakana,
    JisKatakana,
    /// Mosaic, DRCS and other sets rendered as GETA; `bytes` per glyph.
    Unsupported { bytes: usize },
}

impl Charset {
    fn one_byte(final_byte: u8) -> Self {
        match final_byte {
            0x4A | 0x36 => Charset::Alphanumeric,
            0x30 | 0x37 => Charset::Hiragana,
            0x31 | 0x38 => Charset::Katakana,
            0x49 => Charset::JisKatakana,
            _ => Charset::Unsupported { bytes: 1 },
        }
    }

    fn two_byte(final_byte: u8) -> Self {
        match final_byte {
            0x42 | 0x39 | 0x3B => Charset::Kanji,
            _ => Charset::Unsupported { bytes: 2 },
        }
    }

    fn width(self) -> usize {
        match self {
            Charset::Kanji => 2,
            Charset::Unsupported { bytes } => bytes,
            _ => 1,
        }
    }
}

struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
    g: [Charset; 4],
    gl: usize,
    gr: usize,
    single_shift: Option<usize>,
    middle_size: bool,
    out: String,
}

impl<'a> Decoder<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            g: [
                Charset::Kanji,
                Charset::Alphanumeric,
                Charset::Hiragana,
                Charset::Katakana,
            ],
            gl: 0,
            gr: 2,
            single_shift: None,
            middle_size: false,
            out: String::with_capacity(data.len() * 2),
        }
    }

    fn byte(&self, offset: usize) -> Option<u8> {
        self.data.get(self.pos + offset).copied()
    }

    fn run(mut self) -> String {
        while let Some(b) = self.byte(0) {
            match b {
                0x1B => self.escape(),
                0x0E => self.advance_with(1, |d| d.gl = 1),
                0x0F => self.advance_with(1, |d| d.gl = 0),
                0x19 => self.advance_with(1, |d| d.single_shift = Some(2)),
                0x1D => self.advance_with(1, |d| d.single_shift = Some(3)),
                0x0D => self.advance_with(1, |d| d.out.push('\n')),
                0x20 => self.advance_with(1, |d| {
                    let space = if d.middle_size { ' ' } else { '\u{3000}' };
                    d.out.push(space);
                }),
                // PAPF, SZX, COL, FLC, POL, WMM, HLC, RPC take one parameter
                0x16 | 0x8B | 0x91 | 0x93 | 0x94 | 0x97 | 0x98 => self.pos += 2,
                // APS takes two
                0x1C => self.pos += 3,
                0x90 => self.pos += if self.byte(1) == Some(0x20) { 3 } else { 2 },
                0x88 | 0x89 => self.advance_with(1, |d| d.middle_size = true),
                0x8A => self.advance_with(1, |d| d.middle_size = false),
                0x9B => self.skip_csi(),
                0x95 => self.skip_macro(),
                0x21..=0x7E => {
                    let set = self.single_shift.take().unwrap_or(self.gl);
                    self.graphic(set);
                }
                0xA1..=0xFE => {
                    let set = self.gr;
                    self.graphic(set);
                }
                _ => self.pos += 1,
            }
        }
        self.out
    }

    fn advance_with(&mut self, len: usize, f: impl FnOnce(&mut Self)) {
        f(self);
        self.pos += len;
    }

    fn escape(&mut self) {
        let Some(first) = self.byte(1) else {
            self.pos = self.data.len();
            return;
        };

        match first {
            0x6E => self.advance_with(2, |d| d.gl = 2),
            0x6F => self.advance_with(2, |d| d.gl = 3),
            0x7E => self.advance_with(2, |d| d.gr = 1),
            0x7D => self.advance_with(2, |d| d.gr = 2),
            0x7C => self.advance_with(2, |d| d.gr = 3),
            0x28..=0x2B => {
                let index = (first - 0x28) as usize;
                match self.byte(2) {
                    // DRCS: ESC ( SP F
                    Some(0x20) => {
                        self.g[index] = Charset::Unsupported { bytes: 1 };
                        self.pos += 4;
                    }
                    Some(f) => {
                        self.g[index] = Charset::one_byte(f);
                        self.pos += 3;
                    }
                    None => self.pos = self.data.len(),
                }
            }
            0x24 => match self.byte(2) {
                Some(c @ 0x28..=0x2B) => {
                    let index = (c - 0x28) as usize;
                    match self.byte(3) {
                        Some(0x20) => {
                            self.g[index] = Charset::Unsupported { bytes: 2 };
                            self.pos += 5;
                        }
                        Some(f) => {
                            self.g[index] = Charset::two_byte(f);
                            self.pos += 4;
                        }
                        None => self.pos = self.data.len(),
                    }
                }
                Some(f) => {
                    self.g[0] = Charset::two_byte(f);
                    self.pos += 3;
                }
                None => self.pos = self.data.len(),
            },
            _ => self.pos += 2,
        }
    }

    fn skip_csi(&mut self) {
        // parameters and intermediates up to a final byte 0x40..=0x6F
        self.pos += 1;
        while let Some(b) = self.byte(0) {
            self.pos += 1;
            if (0x40..=0x6F).contains(&b) {
                break;
            }
        }
    }

    fn skip_macro(&mut self) {
        // MACRO 0x95 ... 0x95 0x4F
        self.pos += 2;
        while let Some(b) = self.byte(0) {
            self.pos += 1;
            if b == 0x95 && self.byte(0) == Some(0x4F) {
                self.pos += 1;
                break;
            }
        }
    }

    fn graphic(&mut self, set: usize) {
        let charset = self.g[set];
        let width = charset.width();
        if self.pos + width > self.data.len() {
            self.pos = self.data.len();
            return;
        }

        let c1 = self.data[self.pos] & 0x7F;
        let c2 = self.data.get(self.pos + 1).map_or(0, |b| b & 0x7F);
        self.pos += width;

        match charset {
            Charset::Kanji => self.kanji(c1, c2),
            Charset::Alphanumeric => {
                let ascii = c1 as char;
                if self.middle_size {
                    self.out.push(ascii);
                } else {
                    self.out
                        .push(char::from_u32(c1 as u32 + 0xFEE0).unwrap_or(ascii));
                }
            }
            Charset::Hiragana => self.out.push(kana(c1, 0x3041, &HIRAGANA_TAIL)),
            Charset::Katakana => self.out.push(kana(c1, 0x30A1, &KATAKANA_TAIL)),
            Charset::JisKatakana => {
                let c = if c1 <= 0x5F {
                    char::from_u32(0xFF61 + (c1 - 0x21) as u32).unwrap_or(GETA)
                } else {
                    GETA
                };
                self.out.push(c);
            }
            Charset::Unsupported { .. } => self.out.push(GETA),
        }
    }

    fn kanji(&mut self, c1: u8, c2: u8) {
        if c1 == 0x7A && (0x50..=0x72).contains(&c2) {
            self.out.push_str(ADDITIONAL_SYMBOLS_90[(c2 - 0x50) as usize]);
            return;
        }
        if c1 >= 0x75 {
            // rows 85-94 hold ARIB additional symbols, not JIS kanji
            self.out.push(GETA);
            return;
        }

        let bytes = [c1 | 0x80, c2 | 0x80];
        let (decoded, had_errors) = EUC_JP.decode_without_bom_handling(&bytes);
        if had_errors {
            self.out.push(GETA);
        } else {
            self.out.push_str(&decoded);
        }
    }
}

fn kana(c: u8, base: u32, tail: &[char; 8]) -> char {
    match c {
        0x77..=0x7E => tail[(c - 0x77) as usize],
        0x21..=0x76 => {
            let last = if base == 0x3041 { 0x73 } else { 0x76 };
            if c <= last {
                char::from_u32(base + (c - 0x21) as u32).unwrap_or(GETA)
            } else {
                GETA
            }
        }
        _ => GETA,
    }
}

/// Decode an ARIB STD-B24 8-unit string into UTF-8.
pub fn decode_arib_string(data: &[u8]) -> String {
    Decoder::new(data).run()
}
