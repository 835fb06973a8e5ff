//! Character sets to subset fonts to.

use core::{fmt, num::ParseIntError, str::FromStr};
use std::collections::{btree_set, BTreeSet};

/// Curated list of frequently used Traditional Chinese characters for the bundled fonts.
///
/// Line breaks separate rows of the list and are not part of the set.
pub const COMMON_HANZI: &str = "\
醫療牙醫診所行銷網站設計品牌專業服務客戶推廣數位成長方案團隊
合作分析策略內容技術效益價值優勢經驗實績傳統社群媒體搜尋引擎
最佳化廣告投放追蹤評估報表建議改善流程諮詢資源管理系統整合解
決方案預約病患回訪率提升轉換客源擴增市場競爭分析定位策略目標
達成預算規劃執行成本控制績效評估合作夥伴關係品質保證滿意度調
查回饋意見反應處理支援維護更新創新發展趨勢洞察先進技術應用實
踐案例研究分享知識交流學習成長機會挑戰突破瓶頸轉型升級展望未
來願景使命價值觀理念精神文化傳承創意激發靈感實現夢想追求卓越";

/// CJK unified ideographs.
pub const CJK_UNIFIED_IDEOGRAPHS: UnicodeRange = UnicodeRange::new(0x4e00, 0x9fff);
/// CJK symbols and punctuation.
pub const CJK_SYMBOLS_AND_PUNCTUATION: UnicodeRange = UnicodeRange::new(0x3000, 0x303f);
/// General punctuation.
pub const GENERAL_PUNCTUATION: UnicodeRange = UnicodeRange::new(0x2000, 0x206f);
/// Halfwidth and fullwidth forms.
pub const HALFWIDTH_AND_FULLWIDTH_FORMS: UnicodeRange = UnicodeRange::new(0xff00, 0xffef);
/// Box drawing.
pub const BOX_DRAWING: UnicodeRange = UnicodeRange::new(0x2500, 0x257f);

/// Ranges covering common Hanzi, CJK punctuation and symbols.
pub const COMMON_CJK_RANGES: [UnicodeRange; 5] = [
    CJK_UNIFIED_IDEOGRAPHS,
    CJK_SYMBOLS_AND_PUNCTUATION,
    GENERAL_PUNCTUATION,
    HALFWIDTH_AND_FULLWIDTH_FORMS,
    BOX_DRAWING,
];

/// Inclusive range of Unicode code points, e.g. `U+4E00-U+9FFF`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnicodeRange {
    start: u32,
    end: u32,
}

impl UnicodeRange {
    const MAX_CODE_POINT: u32 = 0x10_ffff;

    /// Creates a range.
    ///
    /// # Panics
    ///
    /// Panics if `start > end` or `end` exceeds `U+10FFFF`.
    pub const fn new(start: u32, end: u32) -> Self {
        assert!(start <= end, "range start exceeds its end");
        assert!(end <= Self::MAX_CODE_POINT, "range end exceeds U+10FFFF");
        Self { start, end }
    }

    /// Returns the first code point in this range.
    pub const fn start(&self) -> u32 {
        self.start
    }

    /// Returns the last code point in this range.
    pub const fn end(&self) -> u32 {
        self.end
    }

    /// Checks whether this range contains the specified char.
    pub fn contains(&self, ch: char) -> bool {
        (self.start..=self.end).contains(&u32::from(ch))
    }

    /// Iterates over chars in this range. Surrogate code points are skipped.
    pub fn chars(&self) -> impl Iterator<Item = char> {
        (self.start..=self.end).filter_map(char::from_u32)
    }

    /// Parses a comma- or whitespace-separated list of ranges, such as
    /// `U+4E00-9FFF, U+3000-U+303F`.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the list items is not a valid range.
    pub fn parse_list(s: &str) -> Result<Vec<Self>, RangeParseError> {
        s.split(|ch: char| ch == ',' || ch.is_whitespace())
            .filter(|item| !item.is_empty())
            .map(str::parse)
            .collect()
    }

    fn parse_code_point(s: &str) -> Result<u32, RangeParseError> {
        let digits = s
            .strip_prefix("U+")
            .or_else(|| s.strip_prefix("u+"))
            .unwrap_or(s);
        if digits.is_empty() {
            return Err(RangeParseError::Empty);
        }
        let value = u32::from_str_radix(digits, 16).map_err(RangeParseError::Hex)?;
        if value > Self::MAX_CODE_POINT {
            return Err(RangeParseError::OutOfBounds(value));
        }
        Ok(value)
    }
}

impl fmt::Display for UnicodeRange {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(formatter, "U+{:04X}", self.start)
        } else {
            write!(formatter, "U+{:04X}-U+{:04X}", self.start, self.end)
        }
    }
}

impl FromStr for UnicodeRange {
    type Err = RangeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (start, end) = match s.split_once('-') {
            Some((start, end)) => (Self::parse_code_point(start)?, Self::parse_code_point(end)?),
            None => {
                let point = Self::parse_code_point(s)?;
                (point, point)
            }
        };
        if start > end {
            return Err(RangeParseError::Inverted { start, end });
        }
        Ok(Self { start, end })
    }
}

/// Error parsing a [`UnicodeRange`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RangeParseError {
    /// Code point is empty.
    Empty,
    /// Code point is not a hexadecimal number.
    Hex(ParseIntError),
    /// Code point exceeds `U+10FFFF`.
    OutOfBounds(u32),
    /// Range start exceeds its end.
    Inverted {
        /// Range start.
        start: u32,
        /// Range end.
        end: u32,
    },
}

impl fmt::Display for RangeParseError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => formatter.write_str("empty code point"),
            Self::Hex(err) => write!(formatter, "invalid hexadecimal code point: {err}"),
            Self::OutOfBounds(value) => {
                write!(formatter, "code point {value:#X} exceeds U+10FFFF")
            }
            Self::Inverted { start, end } => {
                write!(formatter, "range start U+{start:04X} exceeds its end U+{end:04X}")
            }
        }
    }
}

impl std::error::Error for RangeParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Hex(err) => Some(err),
            _ => None,
        }
    }
}

/// Ordered set of distinct chars a font is subset to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CharSet(BTreeSet<char>);

impl CharSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a set with [`COMMON_HANZI`].
    pub fn common_hanzi() -> Self {
        Self::from_text(COMMON_HANZI)
    }

    /// Creates a set with all chars from the text, except for line terminators.
    pub fn from_text(text: &str) -> Self {
        let mut this = Self::new();
        this.push_text(text);
        this
    }

    /// Adds all chars from the text, except for line terminators (`\n` and `\r`).
    pub fn push_text(&mut self, text: &str) {
        self.0
            .extend(text.chars().filter(|&ch| ch != '\n' && ch != '\r'));
    }

    /// Adds all chars from the range.
    pub fn push_range(&mut self, range: UnicodeRange) {
        self.0.extend(range.chars());
    }

    /// Returns the number of chars in this set.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Checks whether this set is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Checks whether this set contains the specified char.
    pub fn contains(&self, ch: char) -> bool {
        self.0.contains(&ch)
    }

    /// Iterates over chars in ascending order.
    pub fn iter(&self) -> btree_set::Iter<'_, char> {
        self.0.iter()
    }
}

impl FromIterator<char> for CharSet {
    fn from_iter<I: IntoIterator<Item = char>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<char> for CharSet {
    fn extend<I: IntoIterator<Item = char>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl<'a> IntoIterator for &'a CharSet {
    type Item = &'a char;
    type IntoIter = btree_set::Iter<'a, char>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use test_casing::test_casing;

    use super::*;

    #[test_casing(5, [
        ("U+4E00-U+9FFF", (0x4e00, 0x9fff)),
        ("U+4E00-9FFF", (0x4e00, 0x9fff)),
        ("4e00-9fff", (0x4e00, 0x9fff)),
        ("U+3000", (0x3000, 0x3000)),
        (" u+20-7E ", (0x20, 0x7e)),
    ])]
    fn parsing_range(s: &str, expected: (u32, u32)) {
        let range: UnicodeRange = s.parse().unwrap();
        assert_eq!(range, UnicodeRange::new(expected.0, expected.1));
    }

    #[test]
    fn parsing_invalid_ranges() {
        let err = "U+".parse::<UnicodeRange>().unwrap_err();
        assert_eq!(err, RangeParseError::Empty);
        let err = "U+XYZ".parse::<UnicodeRange>().unwrap_err();
        assert!(matches!(err, RangeParseError::Hex(_)), "{err:?}");
        let err = "U+9FFF-U+4E00".parse::<UnicodeRange>().unwrap_err();
        assert_eq!(
            err,
            RangeParseError::Inverted {
                start: 0x9fff,
                end: 0x4e00
            }
        );
        let err = "U+110000".parse::<UnicodeRange>().unwrap_err();
        assert_eq!(err, RangeParseError::OutOfBounds(0x11_0000));
        assert_eq!(err.to_string(), "code point 0x110000 exceeds U+10FFFF");
    }

    #[test]
    fn parsing_range_list() {
        let ranges = UnicodeRange::parse_list("U+4E00-9FFF, U+3000-U+303F\nU+FF01").unwrap();
        assert_eq!(
            ranges,
            [
                CJK_UNIFIED_IDEOGRAPHS,
                CJK_SYMBOLS_AND_PUNCTUATION,
                UnicodeRange::new(0xff01, 0xff01),
            ]
        );
        assert!(UnicodeRange::parse_list("").unwrap().is_empty());
    }

    #[test]
    fn displaying_ranges() {
        assert_eq!(BOX_DRAWING.to_string(), "U+2500-U+257F");
        assert_eq!(UnicodeRange::new(0x20, 0x20).to_string(), "U+0020");
    }

    #[test]
    fn range_chars_skip_surrogates() {
        let range = UnicodeRange::new(0xd7ff, 0xe000);
        let chars: Vec<_> = range.chars().collect();
        assert_eq!(chars, ['\u{d7ff}', '\u{e000}']);
        assert!(range.contains('\u{e000}'));
        assert!(!range.contains('a'));
    }

    #[test]
    fn common_hanzi_set() {
        let set = CharSet::common_hanzi();
        assert!(!set.contains('\n'));
        assert!(set.contains('醫'));
        assert!(set.contains('越'));
        // The list has repeated chars (e.g., 醫, 方案, 策略), so the set is smaller than the text.
        let char_count = COMMON_HANZI.chars().filter(|&ch| ch != '\n').count();
        assert_eq!(char_count, 8 * 30);
        assert!(set.len() < char_count);
        assert!(set.iter().all(|&ch| CJK_UNIFIED_IDEOGRAPHS.contains(ch)));
    }

    #[test]
    fn char_set_from_text_and_ranges() {
        let mut set = CharSet::from_text("ba\r\nab");
        assert_eq!(set.iter().copied().collect::<String>(), "ab");
        set.push_range(UnicodeRange::new(0x30, 0x32));
        assert_eq!(set.iter().copied().collect::<String>(), "012ab");
        set.extend(['z', 'a']);
        assert_eq!(set.len(), 6);
    }
}
